//! Work item types. Raw Azure DevOps work items carry their payload under a
//! `fields` map keyed by `System.*` names; we flatten them before returning
//! them to API callers.

use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object, Default)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct AssignedTo {
    #[oai(skip_serializing_if_is_none)]
    pub display_name: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    pub unique_name: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct WorkItem {
    #[oai(skip_serializing_if_is_none)]
    pub id: Option<i64>,

    #[oai(skip_serializing_if_is_none)]
    pub title: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    pub description: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    pub state: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    pub created_date: Option<String>,

    pub assigned_to: AssignedTo,

    #[oai(skip_serializing_if_is_none)]
    pub url: Option<String>,
}

impl WorkItem {
    /// Flatten a raw Azure DevOps work item into the shape we return to callers.
    pub fn from_raw(raw: &Value) -> WorkItem {
        let fields = raw.get("fields").cloned().unwrap_or(json!({}));
        let assigned_to = fields.get("System.AssignedTo").cloned().unwrap_or(json!({}));

        let as_string = |v: &Value, key: &str| -> Option<String> {
            v.get(key).and_then(Value::as_str).map(|s| s.to_string())
        };

        WorkItem {
            id: raw.get("id").and_then(Value::as_i64),
            title: as_string(&fields, "System.Title"),
            description: as_string(&fields, "System.Description"),
            state: as_string(&fields, "System.State"),
            created_date: as_string(&fields, "System.CreatedDate"),
            assigned_to: AssignedTo {
                display_name: as_string(&assigned_to, "displayName"),
                unique_name: as_string(&assigned_to, "uniqueName"),
                avatar_url: assigned_to
                    .get("_links")
                    .and_then(|links| links.get("avatar"))
                    .and_then(|avatar| avatar.get("href"))
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
            },
            url: as_string(raw, "url"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct WorkItemList {
    pub work_items: Vec<WorkItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct WorkItemCreate {
    pub title: String,
    pub description: String,
}

impl WorkItemCreate {
    /// Render the creation payload as json-patch add operations.
    pub fn to_patch_ops(&self) -> Vec<Value> {
        vec![
            json!({"op": "add", "path": "/fields/System.Title", "value": self.title}),
            json!({"op": "add", "path": "/fields/System.Description", "value": self.description}),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object, Default)]
pub struct WorkItemUpdate {
    #[oai(skip_serializing_if_is_none)]
    pub title: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    pub description: Option<String>,
}

impl WorkItemUpdate {
    /// Render the provided fields as json-patch add operations. An empty
    /// vector means there is nothing to send upstream.
    pub fn to_patch_ops(&self) -> Vec<Value> {
        let mut ops = vec![];
        if let Some(title) = &self.title {
            ops.push(json!({"op": "add", "path": "/fields/System.Title", "value": title}));
        }
        if let Some(description) = &self.description {
            ops.push(json!({"op": "add", "path": "/fields/System.Description", "value": description}));
        }

        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        let raw = json!({
            "id": 42,
            "url": "https://dev.azure.com/contoso/_apis/wit/workItems/42",
            "fields": {
                "System.Title": "Fix the flux capacitor",
                "System.Description": "It stopped fluxing.",
                "System.State": "Active",
                "System.CreatedDate": "2024-01-15T10:00:00Z",
                "System.AssignedTo": {
                    "displayName": "Jane Doe",
                    "uniqueName": "jane@contoso.com",
                    "_links": {
                        "avatar": { "href": "https://dev.azure.com/avatar/jane" }
                    }
                }
            }
        });

        let item = WorkItem::from_raw(&raw);
        assert_eq!(item.id, Some(42));
        assert_eq!(item.title.as_deref(), Some("Fix the flux capacitor"));
        assert_eq!(item.state.as_deref(), Some("Active"));
        assert_eq!(item.assigned_to.display_name.as_deref(), Some("Jane Doe"));
        assert_eq!(
            item.assigned_to.avatar_url.as_deref(),
            Some("https://dev.azure.com/avatar/jane")
        );
        assert_eq!(
            item.url.as_deref(),
            Some("https://dev.azure.com/contoso/_apis/wit/workItems/42")
        );
    }

    #[test]
    fn test_from_raw_with_missing_fields() {
        let raw = json!({ "id": 7 });
        let item = WorkItem::from_raw(&raw);
        assert_eq!(item.id, Some(7));
        assert_eq!(item.title, None);
        assert_eq!(item.assigned_to, AssignedTo::default());
    }

    #[test]
    fn test_work_item_serializes_camel_case() {
        let item = WorkItem::from_raw(&json!({
            "id": 7,
            "fields": { "System.CreatedDate": "2024-01-15T10:00:00Z" }
        }));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["createdDate"], "2024-01-15T10:00:00Z");
        assert!(json.get("created_date").is_none());
    }

    #[test]
    fn test_update_patch_ops() {
        let empty = WorkItemUpdate::default();
        assert!(empty.to_patch_ops().is_empty());

        let title_only = WorkItemUpdate {
            title: Some("New title".to_string()),
            description: None,
        };
        let ops = title_only.to_patch_ops();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0]["path"], "/fields/System.Title");

        let create = WorkItemCreate {
            title: "A task".to_string(),
            description: "Do the thing.".to_string(),
        };
        assert_eq!(create.to_patch_ops().len(), 2);
    }
}
