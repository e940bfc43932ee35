//! A thin client for the Azure DevOps work item REST API. Each request is
//! authenticated with a basic auth header built from the user's PAT.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, error, info};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt;

use super::workitem::{WorkItem, WorkItemCreate, WorkItemList, WorkItemUpdate};
use crate::model::config::UserConfig;

pub const DEVOPS_BASE_URL: &str = "https://dev.azure.com";

/// An error reported by (or on the way to) the Azure DevOps API. Carries the
/// upstream status code and response body so the caller can surface them.
#[derive(Debug)]
pub struct UpstreamError {
    status: u16,
    details: String,
}

impl UpstreamError {
    pub fn new(status: u16, details: &str) -> UpstreamError {
        UpstreamError {
            status,
            details: details.to_string(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Azure DevOps returned {}: {}", self.status, self.details)
    }
}

impl Error for UpstreamError {
    fn cause(&self) -> Option<&dyn Error> {
        // Generic error, underlying cause isn't tracked.
        None
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::new(502, &e.to_string())
    }
}

/// A SHA-256 fingerprint of a PAT, safe to log.
pub fn pat_fingerprint(pat: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pat.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build the WIQL query for listing work items, optionally filtered by state
/// and by a keyword in the title. Single quotes in the filters are doubled,
/// WIQL string literals use the SQL escaping convention.
pub fn build_wiql(state: Option<&str>, title: Option<&str>) -> String {
    let mut wiql_query = "SELECT [System.Id], [System.Title], [System.State] \
         FROM WorkItems \
         WHERE [System.TeamProject] = @project"
        .to_string();

    if let Some(state) = state {
        wiql_query += &format!(" AND [System.State] = '{}'", state.replace('\'', "''"));
    }
    if let Some(title) = title {
        wiql_query += &format!(
            " AND [System.Title] CONTAINS '{}'",
            title.replace('\'', "''")
        );
    }
    wiql_query += " ORDER BY [System.ChangedDate] DESC";

    wiql_query
}

pub struct DevOpsClient {
    org: String,
    project: String,
    api_version: String,
    pat: String,
    client: reqwest::Client,
}

impl DevOpsClient {
    /// Build a client from a stored user configuration. A request-scoped PAT
    /// takes precedence over the stored one.
    pub fn from_config(config: &UserConfig, pat_override: Option<String>) -> DevOpsClient {
        let pat = match pat_override {
            Some(pat) => pat,
            None => config.azure_devops_pat.clone(),
        };
        debug!("Using PAT with fingerprint {}.", pat_fingerprint(&pat));

        DevOpsClient {
            org: config.azure_devops_org.clone(),
            project: config.azure_devops_project.clone(),
            api_version: config.api_version.clone(),
            pat,
            client: reqwest::Client::new(),
        }
    }

    /// The basic authentication header value. Azure DevOps expects an empty
    /// username and the PAT as password.
    fn auth_header(&self) -> String {
        let token = format!(":{}", self.pat);
        format!("Basic {}", STANDARD.encode(token.as_bytes()))
    }

    fn base_url(&self) -> String {
        format!("{}/{}/{}", DEVOPS_BASE_URL, self.org, self.project)
    }

    /// List work items via a WIQL query, then fetch their details and
    /// flatten them.
    pub async fn list_work_items(
        &self,
        state: Option<&str>,
        title: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<WorkItemList, UpstreamError> {
        let wiql_query = build_wiql(state, title);
        info!("WIQL Query: {}", wiql_query);

        // The WIQL endpoint is project-scoped.
        let wiql_url = format!(
            "{}/_apis/wit/wiql?$top={}&api-version={}",
            self.base_url(),
            limit,
            self.api_version
        );
        let response = self
            .client
            .post(&wiql_url)
            .header(AUTHORIZATION, self.auth_header())
            .json(&json!({ "query": wiql_query }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Error retrieving work items: {}", body);
            return Err(UpstreamError::new(status, &body));
        }

        let wiql_result: Value = response.json().await?;
        let work_item_ids: Vec<i64> = wiql_result
            .get("workItems")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("id").and_then(Value::as_i64))
                    .collect()
            })
            .unwrap_or_default();

        // The WIQL endpoint only supports $top, apply the offset here.
        let work_item_ids: Vec<i64> = work_item_ids
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();

        if work_item_ids.is_empty() {
            return Ok(WorkItemList { work_items: vec![] });
        }

        let ids = work_item_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<String>>()
            .join(",");
        let details_url = format!(
            "{}/_apis/wit/workitems?ids={}&api-version={}",
            self.base_url(),
            ids,
            self.api_version
        );
        let details_response = self
            .client
            .get(&details_url)
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;

        if !details_response.status().is_success() {
            let status = details_response.status().as_u16();
            let body = details_response.text().await.unwrap_or_default();
            error!("Error retrieving work item details: {}: {}", status, body);
            return Err(UpstreamError::new(status, &body));
        }

        let details: Value = details_response.json().await?;
        let work_items = details
            .get("value")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(WorkItem::from_raw).collect())
            .unwrap_or_default();

        Ok(WorkItemList { work_items })
    }

    /// Fetch a single work item by id. The response is the raw Azure DevOps
    /// payload. The work item endpoint is organization-scoped.
    pub async fn get_work_item(&self, work_item_id: i64) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/{}/_apis/wit/workitems/{}?api-version={}",
            DEVOPS_BASE_URL, self.org, work_item_id, self.api_version
        );
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new(status, &body));
        }

        Ok(response.json().await?)
    }

    /// Create a new `$Task` work item.
    pub async fn create_work_item(&self, item: &WorkItemCreate) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/_apis/wit/workitems/$Task?api-version={}",
            self.base_url(),
            self.api_version
        );
        let payload = item.to_patch_ops();
        info!("Creating work item with payload: {:?} and url: {}", payload, url);

        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, self.auth_header())
            .header(CONTENT_TYPE, "application/json-patch+json")
            .json(&payload)
            .send()
            .await?;

        // Azure DevOps answers 200 or 201 depending on the api version.
        if !matches!(response.status().as_u16(), 200 | 201) {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Error creating work item: {}", body);
            return Err(UpstreamError::new(status, &body));
        }

        Ok(response.json().await?)
    }

    /// Update the title and/or description of a work item. The caller must
    /// make sure the patch is not empty.
    pub async fn update_work_item(
        &self,
        work_item_id: i64,
        patch: &WorkItemUpdate,
    ) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/_apis/wit/workitems/{}?api-version={}",
            self.base_url(),
            work_item_id,
            self.api_version
        );
        let payload = patch.to_patch_ops();

        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, self.auth_header())
            .header(CONTENT_TYPE, "application/json-patch+json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new(status, &body));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::DEFAULT_API_VERSION;

    fn sample_config() -> UserConfig {
        UserConfig {
            id: 1,
            user_id: 1,
            azure_devops_org: "contoso".to_string(),
            azure_devops_project: "widgets".to_string(),
            azure_devops_pat: "pat-123".to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    #[test]
    fn test_build_wiql() {
        let base = build_wiql(None, None);
        assert!(base.starts_with("SELECT [System.Id], [System.Title], [System.State]"));
        assert!(base.ends_with("ORDER BY [System.ChangedDate] DESC"));
        assert!(!base.contains("AND"));

        let filtered = build_wiql(Some("Active"), Some("capacitor"));
        assert!(filtered.contains("AND [System.State] = 'Active'"));
        assert!(filtered.contains("AND [System.Title] CONTAINS 'capacitor'"));
    }

    #[test]
    fn test_build_wiql_escapes_quotes() {
        let wiql = build_wiql(None, Some("it's broken"));
        assert!(wiql.contains("CONTAINS 'it''s broken'"));
    }

    #[test]
    fn test_auth_header() {
        let client = DevOpsClient::from_config(&sample_config(), None);
        // base64(":pat-123")
        assert_eq!(client.auth_header(), "Basic OnBhdC0xMjM=");
    }

    #[test]
    fn test_pat_override() {
        let client = DevOpsClient::from_config(&sample_config(), Some("other-pat".to_string()));
        let token = format!(":{}", "other-pat");
        assert_eq!(
            client.auth_header(),
            format!("Basic {}", STANDARD.encode(token.as_bytes()))
        );
    }

    #[test]
    fn test_base_url() {
        let client = DevOpsClient::from_config(&sample_config(), None);
        assert_eq!(client.base_url(), "https://dev.azure.com/contoso/widgets");
    }

    #[test]
    fn test_pat_fingerprint_is_stable_and_opaque() {
        let fp = pat_fingerprint("pat-123");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, pat_fingerprint("pat-123"));
        assert_ne!(fp, pat_fingerprint("pat-124"));
        assert!(!fp.contains("pat-123"));
    }
}
