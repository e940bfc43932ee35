//! Per-user Azure DevOps configuration. Each user owns at most one row, seeded from the environment defaults on first read.

use anyhow::bail;
use log::debug;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_VERSION: &str = "7.1-preview.7";

/// Service-level defaults used when a user has no configuration row yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevOpsDefaults {
    pub org: String,
    pub project: String,
    pub pat: String,
    pub api_version: String,
}

impl DevOpsDefaults {
    pub fn from_env() -> Self {
        DevOpsDefaults {
            org: std::env::var("AZURE_DEVOPS_ORG").unwrap_or("your-org".to_string()),
            project: std::env::var("AZURE_DEVOPS_PROJECT").unwrap_or("your-project".to_string()),
            pat: std::env::var("AZURE_DEVOPS_PAT").unwrap_or("your-pat".to_string()),
            api_version: std::env::var("API_VERSION").unwrap_or(DEFAULT_API_VERSION.to_string()),
        }
    }
}

/// The stored configuration row. Not exposed through the API directly, the
/// PAT only leaves this module as a [`DevOpsConfig`] view without it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserConfig {
    pub id: i64,
    pub user_id: i64,
    pub azure_devops_org: String,
    pub azure_devops_project: String,
    pub azure_devops_pat: String,
    pub api_version: String,
}

/// The API-facing view of a configuration. We do not return the PAT.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct DevOpsConfig {
    pub azure_devops_org: String,
    pub azure_devops_project: String,
    pub api_version: String,
}

impl From<&UserConfig> for DevOpsConfig {
    fn from(config: &UserConfig) -> Self {
        DevOpsConfig {
            azure_devops_org: config.azure_devops_org.clone(),
            azure_devops_project: config.azure_devops_project.clone(),
            api_version: config.api_version.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object, Default)]
pub struct ConfigUpdate {
    #[oai(skip_serializing_if_is_none)]
    pub azure_devops_org: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    pub azure_devops_project: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    pub azure_devops_pat: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    pub api_version: Option<String>,
}

impl ConfigUpdate {
    /// A new configuration row can only be created when every field is present.
    pub fn is_complete(&self) -> bool {
        self.azure_devops_org.is_some()
            && self.azure_devops_project.is_some()
            && self.azure_devops_pat.is_some()
            && self.api_version.is_some()
    }

    /// Apply the provided fields onto an existing configuration.
    pub fn merge_into(&self, config: &mut UserConfig) {
        if let Some(org) = &self.azure_devops_org {
            config.azure_devops_org = org.clone();
        }
        if let Some(project) = &self.azure_devops_project {
            config.azure_devops_project = project.clone();
        }
        if let Some(pat) = &self.azure_devops_pat {
            config.azure_devops_pat = pat.clone();
        }
        if let Some(api_version) = &self.api_version {
            config.api_version = api_version.clone();
        }
    }
}

impl UserConfig {
    pub async fn get_by_user_id(
        pool: &sqlx::PgPool,
        user_id: i64,
    ) -> Result<Option<UserConfig>, anyhow::Error> {
        let sql_str = "SELECT * FROM workhub_user_config WHERE user_id = $1";
        let config = sqlx::query_as::<_, UserConfig>(sql_str)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

        Ok(config)
    }

    /// Fetch the user's configuration, creating one from the service defaults
    /// when it doesn't exist yet.
    pub async fn get_or_create(
        pool: &sqlx::PgPool,
        user_id: i64,
        defaults: &DevOpsDefaults,
    ) -> Result<UserConfig, anyhow::Error> {
        if let Some(config) = UserConfig::get_by_user_id(pool, user_id).await? {
            return Ok(config);
        }

        debug!("No configuration found for user {}, seeding defaults.", user_id);
        let sql_str = "
            INSERT INTO workhub_user_config (user_id, azure_devops_org, azure_devops_project, azure_devops_pat, api_version)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
        ";
        let config = sqlx::query_as::<_, UserConfig>(sql_str)
            .bind(user_id)
            .bind(&defaults.org)
            .bind(&defaults.project)
            .bind(&defaults.pat)
            .bind(&defaults.api_version)
            .fetch_one(pool)
            .await?;

        Ok(config)
    }

    /// Update the user's configuration. Only the provided fields are changed.
    /// Creating a configuration through an update requires all fields.
    pub async fn update(
        pool: &sqlx::PgPool,
        user_id: i64,
        patch: &ConfigUpdate,
    ) -> Result<UserConfig, anyhow::Error> {
        match UserConfig::get_by_user_id(pool, user_id).await? {
            Some(mut config) => {
                patch.merge_into(&mut config);

                let sql_str = "
                    UPDATE workhub_user_config
                    SET azure_devops_org = $1, azure_devops_project = $2, azure_devops_pat = $3, api_version = $4
                    WHERE user_id = $5
                    RETURNING *
                ";
                let config = sqlx::query_as::<_, UserConfig>(sql_str)
                    .bind(&config.azure_devops_org)
                    .bind(&config.azure_devops_project)
                    .bind(&config.azure_devops_pat)
                    .bind(&config.api_version)
                    .bind(user_id)
                    .fetch_one(pool)
                    .await?;

                Ok(config)
            }
            None => {
                if !patch.is_complete() {
                    bail!("All required fields must be provided to create a new configuration.");
                }

                let sql_str = "
                    INSERT INTO workhub_user_config (user_id, azure_devops_org, azure_devops_project, azure_devops_pat, api_version)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING *
                ";
                let config = sqlx::query_as::<_, UserConfig>(sql_str)
                    .bind(user_id)
                    .bind(patch.azure_devops_org.as_ref().unwrap())
                    .bind(patch.azure_devops_project.as_ref().unwrap())
                    .bind(patch.azure_devops_pat.as_ref().unwrap())
                    .bind(patch.api_version.as_ref().unwrap())
                    .fetch_one(pool)
                    .await?;

                Ok(config)
            }
        }
    }
}
