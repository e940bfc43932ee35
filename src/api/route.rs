//! This module defines the routes of the API.

use crate::api::auth::{
    access_token_expire_minutes_from_env, create_access_token, secret_key_from_env,
    CustomSecurityScheme, Token,
};
use crate::api::schema::{
    ApiTags, GetConfigResponse, GetWorkItemsResponse, PostUserResponse, RawWorkItemResponse,
    TokenResponse, UserLogin,
};
use crate::devops::client::DevOpsClient;
use crate::devops::workitem::{WorkItemCreate, WorkItemUpdate};
use crate::model::config::{ConfigUpdate, DevOpsConfig, DevOpsDefaults, UserConfig};
use crate::model::user::{User, UserCreate};
use log::{info, warn};
use poem::web::Data;
use poem_openapi::{
    param::Header, param::Path, param::Query, payload::Json, OpenApi,
};
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u64 = 200;

enum RouteError {
    NotFound(String),
    BadRequest(String),
}

/// Look up the caller's stored configuration. Unlike `GET /config`, the work
/// item routes do not seed a default configuration.
async fn get_user_config(pool: &sqlx::PgPool, username: &str) -> Result<UserConfig, RouteError> {
    let user = match User::get_by_username(pool, username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Err(RouteError::NotFound(format!(
                "User {} not found.",
                username
            )))
        }
        Err(e) => return Err(RouteError::BadRequest(format!("Failed to fetch user: {}", e))),
    };

    match UserConfig::get_by_user_id(pool, user.id).await {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Err(RouteError::NotFound(
            "No configuration found for the user.".to_string(),
        )),
        Err(e) => Err(RouteError::BadRequest(format!(
            "Failed to fetch configuration: {}",
            e
        ))),
    }
}

pub struct WorkhubApi;

#[OpenApi]
impl WorkhubApi {
    /// Call `/api/v1/users` to register a new user.
    #[oai(
        path = "/api/v1/users",
        method = "post",
        tag = "ApiTags::UserManagement",
        operation_id = "registerUser"
    )]
    async fn register_user(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        payload: Json<UserCreate>,
    ) -> PostUserResponse {
        let pool_arc = pool.clone();

        match User::register(&pool_arc, &payload.0).await {
            Ok(user) => PostUserResponse::created(user),
            Err(e) => {
                let err = e.to_string();
                warn!("{}", err);
                PostUserResponse::bad_request(err)
            }
        }
    }

    /// Call `/api/v1/login` to exchange a username and password for an access token.
    #[oai(
        path = "/api/v1/login",
        method = "post",
        tag = "ApiTags::UserManagement",
        operation_id = "login"
    )]
    async fn login(&self, pool: Data<&Arc<sqlx::PgPool>>, payload: Json<UserLogin>) -> TokenResponse {
        let pool_arc = pool.clone();

        let user = match User::get_by_username(&pool_arc, &payload.username).await {
            Ok(user) => user,
            Err(e) => {
                let err = format!("Failed to fetch user: {}", e);
                warn!("{}", err);
                return TokenResponse::bad_request(err);
            }
        };

        let user = match user {
            Some(user) if user.verify_password(&payload.password) => user,
            _ => {
                warn!("Login failed for user {}.", payload.username);
                return TokenResponse::unauthorized("Incorrect username or password".to_string());
            }
        };

        let secret_key = secret_key_from_env();
        let expires_minutes = access_token_expire_minutes_from_env();
        match create_access_token(&user.username, &secret_key, expires_minutes) {
            Ok(access_token) => {
                info!("Issued access token for user {}.", user.username);
                TokenResponse::ok(Token {
                    access_token,
                    token_type: "bearer".to_string(),
                })
            }
            Err(e) => {
                let err = format!("Failed to create access token: {}", e);
                warn!("{}", err);
                TokenResponse::bad_request(err)
            }
        }
    }

    /// Call `/api/v1/config` to fetch the Azure DevOps configuration of the
    /// logged-in user. A default configuration is created when none exists.
    #[oai(
        path = "/api/v1/config",
        method = "get",
        tag = "ApiTags::Configuration",
        operation_id = "fetchConfig"
    )]
    async fn fetch_config(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
    ) -> GetConfigResponse {
        let pool_arc = pool.clone();
        let username = &auth.0.username;

        let user = match User::get_by_username(&pool_arc, username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                let err = format!("User {} not found.", username);
                warn!("{}", err);
                return GetConfigResponse::bad_request(err);
            }
            Err(e) => {
                let err = format!("Failed to fetch user: {}", e);
                warn!("{}", err);
                return GetConfigResponse::bad_request(err);
            }
        };

        let defaults = DevOpsDefaults::from_env();
        match UserConfig::get_or_create(&pool_arc, user.id, &defaults).await {
            Ok(config) => GetConfigResponse::ok(DevOpsConfig::from(&config)),
            Err(e) => {
                let err = format!("Failed to fetch configuration: {}", e);
                warn!("{}", err);
                GetConfigResponse::bad_request(err)
            }
        }
    }

    /// Call `/api/v1/config` to update the Azure DevOps configuration of the
    /// logged-in user. Only the provided fields will be updated. If no
    /// configuration exists, all fields must be provided.
    #[oai(
        path = "/api/v1/config",
        method = "put",
        tag = "ApiTags::Configuration",
        operation_id = "updateConfig"
    )]
    async fn update_config(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        payload: Json<ConfigUpdate>,
    ) -> GetConfigResponse {
        let pool_arc = pool.clone();
        let username = &auth.0.username;

        let user = match User::get_by_username(&pool_arc, username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                let err = format!("User {} not found.", username);
                warn!("{}", err);
                return GetConfigResponse::bad_request(err);
            }
            Err(e) => {
                let err = format!("Failed to fetch user: {}", e);
                warn!("{}", err);
                return GetConfigResponse::bad_request(err);
            }
        };

        match UserConfig::update(&pool_arc, user.id, &payload.0).await {
            Ok(config) => GetConfigResponse::ok(DevOpsConfig::from(&config)),
            Err(e) => {
                let err = e.to_string();
                warn!("{}", err);
                GetConfigResponse::bad_request(err)
            }
        }
    }

    /// Call `/api/v1/workitems` with query params to fetch work items from
    /// Azure DevOps, optionally filtered by state and a title keyword.
    #[oai(
        path = "/api/v1/workitems",
        method = "get",
        tag = "ApiTags::WorkItem",
        operation_id = "fetchWorkItems"
    )]
    async fn fetch_work_items(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        state: Query<Option<String>>,
        title: Query<Option<String>>,
        limit: Query<Option<u64>>,
        offset: Query<Option<u64>>,
        #[oai(name = "X-Azure-DevOps-PAT")] x_pat: Header<Option<String>>,
    ) -> GetWorkItemsResponse {
        let pool_arc = pool.clone();

        let limit = limit.0.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit < 1 {
            return GetWorkItemsResponse::bad_request(
                "limit must be greater than 0".to_string(),
            );
        }
        let offset = offset.0.unwrap_or(0);

        let config = match get_user_config(&pool_arc, &auth.0.username).await {
            Ok(config) => config,
            Err(RouteError::NotFound(msg)) => return GetWorkItemsResponse::not_found(msg),
            Err(RouteError::BadRequest(msg)) => return GetWorkItemsResponse::bad_request(msg),
        };

        let client = DevOpsClient::from_config(&config, x_pat.0);
        match client
            .list_work_items(
                state.0.as_deref(),
                title.0.as_deref(),
                limit as usize,
                offset as usize,
            )
            .await
        {
            Ok(work_items) => GetWorkItemsResponse::ok(work_items),
            Err(e) => {
                warn!("{}", e);
                GetWorkItemsResponse::upstream(e)
            }
        }
    }

    /// Call `/api/v1/workitems/:work_item_id` to fetch a single work item.
    /// The raw Azure DevOps payload is returned.
    #[oai(
        path = "/api/v1/workitems/:work_item_id",
        method = "get",
        tag = "ApiTags::WorkItem",
        operation_id = "fetchWorkItem"
    )]
    async fn fetch_work_item(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        work_item_id: Path<i64>,
        #[oai(name = "X-Azure-DevOps-PAT")] x_pat: Header<Option<String>>,
    ) -> RawWorkItemResponse {
        let pool_arc = pool.clone();

        let config = match get_user_config(&pool_arc, &auth.0.username).await {
            Ok(config) => config,
            Err(RouteError::NotFound(msg)) => return RawWorkItemResponse::not_found(msg),
            Err(RouteError::BadRequest(msg)) => return RawWorkItemResponse::bad_request(msg),
        };

        let client = DevOpsClient::from_config(&config, x_pat.0);
        match client.get_work_item(work_item_id.0).await {
            Ok(value) => RawWorkItemResponse::ok(value),
            Err(e) => {
                warn!("{}", e);
                RawWorkItemResponse::upstream(e)
            }
        }
    }

    /// Call `/api/v1/workitems` to create a new task work item.
    #[oai(
        path = "/api/v1/workitems",
        method = "post",
        tag = "ApiTags::WorkItem",
        operation_id = "createWorkItem"
    )]
    async fn create_work_item(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        payload: Json<WorkItemCreate>,
        #[oai(name = "X-Azure-DevOps-PAT")] x_pat: Header<Option<String>>,
    ) -> RawWorkItemResponse {
        let pool_arc = pool.clone();

        let config = match get_user_config(&pool_arc, &auth.0.username).await {
            Ok(config) => config,
            Err(RouteError::NotFound(msg)) => return RawWorkItemResponse::not_found(msg),
            Err(RouteError::BadRequest(msg)) => return RawWorkItemResponse::bad_request(msg),
        };

        let client = DevOpsClient::from_config(&config, x_pat.0);
        match client.create_work_item(&payload.0).await {
            Ok(value) => RawWorkItemResponse::ok(value),
            Err(e) => {
                warn!("{}", e);
                RawWorkItemResponse::upstream(e)
            }
        }
    }

    /// Call `/api/v1/workitems/:work_item_id` to update the title and/or
    /// description of a work item.
    #[oai(
        path = "/api/v1/workitems/:work_item_id",
        method = "patch",
        tag = "ApiTags::WorkItem",
        operation_id = "updateWorkItem"
    )]
    async fn update_work_item(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        auth: CustomSecurityScheme,
        work_item_id: Path<i64>,
        payload: Json<WorkItemUpdate>,
        #[oai(name = "X-Azure-DevOps-PAT")] x_pat: Header<Option<String>>,
    ) -> RawWorkItemResponse {
        let pool_arc = pool.clone();

        if payload.0.to_patch_ops().is_empty() {
            return RawWorkItemResponse::bad_request(
                "No fields provided for update.".to_string(),
            );
        }

        let config = match get_user_config(&pool_arc, &auth.0.username).await {
            Ok(config) => config,
            Err(RouteError::NotFound(msg)) => return RawWorkItemResponse::not_found(msg),
            Err(RouteError::BadRequest(msg)) => return RawWorkItemResponse::bad_request(msg),
        };

        let client = DevOpsClient::from_config(&config, x_pat.0);
        match client.update_work_item(work_item_id.0, &payload.0).await {
            Ok(value) => RawWorkItemResponse::ok(value),
            Err(e) => {
                warn!("{}", e);
                RawWorkItemResponse::upstream(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::create_access_token;
    use crate::{run_migrations, setup_test_db};
    use poem::http::StatusCode;
    use poem::middleware::AddData;
    use poem::test::TestClient;
    use poem::{Endpoint, EndpointExt, Route};
    use poem_openapi::OpenApiService;
    use serde_json::json;

    async fn test_client(username: &str) -> TestClient<impl Endpoint> {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL is not set.");
        run_migrations(&database_url).await.unwrap();
        let pool = setup_test_db().await;

        sqlx::query("DELETE FROM workhub_user_config WHERE user_id IN (SELECT id FROM workhub_user WHERE username = $1)")
            .bind(username)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM workhub_user WHERE username = $1")
            .bind(username)
            .execute(&pool)
            .await
            .unwrap();

        let api_service = OpenApiService::new(WorkhubApi, "Workhub", "v0.1.0");
        let app = Route::new()
            .nest_no_strip("/api/v1", api_service)
            .with(AddData::new(Arc::new(pool)));

        TestClient::new(app)
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let client = test_client("route_user").await;

        let payload = json!({
            "username": "route_user",
            "full_name": "Route User",
            "password": "s3cret-pass"
        });
        let resp = client.post("/api/v1/users").body_json(&payload).send().await;
        resp.assert_status(StatusCode::CREATED);

        // Registering the same username again must fail.
        let resp = client.post("/api/v1/users").body_json(&payload).send().await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let resp = client
            .post("/api/v1/login")
            .body_json(&json!({ "username": "route_user", "password": "wrong-pass" }))
            .send()
            .await;
        resp.assert_status(StatusCode::UNAUTHORIZED);

        let resp = client
            .post("/api/v1/login")
            .body_json(&json!({ "username": "route_user", "password": "s3cret-pass" }))
            .send()
            .await;
        resp.assert_status_is_ok();
    }

    #[tokio::test]
    async fn test_update_work_item_rejects_empty_patch() {
        let client = test_client("empty_patch_user").await;

        std::env::set_var("SECRET_KEY", "route-test-secret");
        let token = create_access_token("empty_patch_user", "route-test-secret", 30).unwrap();

        // An empty patch is rejected before anything goes upstream.
        let resp = client
            .patch("/api/v1/workitems/42")
            .header("Authorization", format!("Bearer {}", token))
            .body_json(&json!({}))
            .send()
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_work_items_require_bearer_token() {
        let client = test_client("anon_user").await;

        let resp = client.get("/api/v1/workitems").send().await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
    }
}
