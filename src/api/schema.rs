use crate::api::auth::Token;
use crate::devops::client::UpstreamError;
use crate::devops::workitem::WorkItemList;
use crate::model::config::DevOpsConfig;
use crate::model::user::User;
use poem_openapi::{payload::Json, ApiResponse, Object, Tags};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Tags)]
pub enum ApiTags {
    UserManagement,
    Configuration,
    WorkItem,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct ErrorMessage {
    msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct UserLogin {
    pub username: String,
    pub password: String,
}

#[derive(ApiResponse)]
pub enum PostUserResponse {
    #[oai(status = 201)]
    Created(Json<User>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorMessage>),
}

impl PostUserResponse {
    pub fn created(user: User) -> Self {
        Self::Created(Json(user))
    }

    pub fn bad_request(msg: String) -> Self {
        Self::BadRequest(Json(ErrorMessage { msg }))
    }
}

#[derive(ApiResponse)]
pub enum TokenResponse {
    #[oai(status = 200)]
    Ok(Json<Token>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorMessage>),

    #[oai(status = 401)]
    Unauthorized(Json<ErrorMessage>),
}

impl TokenResponse {
    pub fn ok(token: Token) -> Self {
        Self::Ok(Json(token))
    }

    pub fn bad_request(msg: String) -> Self {
        Self::BadRequest(Json(ErrorMessage { msg }))
    }

    pub fn unauthorized(msg: String) -> Self {
        Self::Unauthorized(Json(ErrorMessage { msg }))
    }
}

#[derive(ApiResponse)]
pub enum GetConfigResponse {
    #[oai(status = 200)]
    Ok(Json<DevOpsConfig>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorMessage>),
}

impl GetConfigResponse {
    pub fn ok(config: DevOpsConfig) -> Self {
        Self::Ok(Json(config))
    }

    pub fn bad_request(msg: String) -> Self {
        Self::BadRequest(Json(ErrorMessage { msg }))
    }
}

#[derive(ApiResponse)]
pub enum GetWorkItemsResponse {
    #[oai(status = 200)]
    Ok(Json<WorkItemList>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorMessage>),

    #[oai(status = 404)]
    NotFound(Json<ErrorMessage>),

    #[oai(status = 502)]
    BadGateway(Json<ErrorMessage>),
}

impl GetWorkItemsResponse {
    pub fn ok(work_items: WorkItemList) -> Self {
        Self::Ok(Json(work_items))
    }

    pub fn bad_request(msg: String) -> Self {
        Self::BadRequest(Json(ErrorMessage { msg }))
    }

    pub fn not_found(msg: String) -> Self {
        Self::NotFound(Json(ErrorMessage { msg }))
    }

    pub fn upstream(err: UpstreamError) -> Self {
        Self::BadGateway(Json(ErrorMessage {
            msg: err.to_string(),
        }))
    }
}

/// Responses that pass the raw Azure DevOps payload through to the caller.
#[derive(ApiResponse)]
pub enum RawWorkItemResponse {
    #[oai(status = 200)]
    Ok(Json<Value>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorMessage>),

    #[oai(status = 404)]
    NotFound(Json<ErrorMessage>),

    #[oai(status = 502)]
    BadGateway(Json<ErrorMessage>),
}

impl RawWorkItemResponse {
    pub fn ok(value: Value) -> Self {
        Self::Ok(Json(value))
    }

    pub fn bad_request(msg: String) -> Self {
        Self::BadRequest(Json(ErrorMessage { msg }))
    }

    pub fn not_found(msg: String) -> Self {
        Self::NotFound(Json(ErrorMessage { msg }))
    }

    pub fn upstream(err: UpstreamError) -> Self {
        Self::BadGateway(Json(ErrorMessage {
            msg: err.to_string(),
        }))
    }
}
