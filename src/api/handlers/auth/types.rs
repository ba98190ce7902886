//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyResponse {
    /// Signed bearer token; also set as the session cookie.
    pub token: String,
    pub user_id: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
}
