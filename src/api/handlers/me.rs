//! Authenticated self-service endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

use super::auth::gateway::require_auth;
use super::auth::AuthState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user profile.", body = MeResponse),
        (status = 401, description = "Missing, invalid, or expired credential.")
    ),
    tag = "me"
)]
pub async fn get_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => {
            let response = MeResponse {
                id: user.user_id.to_string(),
                email: user.email,
                display_name: user.display_name,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(status) => status.into_response(),
    }
}
