//! Sign-in endpoints.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use equalvoice_common::AppResult;
use equalvoice_core::{Identity, SignedIn};
use serde::{Deserialize, Serialize};

use crate::{
    extractors::{AuthToken, AuthUser},
    middleware::AppState,
    response::ApiResponse,
};

/// Sign-in request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    /// Credential issued by the identity provider.
    pub credential: String,
}

/// Current identity response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub identity: Identity,
    pub is_admin: bool,
}

/// Exchange a provider credential for a session token.
async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> AppResult<ApiResponse<SignedIn>> {
    let signed_in = state.session_service.sign_in(&req.credential).await?;
    Ok(ApiResponse::ok(signed_in))
}

/// Revoke the current session.
async fn signout(
    AuthToken(token): AuthToken,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<()>> {
    state.session_service.sign_out(&token).await?;
    Ok(ApiResponse::ok(()))
}

/// Get the signed-in identity.
async fn me(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<MeResponse>> {
    let is_admin = state
        .session_service
        .profile(&identity)
        .await?
        .is_some_and(|p| p.is_admin);
    Ok(ApiResponse::ok(MeResponse { identity, is_admin }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signin", post(signin))
        .route("/auth/signout", post(signout))
        .route("/i", get(me))
}
