//! Moderation endpoints.
//!
//! Non-admin callers get a `suppressed` status rather than an error.

use axum::{Json, Router, extract::State, routing::post};
use equalvoice_common::AppResult;
use equalvoice_core::ModerationOutcome;
use serde::Deserialize;

use crate::{extractors::MaybeAuthUser, middleware::AppState, response::ApiResponse};

use super::reports::ReportIdRequest;

/// Delete comment request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCommentRequest {
    pub report_id: String,
    pub comment_id: String,
}

async fn pin(
    MaybeAuthUser(identity): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<ReportIdRequest>,
) -> AppResult<ApiResponse<ModerationOutcome>> {
    let outcome = state
        .moderation_service
        .toggle_pinned(&req.report_id, identity.as_ref())
        .await?;
    Ok(ApiResponse::ok(outcome))
}

async fn resolve(
    MaybeAuthUser(identity): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<ReportIdRequest>,
) -> AppResult<ApiResponse<ModerationOutcome>> {
    let outcome = state
        .moderation_service
        .toggle_resolved(&req.report_id, identity.as_ref())
        .await?;
    Ok(ApiResponse::ok(outcome))
}

async fn delete_report(
    MaybeAuthUser(identity): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<ReportIdRequest>,
) -> AppResult<ApiResponse<ModerationOutcome>> {
    let outcome = state
        .moderation_service
        .delete_report(&req.report_id, identity.as_ref())
        .await?;
    Ok(ApiResponse::ok(outcome))
}

async fn delete_comment(
    MaybeAuthUser(identity): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<DeleteCommentRequest>,
) -> AppResult<ApiResponse<ModerationOutcome>> {
    let outcome = state
        .moderation_service
        .delete_comment(&req.report_id, &req.comment_id, identity.as_ref())
        .await?;
    Ok(ApiResponse::ok(outcome))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/reports/pin", post(pin))
        .route("/admin/reports/resolve", post(resolve))
        .route("/admin/reports/delete", post(delete_report))
        .route("/admin/reports/comments/delete", post(delete_comment))
}
