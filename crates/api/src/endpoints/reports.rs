//! Report endpoints.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use equalvoice_common::AppResult;
use equalvoice_core::{SubmitReportInput, apply_filter};
use serde::Deserialize;

use crate::{
    extractors::{Filter, MaybeAuthUser},
    middleware::AppState,
    response::{ApiResponse, CommentResponse, ReportResponse, report_list},
};

/// Request naming a single report.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportIdRequest {
    pub report_id: String,
}

/// Create comment request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub report_id: String,
    pub text: String,
}

/// List reports, newest first.
async fn list(
    State(state): State<AppState>,
    Filter(filter): Filter,
) -> AppResult<ApiResponse<Vec<ReportResponse>>> {
    let reports = state.feed_service.snapshot().await?;
    Ok(ApiResponse::ok(report_list(apply_filter(reports, filter))))
}

/// Show a report.
async fn show(
    State(state): State<AppState>,
    Json(req): Json<ReportIdRequest>,
) -> AppResult<ApiResponse<ReportResponse>> {
    let report = state.report_service.get(&req.report_id).await?;
    Ok(ApiResponse::ok(report.into()))
}

/// Submit a report.
async fn create(
    MaybeAuthUser(identity): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<SubmitReportInput>,
) -> AppResult<ApiResponse<ReportResponse>> {
    let report = state
        .report_service
        .submit(req, identity.as_ref())
        .await?;
    Ok(ApiResponse::ok(report.into()))
}

/// Comment on a report. Answers `null` when nothing was written.
async fn create_comment(
    MaybeAuthUser(identity): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<ApiResponse<Option<CommentResponse>>> {
    let comment = state
        .engagement_service
        .add_comment(&req.report_id, &req.text, identity.as_ref())
        .await?;
    Ok(ApiResponse::ok(comment.map(CommentResponse::from)))
}

/// Support a report.
async fn support(
    MaybeAuthUser(identity): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<ReportIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .engagement_service
        .add_support(&req.report_id, identity.as_ref())
        .await?;
    Ok(ApiResponse::ok(()))
}

/// Withdraw support from a report.
async fn unsupport(
    MaybeAuthUser(identity): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<ReportIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .engagement_service
        .remove_support(&req.report_id, identity.as_ref())
        .await?;
    Ok(ApiResponse::ok(()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports", get(list))
        .route("/reports/show", post(show))
        .route("/reports/create", post(create))
        .route("/reports/comments/create", post(create_comment))
        .route("/reports/support", post(support))
        .route("/reports/unsupport", post(unsupport))
}
