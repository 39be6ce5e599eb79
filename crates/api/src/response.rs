//! API response types.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use equalvoice_core::display_comments;
use equalvoice_db::{ReportDocument, entities::report_comment};
use serde::Serialize;

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response.
    pub const fn ok(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Comment response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub author_photo_url: Option<String>,
    pub author_is_admin: bool,
    pub text: String,
    pub created_at: String,
}

impl From<report_comment::Model> for CommentResponse {
    fn from(c: report_comment::Model) -> Self {
        Self {
            id: c.id,
            author_id: c.author_id,
            author_name: c.author_name,
            author_photo_url: c.author_photo_url,
            author_is_admin: c.author_is_admin,
            text: c.text,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

/// Report response with comments in display order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub author_photo_url: Option<String>,
    pub pinned: bool,
    pub resolved: bool,
    pub created_at: String,
    pub supporters: Vec<String>,
    pub support_count: usize,
    pub comments: Vec<CommentResponse>,
}

impl From<ReportDocument> for ReportResponse {
    fn from(doc: ReportDocument) -> Self {
        let comments = display_comments(&doc.comments)
            .into_iter()
            .map(CommentResponse::from)
            .collect();
        let r = doc.report;
        Self {
            id: r.id,
            title: r.title,
            description: r.description,
            author_id: r.author_id,
            author_name: r.author_name,
            author_photo_url: r.author_photo_url,
            pinned: r.pinned,
            resolved: r.resolved,
            created_at: r.created_at.to_rfc3339(),
            support_count: doc.supporters.len(),
            supporters: doc.supporters,
            comments,
        }
    }
}

/// Map a snapshot to its response form.
#[must_use]
pub fn report_list(reports: Vec<ReportDocument>) -> Vec<ReportResponse> {
    reports.into_iter().map(ReportResponse::from).collect()
}

