//! Document store abstraction.
//!
//! Profiles and reports are reached through [`ProfileStore`] and
//! [`ReportStore`]. Every mutation is a single atomic primitive (insert,
//! conditional insert, flag flip, single-row delete); callers never rewrite a
//! list field from a local copy.
//!
//! Two backends implement these traits: the sea-orm repositories
//! ([`ProfileRepository`](crate::repositories::ProfileRepository),
//! [`ReportRepository`](crate::repositories::ReportRepository)) and the
//! in-process [`MemoryStore`](crate::memory::MemoryStore).

use std::sync::Arc;

use async_trait::async_trait;
use equalvoice_common::AppResult;
use serde::{Deserialize, Serialize};

use crate::entities::{profile, report, report_comment};

/// A report with its embedded engagement state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub report: report::Model,
    /// Supporter identity ids, in the order support was given. No duplicates.
    pub supporters: Vec<String>,
    /// Comments in submission order.
    pub comments: Vec<report_comment::Model>,
}

impl ReportDocument {
    /// Wrap a freshly created report row.
    #[must_use]
    pub const fn new(report: report::Model) -> Self {
        Self {
            report,
            supporters: Vec::new(),
            comments: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.report.id
    }

    /// Whether the given identity supports this report.
    #[must_use]
    pub fn is_supported_by(&self, identity_id: &str) -> bool {
        self.supporters.iter().any(|s| s == identity_id)
    }
}

/// Fields of a new profile. The store assigns `created_at` and `is_admin = false`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProfile {
    pub identity_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

/// Fields of a new report. The store assigns `id` and `created_at`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewReport {
    pub title: String,
    pub description: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub author_photo_url: Option<String>,
}

/// Fields of a new comment. The store assigns `id` and `created_at`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewComment {
    pub author_id: String,
    pub author_name: Option<String>,
    pub author_photo_url: Option<String>,
    pub author_is_admin: bool,
    pub text: String,
}

/// Profile collection.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Get a profile by identity id.
    async fn find_profile(&self, identity_id: &str) -> AppResult<Option<profile::Model>>;

    /// Create a profile unless one already exists for the identity.
    ///
    /// Existing profiles are never overwritten. Returns whether a record was created.
    async fn create_profile_if_absent(&self, profile: NewProfile) -> AppResult<bool>;
}

/// Report collection.
///
/// Operations addressing a report that does not exist fail with
/// [`AppError::ReportNotFound`](equalvoice_common::AppError::ReportNotFound).
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Create a report with no supporters or comments.
    async fn create_report(&self, report: NewReport) -> AppResult<ReportDocument>;

    /// Get a report by id.
    async fn find_report(&self, id: &str) -> AppResult<Option<ReportDocument>>;

    /// All reports, newest first.
    async fn list_reports(&self) -> AppResult<Vec<ReportDocument>>;

    /// Append a comment to a report.
    async fn append_comment(
        &self,
        report_id: &str,
        comment: NewComment,
    ) -> AppResult<report_comment::Model>;

    /// Remove the comment with the given id from a report.
    ///
    /// Returns `false` and leaves the report untouched when no comment matches.
    async fn remove_comment(&self, report_id: &str, comment_id: &str) -> AppResult<bool>;

    /// Add an identity to the supporter set. Returns whether it was newly added.
    async fn add_supporter(&self, report_id: &str, user_id: &str) -> AppResult<bool>;

    /// Remove an identity from the supporter set. Returns whether it was present.
    async fn remove_supporter(&self, report_id: &str, user_id: &str) -> AppResult<bool>;

    /// Flip `pinned`, returning the new value.
    async fn toggle_pinned(&self, id: &str) -> AppResult<bool>;

    /// Flip `resolved`, returning the new value.
    async fn toggle_resolved(&self, id: &str) -> AppResult<bool>;

    /// Delete a report together with its comments and supporters.
    async fn delete_report(&self, id: &str) -> AppResult<()>;
}

/// Shared profile store handle.
pub type ProfileStoreService = Arc<dyn ProfileStore>;

/// Shared report store handle.
pub type ReportStoreService = Arc<dyn ReportStore>;
