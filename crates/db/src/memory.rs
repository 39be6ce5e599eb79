//! In-process document store.
//!
//! Backs both [`ProfileStore`] and [`ReportStore`] with a single
//! `RwLock`-guarded state. Every trait method takes the write lock once, so
//! each mutation is atomic with respect to concurrent callers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use equalvoice_common::{AppError, AppResult, IdGenerator};
use tokio::sync::RwLock;

use crate::entities::{profile, report, report_comment};
use crate::store::{NewComment, NewProfile, NewReport, ProfileStore, ReportDocument, ReportStore};

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<String, profile::Model>,
    /// Reports in insertion order.
    reports: Vec<ReportDocument>,
}

impl MemoryState {
    fn report_mut(&mut self, id: &str) -> AppResult<&mut ReportDocument> {
        self.reports
            .iter_mut()
            .find(|doc| doc.report.id == id)
            .ok_or_else(|| AppError::ReportNotFound(id.to_string()))
    }
}

/// In-memory store for development and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    id_gen: IdGenerator,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the admin flag of a stored profile.
    ///
    /// Admin promotion happens outside the application; this is the
    /// in-process counterpart of editing the profile record directly.
    pub async fn set_admin(&self, identity_id: &str, is_admin: bool) -> AppResult<()> {
        let mut state = self.state.write().await;
        let profile = state
            .profiles
            .get_mut(identity_id)
            .ok_or_else(|| AppError::NotFound(format!("Profile {identity_id}")))?;
        profile.is_admin = is_admin;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_profile(&self, identity_id: &str) -> AppResult<Option<profile::Model>> {
        Ok(self.state.read().await.profiles.get(identity_id).cloned())
    }

    async fn create_profile_if_absent(&self, input: NewProfile) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.profiles.contains_key(&input.identity_id) {
            return Ok(false);
        }

        let model = profile::Model {
            identity_id: input.identity_id.clone(),
            display_name: input.display_name,
            email: input.email,
            photo_url: input.photo_url,
            is_admin: false,
            created_at: Utc::now().into(),
        };
        state.profiles.insert(input.identity_id, model);
        Ok(true)
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn create_report(&self, input: NewReport) -> AppResult<ReportDocument> {
        let doc = ReportDocument::new(report::Model {
            id: self.id_gen.generate(),
            title: input.title,
            description: input.description,
            author_id: input.author_id,
            author_name: input.author_name,
            author_photo_url: input.author_photo_url,
            pinned: false,
            resolved: false,
            created_at: Utc::now().into(),
        });

        self.state.write().await.reports.push(doc.clone());
        Ok(doc)
    }

    async fn find_report(&self, id: &str) -> AppResult<Option<ReportDocument>> {
        let state = self.state.read().await;
        Ok(state.reports.iter().find(|doc| doc.report.id == id).cloned())
    }

    async fn list_reports(&self) -> AppResult<Vec<ReportDocument>> {
        let state = self.state.read().await;
        // Newest insertion first, then a stable sort keeps that order for ties.
        let mut docs: Vec<ReportDocument> = state.reports.iter().rev().cloned().collect();
        docs.sort_by(|a, b| b.report.created_at.cmp(&a.report.created_at));
        Ok(docs)
    }

    async fn append_comment(
        &self,
        report_id: &str,
        input: NewComment,
    ) -> AppResult<report_comment::Model> {
        let mut state = self.state.write().await;
        let doc = state.report_mut(report_id)?;

        let comment = report_comment::Model {
            id: self.id_gen.generate(),
            report_id: report_id.to_string(),
            author_id: input.author_id,
            author_name: input.author_name,
            author_photo_url: input.author_photo_url,
            author_is_admin: input.author_is_admin,
            text: input.text,
            created_at: Utc::now().into(),
        };
        doc.comments.push(comment.clone());
        Ok(comment)
    }

    async fn remove_comment(&self, report_id: &str, comment_id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let doc = state.report_mut(report_id)?;

        let before = doc.comments.len();
        doc.comments.retain(|c| c.id != comment_id);
        Ok(doc.comments.len() != before)
    }

    async fn add_supporter(&self, report_id: &str, user_id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let doc = state.report_mut(report_id)?;

        if doc.is_supported_by(user_id) {
            return Ok(false);
        }
        doc.supporters.push(user_id.to_string());
        Ok(true)
    }

    async fn remove_supporter(&self, report_id: &str, user_id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let doc = state.report_mut(report_id)?;

        let before = doc.supporters.len();
        doc.supporters.retain(|s| s != user_id);
        Ok(doc.supporters.len() != before)
    }

    async fn toggle_pinned(&self, id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let doc = state.report_mut(id)?;
        doc.report.pinned = !doc.report.pinned;
        Ok(doc.report.pinned)
    }

    async fn toggle_resolved(&self, id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let doc = state.report_mut(id)?;
        doc.report.resolved = !doc.report.resolved;
        Ok(doc.report.resolved)
    }

    async fn delete_report(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        let before = state.reports.len();
        state.reports.retain(|doc| doc.report.id != id);
        if state.reports.len() == before {
            return Err(AppError::ReportNotFound(id.to_string()));
        }
        Ok(())
    }
}
