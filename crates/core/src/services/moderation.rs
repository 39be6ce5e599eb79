//! Moderation service: admin-only report mutations.
//!
//! Callers without the admin flag are not rejected with an error; the
//! operation is skipped and reported as [`ModerationOutcome::Suppressed`].

use crate::services::event_publisher::{EventPublisherService, ReportChange, publish_change};
use crate::services::identity::Identity;
use crate::services::session::SessionService;
use equalvoice_common::AppResult;
use equalvoice_db::ReportStoreService;
use serde::Serialize;

/// What a moderation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ModerationOutcome {
    /// `pinned` now has this value.
    Pinned { pinned: bool },
    /// `resolved` now has this value.
    Resolved { resolved: bool },
    /// The report is gone.
    Deleted,
    /// A comment was removed.
    CommentDeleted,
    /// No stored comment had the given id; nothing changed.
    CommentNotFound,
    /// The caller is not an admin; nothing changed.
    Suppressed,
}

/// Moderation service for business logic.
#[derive(Clone)]
pub struct ModerationService {
    reports: ReportStoreService,
    sessions: SessionService,
    event_publisher: Option<EventPublisherService>,
}

impl ModerationService {
    /// Create a new moderation service.
    #[must_use]
    pub const fn new(reports: ReportStoreService, sessions: SessionService) -> Self {
        Self {
            reports,
            sessions,
            event_publisher: None,
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    async fn is_allowed(&self, identity: Option<&Identity>, action: &str, report_id: &str) -> bool {
        if self.sessions.is_admin(identity).await {
            return true;
        }
        tracing::debug!(
            action,
            report_id = %report_id,
            user_id = identity.map(|i| i.id.as_str()),
            "Moderation suppressed for non-admin"
        );
        false
    }

    /// Flip the report's `pinned` flag.
    pub async fn toggle_pinned(
        &self,
        report_id: &str,
        identity: Option<&Identity>,
    ) -> AppResult<ModerationOutcome> {
        if !self.is_allowed(identity, "pin", report_id).await {
            return Ok(ModerationOutcome::Suppressed);
        }

        let pinned = self.reports.toggle_pinned(report_id).await?;
        tracing::info!(report_id = %report_id, pinned, "Report pin toggled");

        publish_change(
            self.event_publisher.as_ref(),
            ReportChange::PinnedChanged {
                report_id: report_id.to_string(),
                pinned,
            },
        )
        .await;

        Ok(ModerationOutcome::Pinned { pinned })
    }

    /// Flip the report's `resolved` flag.
    pub async fn toggle_resolved(
        &self,
        report_id: &str,
        identity: Option<&Identity>,
    ) -> AppResult<ModerationOutcome> {
        if !self.is_allowed(identity, "resolve", report_id).await {
            return Ok(ModerationOutcome::Suppressed);
        }

        let resolved = self.reports.toggle_resolved(report_id).await?;
        tracing::info!(report_id = %report_id, resolved, "Report resolution toggled");

        publish_change(
            self.event_publisher.as_ref(),
            ReportChange::ResolvedChanged {
                report_id: report_id.to_string(),
                resolved,
            },
        )
        .await;

        Ok(ModerationOutcome::Resolved { resolved })
    }

    /// Delete a report with all its comments and supporters.
    pub async fn delete_report(
        &self,
        report_id: &str,
        identity: Option<&Identity>,
    ) -> AppResult<ModerationOutcome> {
        if !self.is_allowed(identity, "delete", report_id).await {
            return Ok(ModerationOutcome::Suppressed);
        }

        self.reports.delete_report(report_id).await?;
        tracing::info!(report_id = %report_id, "Report deleted");

        publish_change(
            self.event_publisher.as_ref(),
            ReportChange::Deleted {
                report_id: report_id.to_string(),
            },
        )
        .await;

        Ok(ModerationOutcome::Deleted)
    }

    /// Remove one comment from a report.
    pub async fn delete_comment(
        &self,
        report_id: &str,
        comment_id: &str,
        identity: Option<&Identity>,
    ) -> AppResult<ModerationOutcome> {
        if !self.is_allowed(identity, "delete_comment", report_id).await {
            return Ok(ModerationOutcome::Suppressed);
        }

        if !self.reports.remove_comment(report_id, comment_id).await? {
            return Ok(ModerationOutcome::CommentNotFound);
        }
        tracing::info!(report_id = %report_id, comment_id = %comment_id, "Comment deleted");

        publish_change(
            self.event_publisher.as_ref(),
            ReportChange::CommentRemoved {
                report_id: report_id.to_string(),
                comment_id: comment_id.to_string(),
            },
        )
        .await;

        Ok(ModerationOutcome::CommentDeleted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_publisher::ChangeFeed;
    use crate::services::identity::StaticIdentityProvider;
    use equalvoice_common::AppError;
    use equalvoice_db::{MemoryStore, NewComment, NewReport, ReportDocument, ReportStore};
    use std::sync::Arc;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    struct Fixture {
        store: MemoryStore,
        changes: ChangeFeed,
        service: ModerationService,
        report: ReportDocument,
    }

    async fn setup() -> Fixture {
        let store = MemoryStore::new();
        let provider = StaticIdentityProvider::new([
            ("admin".to_string(), identity("admin")),
            ("user".to_string(), identity("user")),
        ]);
        let sessions = SessionService::new(Arc::new(provider), Arc::new(store.clone()), 3600);
        sessions.sign_in("admin").await.unwrap();
        sessions.sign_in("user").await.unwrap();
        store.set_admin("admin", true).await.unwrap();

        let changes = ChangeFeed::new(16);
        let mut service = ModerationService::new(Arc::new(store.clone()), sessions);
        service.set_event_publisher(Arc::new(changes.clone()));

        let report = store
            .create_report(NewReport {
                title: "Flooded underpass".to_string(),
                description: "Since the storm".to_string(),
                author_id: "user".to_string(),
                author_name: None,
                author_photo_url: None,
            })
            .await
            .unwrap();

        Fixture {
            store,
            changes,
            service,
            report,
        }
    }

    async fn add_comment(f: &Fixture, text: &str) -> String {
        f.store
            .append_comment(
                f.report.id(),
                NewComment {
                    author_id: "user".to_string(),
                    author_name: None,
                    author_photo_url: None,
                    author_is_admin: false,
                    text: text.to_string(),
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_non_admin_is_suppressed() {
        let f = setup().await;
        let comment_id = add_comment(&f, "keep me").await;
        let before = f.store.find_report(f.report.id()).await.unwrap();
        let mut rx = f.changes.subscribe();
        let user = identity("user");

        for caller in [Some(&user), None] {
            let id = f.report.id();
            assert_eq!(
                f.service.toggle_pinned(id, caller).await.unwrap(),
                ModerationOutcome::Suppressed
            );
            assert_eq!(
                f.service.toggle_resolved(id, caller).await.unwrap(),
                ModerationOutcome::Suppressed
            );
            assert_eq!(
                f.service.delete_comment(id, &comment_id, caller).await.unwrap(),
                ModerationOutcome::Suppressed
            );
            assert_eq!(
                f.service.delete_report(id, caller).await.unwrap(),
                ModerationOutcome::Suppressed
            );
        }

        assert_eq!(f.store.find_report(f.report.id()).await.unwrap(), before);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_admin_toggle_pinned_twice_restores() {
        let f = setup().await;
        let admin = identity("admin");

        assert_eq!(
            f.service.toggle_pinned(f.report.id(), Some(&admin)).await.unwrap(),
            ModerationOutcome::Pinned { pinned: true }
        );
        assert_eq!(
            f.service.toggle_pinned(f.report.id(), Some(&admin)).await.unwrap(),
            ModerationOutcome::Pinned { pinned: false }
        );

        let stored = f.store.find_report(f.report.id()).await.unwrap().unwrap();
        assert!(!stored.report.pinned);
    }

    #[tokio::test]
    async fn test_admin_toggle_resolved_publishes() {
        let f = setup().await;
        let mut rx = f.changes.subscribe();

        f.service
            .toggle_resolved(f.report.id(), Some(&identity("admin")))
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            ReportChange::ResolvedChanged {
                report_id: f.report.id().to_string(),
                resolved: true
            }
        );
    }

    #[tokio::test]
    async fn test_admin_delete_comment_removes_only_that_one() {
        let f = setup().await;
        let first = add_comment(&f, "same text").await;
        let second = add_comment(&f, "same text").await;
        let third = add_comment(&f, "other").await;
        let admin = identity("admin");

        assert_eq!(
            f.service
                .delete_comment(f.report.id(), &second, Some(&admin))
                .await
                .unwrap(),
            ModerationOutcome::CommentDeleted
        );

        let stored = f.store.find_report(f.report.id()).await.unwrap().unwrap();
        let ids: Vec<&str> = stored.comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), third.as_str()]);
    }

    #[tokio::test]
    async fn test_admin_delete_unknown_comment_changes_nothing() {
        let f = setup().await;
        add_comment(&f, "stays").await;

        let outcome = f
            .service
            .delete_comment(f.report.id(), "no-such-comment", Some(&identity("admin")))
            .await
            .unwrap();

        assert_eq!(outcome, ModerationOutcome::CommentNotFound);
        let stored = f.store.find_report(f.report.id()).await.unwrap().unwrap();
        assert_eq!(stored.comments.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_delete_report() {
        let f = setup().await;
        let admin = identity("admin");

        assert_eq!(
            f.service.delete_report(f.report.id(), Some(&admin)).await.unwrap(),
            ModerationOutcome::Deleted
        );
        assert!(f.store.find_report(f.report.id()).await.unwrap().is_none());

        // Gone for good
        assert!(matches!(
            f.service.toggle_pinned(f.report.id(), Some(&admin)).await,
            Err(AppError::ReportNotFound(_))
        ));
    }
}
