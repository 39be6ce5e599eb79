//! Engagement service: comments and support.
//!
//! Every operation here is a no-op for anonymous callers.

use crate::services::event_publisher::{EventPublisherService, ReportChange, publish_change};
use crate::services::identity::Identity;
use crate::services::session::SessionService;
use equalvoice_common::AppResult;
use equalvoice_db::{NewComment, ReportStoreService, entities::report_comment};

/// Engagement service for business logic.
#[derive(Clone)]
pub struct EngagementService {
    reports: ReportStoreService,
    sessions: SessionService,
    event_publisher: Option<EventPublisherService>,
}

impl EngagementService {
    /// Create a new engagement service.
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

    /// Append a comment to a report.
    ///
    /// Returns `Ok(None)` without writing when there is no author or the text
    /// is blank. The stored text is trimmed, and the author's current admin
    /// flag is copied onto the comment.
    pub async fn add_comment(
        &self,
        report_id: &str,
        text: &str,
        author: Option<&Identity>,
    ) -> AppResult<Option<report_comment::Model>> {
        let Some(author) = author else {
            return Ok(None);
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let author_is_admin = self.sessions.is_admin(Some(author)).await;
        let comment = self
            .reports
            .append_comment(
                report_id,
                NewComment {
                    author_id: author.id.clone(),
                    author_name: author.display_name.clone(),
                    author_photo_url: author.photo_url.clone(),
                    author_is_admin,
                    text: text.to_string(),
                },
            )
            .await?;

        tracing::info!(report_id = %report_id, user_id = %author.id, "Comment added");

        publish_change(
            self.event_publisher.as_ref(),
            ReportChange::CommentAdded {
                report_id: report_id.to_string(),
                comment_id: comment.id.clone(),
            },
        )
        .await;

        Ok(Some(comment))
    }

    /// Add the identity to the report's supporters. Supporting twice is harmless.
    pub async fn add_support(&self, report_id: &str, identity: Option<&Identity>) -> AppResult<()> {
        let Some(identity) = identity else {
            return Ok(());
        };

        if self.reports.add_supporter(report_id, &identity.id).await? {
            tracing::info!(report_id = %report_id, user_id = %identity.id, "Report supported");
            self.publish_support_change(report_id, &identity.id).await;
        }
        Ok(())
    }

    /// Withdraw the identity's support. Withdrawing twice is harmless.
    pub async fn remove_support(
        &self,
        report_id: &str,
        identity: Option<&Identity>,
    ) -> AppResult<()> {
        let Some(identity) = identity else {
            return Ok(());
        };

        if self.reports.remove_supporter(report_id, &identity.id).await? {
            tracing::info!(report_id = %report_id, user_id = %identity.id, "Support withdrawn");
            self.publish_support_change(report_id, &identity.id).await;
        }
        Ok(())
    }

    async fn publish_support_change(&self, report_id: &str, user_id: &str) {
        publish_change(
            self.event_publisher.as_ref(),
            ReportChange::SupportChanged {
                report_id: report_id.to_string(),
                user_id: user_id.to_string(),
            },
        )
        .await;
    }
}
