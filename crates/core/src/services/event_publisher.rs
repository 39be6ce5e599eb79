//! Report change events.
//!
//! Every write to the report collection publishes a [`ReportChange`]. The
//! in-process [`ChangeFeed`] fans changes out to live feed streams; the
//! pubsub crate provides a Redis-backed publisher that relays changes
//! between instances and feeds them into the local [`ChangeFeed`].

use async_trait::async_trait;
use equalvoice_common::AppResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A change to the report collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReportChange {
    /// A report was submitted.
    #[serde(rename_all = "camelCase")]
    Created { report_id: String },
    /// A comment was appended.
    #[serde(rename_all = "camelCase")]
    CommentAdded {
        report_id: String,
        comment_id: String,
    },
    /// A comment was removed by a moderator.
    #[serde(rename_all = "camelCase")]
    CommentRemoved {
        report_id: String,
        comment_id: String,
    },
    /// The supporter set changed.
    #[serde(rename_all = "camelCase")]
    SupportChanged { report_id: String, user_id: String },
    #[serde(rename_all = "camelCase")]
    PinnedChanged { report_id: String, pinned: bool },
    #[serde(rename_all = "camelCase")]
    ResolvedChanged { report_id: String, resolved: bool },
    /// The report and everything attached to it was deleted.
    #[serde(rename_all = "camelCase")]
    Deleted { report_id: String },
}

impl ReportChange {
    /// The report this change applies to.
    #[must_use]
    pub fn report_id(&self) -> &str {
        match self {
            Self::Created { report_id }
            | Self::CommentAdded { report_id, .. }
            | Self::CommentRemoved { report_id, .. }
            | Self::SupportChanged { report_id, .. }
            | Self::PinnedChanged { report_id, .. }
            | Self::ResolvedChanged { report_id, .. }
            | Self::Deleted { report_id } => report_id,
        }
    }
}

/// Trait for publishing report changes.
///
/// Lets the core services publish without depending on the transport.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a change to the report collection.
    async fn publish_report_change(&self, change: ReportChange) -> AppResult<()>;
}

/// Shared event publisher handle.
pub type EventPublisherService = Arc<dyn EventPublisher>;

/// A no-op implementation of `EventPublisher` for when live updates are disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_report_change(&self, _change: ReportChange) -> AppResult<()> {
        Ok(())
    }
}

/// Publish a change if a publisher is configured.
///
/// Failures are logged and swallowed; the write that caused the change has
/// already succeeded.
pub(crate) async fn publish_change(publisher: Option<&EventPublisherService>, change: ReportChange) {
    let Some(publisher) = publisher else {
        return;
    };

    let report_id = change.report_id().to_string();
    if let Err(e) = publisher.publish_report_change(change).await {
        tracing::warn!(error = %e, report_id = %report_id, "Failed to publish report change");
    }
}

/// In-process fan-out of report changes.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ReportChange>,
}

impl ChangeFeed {
    /// Create a change feed with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new receiver. It sees every change sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReportChange> {
        self.sender.subscribe()
    }

    /// Deliver a change to local receivers.
    pub fn send(&self, change: ReportChange) {
        // An error only means nobody is watching right now.
        let _ = self.sender.send(change);
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for ChangeFeed {
    async fn publish_report_change(&self, change: ReportChange) -> AppResult<()> {
        self.send(change);
        Ok(())
    }
}
