//! Feed service.
//!
//! Keeps readers in sync with the report collection. A [`FeedStream`] yields
//! a full snapshot (newest first) on start and again after every change
//! published on the [`ChangeFeed`].

use std::str::FromStr;
use std::time::Duration;

use equalvoice_common::{AppError, AppResult, config::FeedConfig};
use equalvoice_db::{ReportDocument, ReportStoreService, entities::report_comment};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::services::event_publisher::{ChangeFeed, ReportChange};

/// Which reports a feed view shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedFilter {
    /// Every report.
    #[default]
    Latest,
    /// Pinned reports only.
    Pinned,
}

impl FromStr for FeedFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(Self::Latest),
            "pinned" => Ok(Self::Pinned),
            other => Err(AppError::BadRequest(format!("Unknown feed filter: {other}"))),
        }
    }
}

/// Keep the reports the filter selects, in their original order.
#[must_use]
pub fn apply_filter(reports: Vec<ReportDocument>, filter: FeedFilter) -> Vec<ReportDocument> {
    match filter {
        FeedFilter::Latest => reports,
        FeedFilter::Pinned => reports.into_iter().filter(|r| r.report.pinned).collect(),
    }
}

/// Comments in display order: admin-authored first, each group in
/// submission order. The input is left untouched.
#[must_use]
pub fn display_comments(comments: &[report_comment::Model]) -> Vec<report_comment::Model> {
    let (mut admins, others): (Vec<_>, Vec<_>) =
        comments.iter().cloned().partition(|c| c.author_is_admin);
    admins.extend(others);
    admins
}

/// Exponential backoff for snapshot retries.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Feed service for business logic.
#[derive(Clone)]
pub struct FeedService {
    reports: ReportStoreService,
    changes: ChangeFeed,
    retry_initial: Duration,
    retry_max: Duration,
}

impl FeedService {
    /// Create a new feed service.
    #[must_use]
    pub fn new(reports: ReportStoreService, changes: ChangeFeed, config: &FeedConfig) -> Self {
        let retry_initial = Duration::from_millis(config.retry_initial_ms.max(1));
        Self {
            reports,
            changes,
            retry_initial,
            retry_max: Duration::from_millis(config.retry_max_ms).max(retry_initial),
        }
    }

    /// One-shot read of every report, newest first.
    pub async fn snapshot(&self) -> AppResult<Vec<ReportDocument>> {
        self.reports.list_reports().await
    }

    /// Open a live feed.
    #[must_use]
    pub fn watch(&self) -> FeedStream {
        FeedStream {
            reports: self.reports.clone(),
            changes: self.changes.subscribe(),
            started: false,
            backoff: Backoff::new(self.retry_initial, self.retry_max),
        }
    }

    /// Call `on_update` with every snapshot until the subscription is cancelled.
    pub fn subscribe<F>(&self, on_update: F) -> FeedSubscription
    where
        F: Fn(Vec<ReportDocument>) + Send + 'static,
    {
        let mut stream = self.watch();
        let task = tokio::spawn(async move {
            while let Some(snapshot) = stream.next().await {
                on_update(snapshot);
            }
            tracing::debug!("Feed subscription ended");
        });

        FeedSubscription { task }
    }
}

/// A live view of the report collection.
pub struct FeedStream {
    reports: ReportStoreService,
    changes: broadcast::Receiver<ReportChange>,
    started: bool,
    backoff: Backoff,
}

impl FeedStream {
    /// Wait for the next snapshot.
    ///
    /// The first call returns the initial load. Later calls wait for a
    /// change and re-query; changes that arrive together produce a single
    /// snapshot. Returns `None` once the change feed is gone.
    pub async fn next(&mut self) -> Option<Vec<ReportDocument>> {
        if self.started {
            match self.changes.recv().await {
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Feed lagged behind changes, resyncing");
                }
                Err(RecvError::Closed) => return None,
            }
            self.drain_pending();
        }
        self.started = true;

        Some(self.load().await)
    }

    /// Convert into a [`Stream`] of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = Vec<ReportDocument>> + Send {
        futures::stream::unfold(self, |mut feed| async move {
            feed.next().await.map(|snapshot| (snapshot, feed))
        })
    }

    fn drain_pending(&mut self) {
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    async fn load(&mut self) -> Vec<ReportDocument> {
        loop {
            match self.reports.list_reports().await {
                Ok(snapshot) => {
                    self.backoff.reset();
                    return snapshot;
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Feed snapshot failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Cancellation handle for [`FeedService::subscribe`].
///
/// Dropping the handle cancels the subscription too.
pub struct FeedSubscription {
    task: JoinHandle<()>,
}

impl FeedSubscription {
    /// Stop delivering snapshots and release the change receiver.
    pub fn cancel(self) {
        self.task.abort();
    }

    /// Whether snapshots are still being delivered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use equalvoice_db::{MemoryStore, NewComment, NewReport, ReportStore, entities::report};
    use futures::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(1);

    fn feed_config() -> FeedConfig {
        FeedConfig {
            channel_capacity: 16,
            retry_initial_ms: 1,
            retry_max_ms: 4,
        }
    }

    fn new_report(title: &str) -> NewReport {
        NewReport {
            title: title.to_string(),
            description: "details".to_string(),
            author_id: "u1".to_string(),
            author_name: None,
            author_photo_url: None,
        }
    }

    fn doc(id: &str, pinned: bool) -> ReportDocument {
        ReportDocument::new(report::Model {
            id: id.to_string(),
            title: id.to_string(),
            description: "d".to_string(),
            author_id: "u1".to_string(),
            author_name: None,
            author_photo_url: None,
            pinned,
            resolved: false,
            created_at: Utc::now().into(),
        })
    }

    fn comment(id: &str, is_admin: bool) -> report_comment::Model {
        report_comment::Model {
            id: id.to_string(),
            report_id: "r1".to_string(),
            author_id: "u1".to_string(),
            author_name: None,
            author_photo_url: None,
            author_is_admin: is_admin,
            text: id.to_string(),
            created_at: Utc::now().into(),
        }
    }

    /// Fails the first `failures` list calls, then delegates.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl ReportStore for FlakyStore {
        async fn create_report(&self, r: NewReport) -> AppResult<ReportDocument> {
            self.inner.create_report(r).await
        }
        async fn find_report(&self, id: &str) -> AppResult<Option<ReportDocument>> {
            self.inner.find_report(id).await
        }
        async fn list_reports(&self) -> AppResult<Vec<ReportDocument>> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AppError::Database("connection reset".to_string()));
            }
            self.inner.list_reports().await
        }
        async fn append_comment(
            &self,
            id: &str,
            c: NewComment,
        ) -> AppResult<report_comment::Model> {
            self.inner.append_comment(id, c).await
        }
        async fn remove_comment(&self, id: &str, c: &str) -> AppResult<bool> {
            self.inner.remove_comment(id, c).await
        }
        async fn add_supporter(&self, id: &str, u: &str) -> AppResult<bool> {
            self.inner.add_supporter(id, u).await
        }
        async fn remove_supporter(&self, id: &str, u: &str) -> AppResult<bool> {
            self.inner.remove_supporter(id, u).await
        }
        async fn toggle_pinned(&self, id: &str) -> AppResult<bool> {
            self.inner.toggle_pinned(id).await
        }
        async fn toggle_resolved(&self, id: &str) -> AppResult<bool> {
            self.inner.toggle_resolved(id).await
        }
        async fn delete_report(&self, id: &str) -> AppResult<()> {
            self.inner.delete_report(id).await
        }
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("latest".parse::<FeedFilter>().unwrap(), FeedFilter::Latest);
        assert_eq!("pinned".parse::<FeedFilter>().unwrap(), FeedFilter::Pinned);
        assert!("oldest".parse::<FeedFilter>().is_err());
        assert_eq!(FeedFilter::default(), FeedFilter::Latest);
    }

    #[test]
    fn test_apply_filter_pinned_keeps_order() {
        let reports = vec![
            doc("a", true),
            doc("b", false),
            doc("c", true),
            doc("d", false),
        ];

        let pinned = apply_filter(reports.clone(), FeedFilter::Pinned);
        let ids: Vec<&str> = pinned.iter().map(ReportDocument::id).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(pinned.iter().all(|r| r.report.pinned));

        assert_eq!(apply_filter(reports.clone(), FeedFilter::Latest), reports);
    }

    #[test]
    fn test_display_comments_admins_first() {
        let stored = vec![
            comment("c1", false),
            comment("c2", true),
            comment("c3", false),
            comment("c4", true),
        ];

        let shown = display_comments(&stored);
        let ids: Vec<&str> = shown.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c4", "c1", "c3"]);

        // Stored order untouched
        assert_eq!(stored[0].id, "c1");
    }

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_watch_initial_then_updates() {
        let store = MemoryStore::new();
        let changes = ChangeFeed::new(16);
        let service = FeedService::new(Arc::new(store.clone()), changes.clone(), &feed_config());

        let mut feed = service.watch();
        let initial = timeout(WAIT, feed.next()).await.unwrap().unwrap();
        assert!(initial.is_empty());

        let created = store.create_report(new_report("Pothole")).await.unwrap();
        changes.send(ReportChange::Created {
            report_id: created.id().to_string(),
        });

        let updated = timeout(WAIT, feed.next()).await.unwrap().unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].id(), created.id());
    }

    #[tokio::test]
    async fn test_burst_of_changes_coalesces() {
        let store = MemoryStore::new();
        let changes = ChangeFeed::new(16);
        let service = FeedService::new(Arc::new(store.clone()), changes.clone(), &feed_config());

        let mut feed = service.watch();
        timeout(WAIT, feed.next()).await.unwrap().unwrap();

        for title in ["a", "b", "c"] {
            let created = store.create_report(new_report(title)).await.unwrap();
            changes.send(ReportChange::Created {
                report_id: created.id().to_string(),
            });
        }

        let snapshot = timeout(WAIT, feed.next()).await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 3);
        // Nothing left queued
        assert!(timeout(Duration::from_millis(20), feed.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_lagged_feed_resyncs() {
        let store = MemoryStore::new();
        let changes = ChangeFeed::new(1);
        let service = FeedService::new(Arc::new(store.clone()), changes.clone(), &feed_config());

        let mut feed = service.watch();
        timeout(WAIT, feed.next()).await.unwrap().unwrap();

        for title in ["a", "b", "c", "d"] {
            let created = store.create_report(new_report(title)).await.unwrap();
            changes.send(ReportChange::Created {
                report_id: created.id().to_string(),
            });
        }

        let snapshot = timeout(WAIT, feed.next()).await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_snapshot_is_retried() {
        let inner = MemoryStore::new();
        inner.create_report(new_report("kept")).await.unwrap();
        let store = FlakyStore {
            inner,
            failures: AtomicUsize::new(3),
        };
        let service = FeedService::new(Arc::new(store), ChangeFeed::new(4), &feed_config());

        let mut feed = service.watch();
        let snapshot = timeout(WAIT, feed.next()).await.unwrap().unwrap();

        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_ends_when_feed_closes() {
        let store = MemoryStore::new();
        let changes = ChangeFeed::new(4);
        let service = FeedService::new(Arc::new(store), changes, &feed_config());

        let feed = service.watch();
        drop(service);

        let snapshots: Vec<_> = timeout(WAIT, feed.into_stream().collect::<Vec<_>>())
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_and_cancel() {
        let store = MemoryStore::new();
        let changes = ChangeFeed::new(16);
        let service = FeedService::new(Arc::new(store.clone()), changes.clone(), &feed_config());

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let subscription = service.subscribe(move |snapshot| {
            let _ = tx.send(snapshot.len());
        });

        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(0));

        let created = store.create_report(new_report("Noise")).await.unwrap();
        changes.send(ReportChange::Created {
            report_id: created.id().to_string(),
        });
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(1));
        assert!(subscription.is_active());

        subscription.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(changes.receiver_count(), 0);

        changes.send(ReportChange::Deleted {
            report_id: created.id().to_string(),
        });
        // The callback (and its sender) is gone
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), None);
    }
}
