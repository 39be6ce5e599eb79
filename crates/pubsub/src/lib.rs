//! Redis Pub/Sub relay for report changes.
//!
//! Lets several server instances share one live feed. Changes are published
//! to a Redis channel; every instance (the publisher included) receives them
//! on its subscriber connection and forwards them into its local
//! [`ChangeFeed`].

use async_trait::async_trait;
use equalvoice_common::{AppError, AppResult};
use equalvoice_core::services::{ChangeFeed, EventPublisher, EventPublisherService, ReportChange};
use fred::clients::{Client, SubscriberClient};
use fred::error::Error as RedisError;
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::{Config as RedisConfig, ReconnectPolicy};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Name of the report change channel for a key prefix.
#[must_use]
pub fn reports_channel(prefix: &str) -> String {
    format!("{prefix}:reports")
}

/// Parse a channel payload, logging and dropping anything malformed.
fn decode_change(payload: &str) -> Option<ReportChange> {
    match serde_json::from_str::<ReportChange>(payload) {
        Ok(change) => Some(change),
        Err(e) => {
            warn!(error = %e, "Failed to parse report change message");
            None
        }
    }
}

/// Redis Pub/Sub relay.
#[derive(Clone)]
pub struct RedisPubSub {
    publisher: Client,
    subscriber: SubscriberClient,
    channel: String,
    local: ChangeFeed,
}

impl RedisPubSub {
    /// Connect publisher and subscriber clients.
    pub async fn new(redis_url: &str, prefix: &str, local: ChangeFeed) -> Result<Self, RedisError> {
        let config = RedisConfig::from_url(redis_url)?;

        let publisher = Client::new(
            config.clone(),
            None,
            None,
            Some(ReconnectPolicy::default()),
        );
        publisher.init().await?;

        let subscriber =
            SubscriberClient::new(config, None, None, Some(ReconnectPolicy::default()));
        subscriber.init().await?;
        // Re-subscribe after every reconnect
        let _ = subscriber.manage_subscriptions();

        info!("Redis Pub/Sub initialized");

        Ok(Self {
            publisher,
            subscriber,
            channel: reports_channel(prefix),
            local,
        })
    }

    /// Subscribe to the report channel and start relaying into the local feed.
    pub async fn start(&self) -> Result<(), RedisError> {
        self.subscriber.subscribe(self.channel.as_str()).await?;
        info!(channel = %self.channel, "Subscribed to report changes");

        let local = self.local.clone();
        let mut message_stream = self.subscriber.message_rx();

        tokio::spawn(async move {
            loop {
                let message = match message_stream.recv().await {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Report change relay lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(payload) = message.value.as_string() else {
                    continue;
                };
                if let Some(change) = decode_change(&payload) {
                    debug!(report_id = %change.report_id(), "Relaying report change");
                    local.send(change);
                }
            }
            error!("Pub/Sub message stream closed, relay stopped");
        });

        Ok(())
    }

    /// Publish a change to every instance.
    pub async fn publish(&self, change: &ReportChange) -> AppResult<()> {
        let payload =
            serde_json::to_string(change).map_err(|e| AppError::Internal(e.to_string()))?;
        let _: () = self
            .publisher
            .publish(self.channel.as_str(), payload)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        debug!(channel = %self.channel, report_id = %change.report_id(), "Published report change");
        Ok(())
    }

    /// Close both connections.
    pub async fn shutdown(&self) -> Result<(), RedisError> {
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("Redis Pub/Sub shutdown");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RedisPubSub {
    async fn publish_report_change(&self, change: ReportChange) -> AppResult<()> {
        self.publish(&change).await
    }
}

/// Publisher that delivers to the local feed when the relay rejects a change.
///
/// Subscribers on this instance keep seeing their own writes while Redis is
/// unreachable; other instances catch up on their next snapshot reload.
#[derive(Clone)]
pub struct LocalFallback {
    relay: EventPublisherService,
    local: ChangeFeed,
}

impl LocalFallback {
    #[must_use]
    pub fn new(relay: EventPublisherService, local: ChangeFeed) -> Self {
        Self { relay, local }
    }
}

#[async_trait]
impl EventPublisher for LocalFallback {
    async fn publish_report_change(&self, change: ReportChange) -> AppResult<()> {
        if let Err(e) = self.relay.publish_report_change(change.clone()).await {
            warn!(
                error = %e,
                report_id = %change.report_id(),
                "Relay publish failed, delivering locally"
            );
            self.local.send(change);
        }
        Ok(())
    }
}
