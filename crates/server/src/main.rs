//! EqualVoice server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, middleware};
use equalvoice_api::{AppState, auth_middleware, router as api_router};
use equalvoice_common::{
    Config,
    config::{RedisConfig, StorageBackendKind},
};
use equalvoice_core::{
    ChangeFeed, EngagementService, EventPublisherService, FeedService, JwtIdentityProvider,
    ModerationService, ReportService, SessionService,
};
use equalvoice_db::{
    MemoryStore, ProfileRepository, ProfileStoreService, ReportRepository, ReportStoreService,
};
use equalvoice_pubsub::{LocalFallback, RedisPubSub};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Open the configured document store.
async fn open_stores(
    config: &Config,
) -> Result<(ProfileStoreService, ReportStoreService), Box<dyn std::error::Error>> {
    match config.storage.backend {
        StorageBackendKind::Postgres => {
            let db = Arc::new(equalvoice_db::init(config).await?);
            info!("Connected to database");

            info!("Running database migrations...");
            equalvoice_db::migrate(&db).await?;
            info!("Migrations completed");

            Ok((
                Arc::new(ProfileRepository::new(Arc::clone(&db))),
                Arc::new(ReportRepository::new(db)),
            ))
        }
        StorageBackendKind::Memory => {
            warn!("Using in-memory storage; reports are lost on restart");
            let store = MemoryStore::new();
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
    }
}

/// Start the Redis relay, falling back to in-process delivery if Redis is
/// unreachable.
async fn start_relay(redis: &RedisConfig, changes: &ChangeFeed) -> Option<RedisPubSub> {
    info!("Connecting to Redis...");
    let pubsub = match RedisPubSub::new(&redis.url, &redis.prefix, changes.clone()).await {
        Ok(pubsub) => pubsub,
        Err(e) => {
            warn!(error = %e, "Redis unavailable, feed updates stay local to this instance");
            return None;
        }
    };

    if let Err(e) = pubsub.start().await {
        warn!(error = %e, "Failed to subscribe to report changes, feed updates stay local");
        return None;
    }
    Some(pubsub)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "equalvoice=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting EqualVoice server...");

    // Load configuration
    let config = Config::load()?;

    let (profiles, reports) = open_stores(&config).await?;

    // Change delivery: through Redis when configured, in-process otherwise
    let changes = ChangeFeed::new(config.feed.channel_capacity);
    let relay = match &config.redis {
        Some(redis) => start_relay(redis, &changes).await,
        None => None,
    };
    let event_publisher: EventPublisherService = match &relay {
        Some(pubsub) => Arc::new(LocalFallback::new(
            Arc::new(pubsub.clone()),
            changes.clone(),
        )),
        None => Arc::new(changes.clone()),
    };

    // Initialize services
    let provider = Arc::new(JwtIdentityProvider::new(&config.auth)?);
    let session_service = SessionService::new(provider, profiles, config.auth.session_ttl_secs);
    let observer = session_service.start_observer();

    let feed_service = FeedService::new(reports.clone(), changes, &config.feed);

    let mut report_service = ReportService::new(reports.clone());
    report_service.set_event_publisher(event_publisher.clone());

    let mut engagement_service = EngagementService::new(reports.clone(), session_service.clone());
    engagement_service.set_event_publisher(event_publisher.clone());

    let mut moderation_service = ModerationService::new(reports, session_service.clone());
    moderation_service.set_event_publisher(event_publisher);

    let state = AppState {
        session_service,
        feed_service,
        report_service,
        engagement_service,
        moderation_service,
    };

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    observer.shutdown().await;
    if let Some(pubsub) = relay {
        if let Err(e) = pubsub.shutdown().await {
            warn!(error = %e, "Failed to close Redis connections");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
