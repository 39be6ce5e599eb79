//! Business logic services.

#![allow(missing_docs)]

pub mod engagement;
pub mod event_publisher;
pub mod feed;
pub mod identity;
pub mod moderation;
pub mod report;
pub mod session;

pub use engagement::EngagementService;
pub use event_publisher::{
    ChangeFeed, EventPublisher, EventPublisherService, NoOpEventPublisher, ReportChange,
};
pub use feed::{
    FeedFilter, FeedService, FeedStream, FeedSubscription, apply_filter, display_comments,
};
pub use identity::{
    Identity, IdentityChange, IdentityProvider, IdentityProviderService, JwtIdentityProvider,
    StaticIdentityProvider,
};
pub use moderation::{ModerationOutcome, ModerationService};
pub use report::{ReportService, SubmitReportInput};
pub use session::{ObserverHandle, SessionService, SignedIn};
