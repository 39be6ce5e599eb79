//! HTTP API layer for EqualVoice.
//!
//! - **Endpoints**: sign-in, reports, engagement and moderation
//! - **Extractors**: the identity behind a session token
//! - **Middleware**: bearer token authentication
//! - **Streaming**: Server-Sent Events carrying live feed snapshots
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;

pub use endpoints::router;
pub use middleware::{AppState, SessionToken, auth_middleware};
