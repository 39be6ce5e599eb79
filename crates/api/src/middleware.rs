//! API middleware.

#![allow(missing_docs)]

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use equalvoice_core::{
    EngagementService, FeedService, ModerationService, ReportService, SessionService,
};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub session_service: SessionService,
    pub feed_service: FeedService,
    pub report_service: ReportService,
    pub engagement_service: EngagementService,
    pub moderation_service: ModerationService,
}

/// The session token a request was authenticated with.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

fn bearer_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Authentication middleware.
///
/// Attaches the identity behind a live bearer token to the request.
/// Unknown or expired tokens are treated as anonymous.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&req) {
        if let Some(identity) = state.session_service.resolve(&token).await {
            req.extensions_mut().insert(identity);
            req.extensions_mut().insert(SessionToken(token));
        }
    }

    next.run(req).await
}
