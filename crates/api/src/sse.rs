//! Server-Sent Events (SSE) for the live feed.
//!
//! Every feed update is sent as a `snapshot` event holding the full,
//! filtered report list.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use equalvoice_core::apply_filter;
use futures::stream::Stream;
use tokio_stream::StreamExt;

use crate::{extractors::Filter, middleware::AppState, response::report_list};

/// Name of the event carrying a feed snapshot.
pub const SNAPSHOT_EVENT: &str = "snapshot";

/// Live feed SSE stream.
async fn feed(
    State(state): State<AppState>,
    Filter(filter): Filter,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.feed_service.watch().into_stream().map(move |reports| {
        let body = report_list(apply_filter(reports, filter));
        Ok(Event::default()
            .event(SNAPSHOT_EVENT)
            .json_data(&body)
            .unwrap_or_else(|_| Event::default().event(SNAPSHOT_EVENT).data("error")))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Create SSE router.
pub fn router() -> Router<AppState> {
    Router::new().route("/streaming/feed", get(feed))
}
