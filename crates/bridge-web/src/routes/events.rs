//! Server-Sent Events stream of live message events.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub location_id: Option<String>,
}

/// Stream the events of one location. Each SSE event is named after the
/// live event kind and carries its JSON.
pub async fn live_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let location_id = query
        .location_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("locationId is required".to_string()))?;
    debug!(%location_id, "Live event subscriber connected");

    let stream = BroadcastStream::new(state.engine.broadcaster().subscribe()).filter_map(
        move |item| match item {
            Ok(event) if event.location_id() == location_id => match event.to_json() {
                Ok(data) => Some(Ok(Event::default().event(event.kind()).data(data))),
                Err(e) => {
                    warn!(error = %e, "Live event not serializable");
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                warn!(%location_id, error = %e, "Live event subscriber lagged");
                None
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use axum::http::{header, StatusCode};

    #[tokio::test]
    async fn test_location_required() {
        let app = TestApp::new().await;
        let (status, _) = app.get("/api/events").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stream_opens() {
        let app = TestApp::new().await;
        let response = app.get_response("/api/events?locationId=L1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        assert_eq!(app.state.engine.broadcaster().subscriber_count(), 1);
    }
}
