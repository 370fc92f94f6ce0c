use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::notify::Topic;
use crate::types::UserRef;

use super::error::ApiError;
use super::routes::{AppState, USER_HEADER};

const LOG_TARGET: &str = "wager_chess::server::events";

/// Server-sent event stream for one topic.
///
/// `user` topics are private: the caller must present the same reference in
/// the user header. Game and tournament topics are readable by anyone who
/// knows the reference.
pub async fn stream_topic(
    State(state): State<Arc<AppState>>,
    Path((kind, reference)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let topic = Topic::parse(&kind, &reference)?;
    if let Topic::User(owner) = topic {
        let caller = headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized(format!("missing {USER_HEADER} header")))?;
        if caller.parse::<UserRef>().ok() != Some(owner) {
            return Err(CoreError::Forbidden.into());
        }
    }

    info!(target = LOG_TARGET, %topic, "subscriber attached");
    let receiver = state.events.subscribe(topic);
    let stream = BroadcastStream::new(receiver).filter_map(move |item| async move {
        match item {
            Ok(event) => {
                let data = serde_json::to_string(&event)
                    .unwrap_or_else(|err| json!({ "error": err.to_string() }).to_string());
                Some(Ok::<Event, Infallible>(
                    Event::default().event(event.event_name()).data(data),
                ))
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                // Subscribers re-fetch on every event, so a gap only delays them.
                warn!(target = LOG_TARGET, %topic, skipped, "subscriber lagged");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text(":")))
}
