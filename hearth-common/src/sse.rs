//! Server-Sent Events (SSE) utilities
//!
//! Turns HearthEvent broadcast subscriptions into axum SSE responses.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::events::HearthEvent;

/// Serialize a HearthEvent into an SSE frame named after its variant
pub fn to_sse_event(event: &HearthEvent) -> Option<Event> {
    match Event::default().event(event.event_type()).json_data(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.event_type(), e);
            None
        }
    }
}

/// Create an SSE stream from broadcast subscriptions
///
/// `initial` events are sent first so a new client renders current state
/// without waiting for the next transition. `position_rx` is the opt-in
/// high-frequency channel; pass `None` for clients that did not ask for it.
///
/// Lagged receivers skip the missed events and keep streaming; the stream ends
/// when the state channel closes.
pub fn create_event_sse_stream(
    service_name: &'static str,
    initial: Vec<HearthEvent>,
    mut state_rx: broadcast::Receiver<HearthEvent>,
    mut position_rx: Option<broadcast::Receiver<HearthEvent>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        "New SSE client connected to {} (position updates: {})",
        service_name,
        position_rx.is_some()
    );

    let stream = async_stream::stream! {
        for event in initial {
            if let Some(frame) = to_sse_event(&event) {
                yield Ok(frame);
            }
        }

        loop {
            let received = tokio::select! {
                result = state_rx.recv() => match result {
                    Ok(event) => Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SSE: {} client lagged, skipped {} events", service_name, skipped);
                        None
                    }
                    Err(RecvError::Closed) => break,
                },
                result = recv_optional(&mut position_rx) => match result {
                    Ok(event) => Some(event),
                    Err(RecvError::Lagged(_)) => None,
                    Err(RecvError::Closed) => {
                        position_rx = None;
                        None
                    }
                },
            };

            if let Some(event) = received {
                debug!("SSE: sending {}", event.event_type());
                if let Some(frame) = to_sse_event(&event) {
                    yield Ok(frame);
                }
            }
        }

        info!("SSE: {} event stream closed", service_name);
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn recv_optional(
    rx: &mut Option<broadcast::Receiver<HearthEvent>>,
) -> Result<HearthEvent, RecvError> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{PlaybackSource, PlaybackStateSnapshot};

    #[test]
    fn test_to_sse_event_serializes_snapshot() {
        let event = HearthEvent::PlaybackStateChanged {
            snapshot: PlaybackStateSnapshot::idle(PlaybackSource::Radio),
            timestamp: chrono::Utc::now(),
        };
        assert!(to_sse_event(&event).is_some());
    }

    #[tokio::test]
    async fn test_recv_optional_reads_present_receiver() {
        let (tx, rx) = broadcast::channel(4);
        let mut rx = Some(rx);
        tx.send(HearthEvent::PlaybackPosition {
            source: PlaybackSource::OnDemand,
            position_secs: 3.0,
            duration_secs: 10.0,
            playing: true,
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        let event = recv_optional(&mut rx).await.unwrap();
        assert_eq!(event.event_type(), "PlaybackPosition");
    }

    #[tokio::test]
    async fn test_recv_optional_absent_receiver_never_resolves() {
        let mut rx: Option<broadcast::Receiver<HearthEvent>> = None;
        let result =
            tokio::time::timeout(Duration::from_millis(20), recv_optional(&mut rx)).await;
        assert!(result.is_err());
    }
}
