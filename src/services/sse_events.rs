use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde_json::Value;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dao::room_store::StoreSubscription, dto::room::RoomSummary, dto::sse::ServerEvent,
    state::room::Room,
};

const EVENT_HANDSHAKE: &str = "handshake";
const EVENT_ROOM_SNAPSHOT: &str = "room.snapshot";

/// Build the `room.snapshot` event from a replicated subtree value.
///
/// Malformed snapshots are skipped with a warning rather than tearing the
/// stream down; the next write delivers a fresh value anyway.
pub fn snapshot_event(room_id: &str, value: &Value) -> Option<ServerEvent> {
    let room = match serde_json::from_value::<Room>(value.clone()) {
        Ok(room) => room,
        Err(err) => {
            warn!(room = %room_id, error = %err, "skipping malformed room snapshot");
            return None;
        }
    };

    match ServerEvent::json(
        Some(EVENT_ROOM_SNAPSHOT.to_string()),
        &RoomSummary::new(room_id, &room),
    ) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(room = %room_id, error = %err, "failed to serialize room snapshot");
            None
        }
    }
}

/// Convert a room subscription into an SSE response: a handshake, the
/// current snapshot, then one snapshot per replicated change.
pub fn room_event_stream(
    room_id: String,
    subscription: StoreSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from the store subscription and pushes into mpsc
    tokio::spawn(async move {
        let handshake = ServerEvent::new(
            Some(EVENT_HANDSHAKE.to_string()),
            format!("subscribed to room {room_id}"),
        );
        if tx.send(Ok(to_axum_event(handshake))).await.is_err() {
            return;
        }

        if let Some(value) = &subscription.initial {
            if let Some(event) = snapshot_event(&room_id, value) {
                if tx.send(Ok(to_axum_event(event))).await.is_err() {
                    return;
                }
            }
        }

        let mut updates = subscription.updates;
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                received = updates.recv() => {
                    match received {
                        Ok(value) => {
                            let Some(event) = snapshot_event(&room_id, &value) else {
                                continue;
                            };
                            if tx.send(Ok(to_axum_event(event))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        // Skipping lagged deliveries is safe: each message is
                        // a full snapshot, so only the latest one matters.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }

        info!(room = %room_id, "room SSE stream disconnected");
    });

    // response stream reads from mpsc; when the client disconnects axum
    // drops this stream and the forwarder task winds down
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_axum_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}
