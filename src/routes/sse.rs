use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    error::AppError,
    routes::room::ensure_room_id,
    services::{session_service::SessionStore, sse_events},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/rooms/{id}/events",
    tag = "sse",
    params(("id" = String, Path, description = "Room token")),
    responses(
        (status = 200, description = "Room snapshot stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown room")
    )
)]
/// Stream realtime room snapshots to a connected client.
pub async fn room_events(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    ensure_room_id(&room_id)?;

    let session = SessionStore::resume(state.store(), state.config(), room_id.clone(), None);
    // Reject unknown rooms before opening a stream; a closed room still
    // streams so clients can observe the closure.
    session.room_snapshot().await?;
    let subscription = session.subscribe().await?;

    info!(room = %room_id, "new room SSE connection");
    Ok(sse_events::room_event_stream(room_id, subscription))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{id}/events", get(room_events))
}
