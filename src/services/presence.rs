//! Participant lifecycle: `Unjoined → Active → Inactive`, with re-entry.
//!
//! Liveness is leave-driven — there are no heartbeats or timeouts, only
//! explicit signals (page-unload hooks on the client side). Departure keeps
//! the record with `active = false` so exports and history stay intact.

use serde_json::{Map, Value, json};

use crate::state::room::{Participant, Role, Room};

/// Where a participant id stands in a room's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// No record under this id.
    Unjoined,
    /// Present and counted against capacity and the full-ballot check.
    Active,
    /// Departed; record retained for audit and export.
    Inactive,
}

/// Classify a participant id against the replicated room.
pub fn presence_of(room: &Room, participant_id: &str) -> PresenceState {
    match room.participants.get(participant_id) {
        None => PresenceState::Unjoined,
        Some(participant) if participant.active => PresenceState::Active,
        Some(_) => PresenceState::Inactive,
    }
}

/// Role granted to a fresh joiner: the first member of an empty room runs
/// the meeting, everyone after estimates.
pub fn role_for_join(room: &Room) -> Role {
    if room.active_count() == 0 {
        Role::Moderator
    } else {
        Role::Participant
    }
}

/// Patch (relative to the room root) inserting a new participant record.
pub fn join_patch(participant_id: &str, participant: &Participant) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert(
        format!("participants/{participant_id}"),
        serde_json::to_value(participant).unwrap_or_else(|_| json!({})),
    );
    patch
}

/// Patch reactivating a retained record. Role and name stay as stored; the
/// returning member starts the round with no vote, as any joiner does.
pub fn rejoin_patch(participant_id: &str) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert(format!("participants/{participant_id}/active"), json!(true));
    patch.insert(
        format!("participants/{participant_id}/estimation"),
        Value::Null,
    );
    patch
}

/// Patch marking a departure: the record flips inactive and its vote is
/// withdrawn from the round.
pub fn leave_patch(participant_id: &str) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert(format!("participants/{participant_id}/active"), json!(false));
    patch.insert(
        format!("participants/{participant_id}/estimation"),
        Value::Null,
    );
    patch
}

/// Whether `leaving_id` departing leaves nobody present.
pub fn empties_room(room: &Room, leaving_id: &str) -> bool {
    room.active_participants()
        .all(|(id, _)| id == leaving_id)
}

/// Patch entries logically closing the room once the last member left.
/// Physical deletion is a separate, time-delayed housekeeping job.
pub fn closure_patch() -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert("metadata/active".to_string(), json!(false));
    patch.insert("metadata/markedForDeletion".to_string(), json!(true));
    patch
}
