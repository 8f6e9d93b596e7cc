//! The shared countdown.
//!
//! Browsers cannot share a wall clock and any client may be suspended for an
//! arbitrary gap, so countdowns are derived, never ticked: the only
//! replicated fact is the absolute start instant, and every observer
//! computes the remaining time against its own clock. Expiry is a level,
//! not an edge — any number of observers may detect it and idempotently run
//! the auto-reveal check.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tracing::{debug, warn};

use crate::{
    dao::room_store::RoomStore,
    services::session_service,
    state::room::{Room, TimerState},
};

/// Grace added after the computed deadline before the watcher fires, so the
/// replicated `startedAt` written by a slightly-behind clock still reads as
/// expired when the check runs.
const WATCHER_GRACE_MS: u64 = 100;

/// Current wall-clock instant in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Milliseconds left on the countdown, clamped at zero; `None` when no
/// countdown is running.
pub fn remaining_ms(timer: &TimerState, now_ms: u64) -> Option<u64> {
    let started_at = timer.started_at?;
    let total = timer.duration_seconds.saturating_mul(1000);
    let elapsed = now_ms.saturating_sub(started_at);
    Some(total.saturating_sub(elapsed))
}

/// Whether the countdown has reached zero. A stopped timer never expires.
pub fn expired(timer: &TimerState, now_ms: u64) -> bool {
    matches!(remaining_ms(timer, now_ms), Some(0))
}

/// Whether the room should show the "votes needed" notice: the countdown
/// ran out while the round is still collecting and votes are missing.
pub fn votes_needed(room: &Room, now_ms: u64) -> bool {
    !room.reveal && expired(&room.timer, now_ms) && !room.all_active_voted()
}

/// Spawn a task that sleeps until the countdown deadline and then runs the
/// auto-reveal check against the replicated state.
///
/// The check re-reads everything it decides on, so a timer that was
/// stopped, restarted, or already revealed in the meantime makes the
/// expired watcher a no-op rather than a hazard.
pub fn spawn_expiry_watcher(
    store: Arc<dyn RoomStore>,
    room_id: String,
    started_at: u64,
    duration_seconds: u64,
) {
    tokio::spawn(async move {
        let deadline = started_at
            .saturating_add(duration_seconds.saturating_mul(1000))
            .saturating_add(WATCHER_GRACE_MS);
        let wait = deadline.saturating_sub(now_ms());
        tokio::time::sleep(Duration::from_millis(wait)).await;

        match session_service::run_auto_reveal_check(store, &room_id).await {
            Ok(true) => debug!(room = %room_id, "countdown expired; round auto-revealed"),
            Ok(false) => debug!(room = %room_id, "countdown expired without auto-reveal"),
            Err(err) => warn!(room = %room_id, error = %err, "auto-reveal check failed"),
        }
    });
}
