//! The session façade: the one API through which the rest of the
//! application reads and mutates a room.
//!
//! Every operation validates against the latest replicated value, then
//! issues a single partial update scoped to the fields that must change
//! together. The local view is never updated optimistically — callers
//! observe their own writes through the same subscription path as everyone
//! else's.

use std::{future::Future, sync::Arc};

use rand::Rng;
use serde_json::{Map, Value, json};
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    dao::room_store::{RoomStore, StorePath, StoreSubscription},
    error::ServiceError,
    services::{capacity, presence, timer},
    state::{
        room::{Issue, IssueStatus, Participant, PlanTier, Room, RoomMeta, TimerState},
        voting::{VoteEvent, VotePhase, VotingProtocol},
    },
};

/// Room identifiers are short shareable tokens.
const ROOM_ID_LENGTH: usize = 8;
const ROOM_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Round duration a fresh room starts with, until the moderator changes it.
const DEFAULT_TIMER_SECONDS: u64 = 60;

/// Identity of one attached client: which room, and which member it is.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    /// Room this session is attached to.
    pub room_id: String,
    /// Local participant id, once joined.
    pub participant_id: Option<String>,
}

/// Status slot published for passive observers (busy spinners, global
/// error banners) that did not initiate the failing action.
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    /// True while a write is in flight.
    pub is_loading: bool,
    /// Message of the last failed action; cleared by the next success.
    pub last_error: Option<String>,
}

/// Façade over the replicated store for one client session.
pub struct SessionStore {
    store: Arc<dyn RoomStore>,
    config: Arc<AppConfig>,
    identity: RwLock<Option<SessionIdentity>>,
    status: watch::Sender<SessionStatus>,
}

impl SessionStore {
    /// A detached session: no room, no participant.
    pub fn new(store: Arc<dyn RoomStore>, config: Arc<AppConfig>) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            store,
            config,
            identity: RwLock::new(None),
            status,
        }
    }

    /// Re-attach to a known room (and participant, when the client retained
    /// its id). This is the "resume session" entry point; callers should
    /// check [`is_room_active`] before resuming blindly.
    pub fn resume(
        store: Arc<dyn RoomStore>,
        config: Arc<AppConfig>,
        room_id: String,
        participant_id: Option<String>,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            store,
            config,
            identity: RwLock::new(Some(SessionIdentity {
                room_id,
                participant_id,
            })),
            status,
        }
    }

    /// Watch the busy/error status slot.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Current session identity, if attached.
    pub async fn identity(&self) -> Option<SessionIdentity> {
        self.identity.read().await.clone()
    }

    /// Create a room and attach this session to it.
    ///
    /// The creator's plan tier is snapshotted into the room metadata so
    /// later plan changes never affect a running meeting. On failure the
    /// room must be treated as non-existent; the whole room is written by
    /// one update, so no partial state is ever observable.
    pub async fn create_room(
        &self,
        series_key: &str,
        title: Option<String>,
        creator_plan: PlanTier,
        creator_user_id: Option<String>,
    ) -> Result<String, ServiceError> {
        self.run_write(async {
            let series_values = self
                .config
                .series_values(series_key)
                .ok_or_else(|| {
                    let known = self.config.series_keys().collect::<Vec<_>>().join(", ");
                    ServiceError::Validation(format!(
                        "unknown series `{series_key}` (known series: {known})"
                    ))
                })?
                .to_vec();

            if let Some(account) = &creator_user_id {
                let active = count_active_rooms_for(&self.store, account).await?;
                let features = self.config.plan_features(creator_plan);
                if !capacity::can_create_room(active, features) {
                    return Err(ServiceError::CapacityExceeded(format!(
                        "plan `{}` allows at most {} active room(s)",
                        creator_plan.as_str(),
                        features.max_active_rooms
                    )));
                }
            }

            let room_id = generate_room_id();
            let room = Room {
                metadata: RoomMeta {
                    created_at: timer::now_ms(),
                    series_key: series_key.to_string(),
                    series_values,
                    title: title.filter(|t| !t.trim().is_empty()),
                    active: true,
                    marked_for_deletion: false,
                    creator_plan,
                    creator_user_id,
                },
                participants: Default::default(),
                issues: Default::default(),
                current_issue_id: None,
                reveal: false,
                timer: TimerState {
                    enabled: false,
                    duration_seconds: DEFAULT_TIMER_SECONDS,
                    started_at: None,
                },
            };

            let value = serde_json::to_value(&room)
                .map_err(|err| ServiceError::Unknown(format!("room serialization failed: {err}")))?;
            let mut patch = Map::new();
            patch.insert(room_id.clone(), value);
            self.store
                .update(&StorePath::new(["rooms"]), patch)
                .await
                .map_err(ServiceError::RoomCreationFailed)?;

            *self.identity.write().await = Some(SessionIdentity {
                room_id: room_id.clone(),
                participant_id: None,
            });

            debug!(room = %room_id, series = series_key, "room created");
            Ok(room_id)
        })
        .await
    }

    /// Join a room under a display name, becoming the moderator when the
    /// room has nobody present. Attaches this session as a side effect.
    pub async fn join_room_with_name(
        &self,
        room_id: &str,
        name: &str,
        photo_url: Option<String>,
        user_id: Option<String>,
    ) -> Result<String, ServiceError> {
        self.run_write(async {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::Validation(
                    "participant name must not be empty".into(),
                ));
            }

            let room = self.fetch_open_room(room_id).await?;
            self.ensure_join_capacity(&room)?;

            let participants_path = room_path(room_id).child("participants");
            let participant_id = self.store.push(&participants_path).await?;
            let participant = Participant {
                name: name.to_string(),
                role: presence::role_for_join(&room),
                estimation: None,
                active: true,
                user_id,
                photo_url,
            };
            self.store
                .update(
                    &room_path(room_id),
                    presence::join_patch(&participant_id, &participant),
                )
                .await?;

            *self.identity.write().await = Some(SessionIdentity {
                room_id: room_id.to_string(),
                participant_id: Some(participant_id.clone()),
            });

            Ok(participant_id)
        })
        .await
    }

    /// Re-enter a room with a retained participant id, keeping the stored
    /// name and role. A member that is already present is a no-op.
    pub async fn rejoin(&self, room_id: &str, participant_id: &str) -> Result<(), ServiceError> {
        self.run_write(async {
            let room = self.fetch_open_room(room_id).await?;

            match presence::presence_of(&room, participant_id) {
                presence::PresenceState::Unjoined => {
                    return Err(ServiceError::Validation(format!(
                        "unknown participant `{participant_id}`"
                    )));
                }
                presence::PresenceState::Active => {}
                presence::PresenceState::Inactive => {
                    self.ensure_join_capacity(&room)?;
                    self.store
                        .update(&room_path(room_id), presence::rejoin_patch(participant_id))
                        .await?;
                }
            }

            *self.identity.write().await = Some(SessionIdentity {
                room_id: room_id.to_string(),
                participant_id: Some(participant_id.to_string()),
            });
            Ok(())
        })
        .await
    }

    /// Leave the room: the record flips inactive (never deleted) and the
    /// vote is withdrawn. When nobody is left, the room is logically
    /// closed in the same update. Calling twice is a no-op.
    pub async fn leave_room(&self) -> Result<(), ServiceError> {
        self.run_write(async {
            let (room_id, participant_id) = self.require_participant().await?;

            let Some(value) = self.store.get(&room_path(&room_id)).await? else {
                // The room is already gone; nothing left to mark.
                return Ok(());
            };
            let room = parse_room(value, &room_id)?;

            match presence::presence_of(&room, &participant_id) {
                presence::PresenceState::Active => {}
                // Already departed (or never joined): second leave is a no-op.
                _ => return Ok(()),
            }

            let mut patch = presence::leave_patch(&participant_id);
            let emptied = presence::empties_room(&room, &participant_id);
            if emptied {
                patch.extend(presence::closure_patch());
            }
            self.store.update(&room_path(&room_id), patch).await?;

            // The departing member may have been the only missing vote of
            // an expired round.
            if !emptied {
                if let Err(err) = run_auto_reveal_check(self.store.clone(), &room_id).await {
                    warn!(room = %room_id, error = %err, "auto-reveal check failed after leave");
                }
            }
            Ok(())
        })
        .await
    }

    /// Set the caller's estimate for the current round.
    ///
    /// Rejected once estimates are revealed; accepted while collecting even
    /// when no issue is selected (the vote is tracked against the round).
    /// Touches no other participant's state.
    pub async fn select_estimation(&self, value: &str) -> Result<(), ServiceError> {
        self.run_write(async {
            let (room_id, participant_id) = self.require_participant().await?;
            let room = self.fetch_open_room(&room_id).await?;

            VotingProtocol::from_reveal(room.reveal)
                .apply(VoteEvent::SelectEstimation)
                .map_err(|_| {
                    ServiceError::Validation("cannot change estimation after reveal".into())
                })?;

            if !room.metadata.series_values.iter().any(|v| v == value) {
                return Err(ServiceError::Validation(format!(
                    "value `{value}` is not part of series `{}`",
                    room.metadata.series_key
                )));
            }

            match presence::presence_of(&room, &participant_id) {
                presence::PresenceState::Active => {}
                presence::PresenceState::Inactive => {
                    return Err(ServiceError::Validation(
                        "participant has left the room".into(),
                    ));
                }
                presence::PresenceState::Unjoined => {
                    return Err(ServiceError::Validation(format!(
                        "unknown participant `{participant_id}`"
                    )));
                }
            }

            let mut patch = Map::new();
            patch.insert(
                format!("participants/{participant_id}/estimation"),
                json!(value),
            );
            self.store.update(&room_path(&room_id), patch).await?;

            // The countdown may already have run out; this vote might be
            // the one completing the ballot.
            if let Err(err) = run_auto_reveal_check(self.store.clone(), &room_id).await {
                warn!(room = %room_id, error = %err, "auto-reveal check failed after vote");
            }
            Ok(())
        })
        .await
    }

    /// Make all estimates visible. Idempotent; closes the round for the
    /// selected issue (status and average) when one is selected.
    ///
    /// Any member may call this — restriction to moderators is a UI
    /// affordance, not an engine rule (trusted-room model).
    pub async fn reveal_estimations(&self) -> Result<(), ServiceError> {
        self.run_write(async {
            let room_id = self.require_room().await?;
            let room = self.fetch_open_room(&room_id).await?;

            VotingProtocol::from_reveal(room.reveal)
                .apply(VoteEvent::Reveal)
                .map_err(|err| ServiceError::Validation(err.to_string()))?;

            self.store
                .update(&room_path(&room_id), reveal_patch(&room))
                .await?;
            Ok(())
        })
        .await
    }

    /// Start a new round: every estimate is cleared and estimates are
    /// hidden again, in one update. The selected issue is untouched so a
    /// moderator can line up an issue before opening its vote.
    pub async fn start_new_vote(&self) -> Result<(), ServiceError> {
        self.run_write(async {
            let room_id = self.require_room().await?;
            let room = self.fetch_open_room(&room_id).await?;

            VotingProtocol::from_reveal(room.reveal)
                .apply(VoteEvent::StartNewVote)
                .map_err(|err| ServiceError::Validation(err.to_string()))?;

            let mut patch = Map::new();
            patch.insert("reveal".to_string(), json!(false));
            for id in room.participants.keys() {
                patch.insert(format!("participants/{id}/estimation"), Value::Null);
            }
            self.store.update(&room_path(&room_id), patch).await?;
            Ok(())
        })
        .await
    }

    /// Append a work item to the backlog.
    pub async fn add_issue(&self, key: &str, summary: &str) -> Result<String, ServiceError> {
        self.run_write(async {
            let key = key.trim();
            let summary = summary.trim();
            if key.is_empty() {
                return Err(ServiceError::Validation("issue key must not be empty".into()));
            }
            if summary.is_empty() {
                return Err(ServiceError::Validation(
                    "issue summary must not be empty".into(),
                ));
            }

            let room_id = self.require_room().await?;
            self.fetch_open_room(&room_id).await?;

            let issues_path = room_path(&room_id).child("issues");
            let issue_id = self.store.push(&issues_path).await?;
            let issue = Issue {
                key: key.to_string(),
                summary: summary.to_string(),
                created_at: timer::now_ms(),
                status: IssueStatus::Pending,
                average: None,
            };

            let mut patch = Map::new();
            patch.insert(
                format!("issues/{issue_id}"),
                serde_json::to_value(&issue)
                    .map_err(|err| ServiceError::Unknown(format!("issue serialization failed: {err}")))?,
            );
            self.store.update(&room_path(&room_id), patch).await?;
            Ok(issue_id)
        })
        .await
    }

    /// Pass over a pending issue. Skipping twice is a no-op; an already
    /// estimated issue cannot be skipped.
    pub async fn skip_issue(&self, issue_id: &str) -> Result<(), ServiceError> {
        self.run_write(async {
            let room_id = self.require_room().await?;
            let room = self.fetch_open_room(&room_id).await?;

            let issue = room.issues.get(issue_id).ok_or_else(|| {
                ServiceError::Validation(format!("unknown issue `{issue_id}`"))
            })?;
            match issue.status {
                IssueStatus::Skipped => return Ok(()),
                IssueStatus::Estimated => {
                    return Err(ServiceError::Validation(
                        "issue has already been estimated".into(),
                    ));
                }
                IssueStatus::Pending => {}
            }

            let mut patch = Map::new();
            patch.insert(
                format!("issues/{issue_id}/status"),
                json!(IssueStatus::Skipped.as_str()),
            );
            self.store.update(&room_path(&room_id), patch).await?;
            Ok(())
        })
        .await
    }

    /// Point the room at an issue (or clear the selection). Never resets
    /// votes — switching focus and starting a round are independent.
    pub async fn select_current_issue(&self, issue_id: Option<&str>) -> Result<(), ServiceError> {
        self.run_write(async {
            let room_id = self.require_room().await?;
            let room = self.fetch_open_room(&room_id).await?;

            if let Some(id) = issue_id {
                if !room.issues.contains_key(id) {
                    return Err(ServiceError::Validation(format!("unknown issue `{id}`")));
                }
            }

            let mut patch = Map::new();
            patch.insert(
                "currentIssueId".to_string(),
                issue_id.map(|id| json!(id)).unwrap_or(Value::Null),
            );
            self.store.update(&room_path(&room_id), patch).await?;
            Ok(())
        })
        .await
    }

    /// Switch the countdown feature on or off.
    pub async fn set_timer_enabled(&self, enabled: bool) -> Result<(), ServiceError> {
        self.run_write(async {
            let room_id = self.require_room().await?;
            self.fetch_open_room(&room_id).await?;

            let mut patch = Map::new();
            patch.insert("timer/enabled".to_string(), json!(enabled));
            self.store.update(&room_path(&room_id), patch).await?;
            Ok(())
        })
        .await
    }

    /// Configure the round duration.
    pub async fn set_timer_duration(&self, seconds: u64) -> Result<(), ServiceError> {
        self.run_write(async {
            if seconds == 0 {
                return Err(ServiceError::Validation(
                    "timer duration must be strictly positive".into(),
                ));
            }

            let room_id = self.require_room().await?;
            self.fetch_open_room(&room_id).await?;

            let mut patch = Map::new();
            patch.insert("timer/durationSeconds".to_string(), json!(seconds));
            self.store.update(&room_path(&room_id), patch).await?;
            Ok(())
        })
        .await
    }

    /// Start the countdown by replicating the absolute start instant.
    /// Every observer derives the remaining time from it independently.
    pub async fn start_timer(&self) -> Result<(), ServiceError> {
        self.run_write(async {
            let room_id = self.require_room().await?;
            let room = self.fetch_open_room(&room_id).await?;

            let started_at = timer::now_ms();
            let mut patch = Map::new();
            patch.insert("timer/startedAt".to_string(), json!(started_at));
            self.store.update(&room_path(&room_id), patch).await?;

            timer::spawn_expiry_watcher(
                self.store.clone(),
                room_id,
                started_at,
                room.timer.duration_seconds,
            );
            Ok(())
        })
        .await
    }

    /// Stop the countdown; observers immediately see no active countdown.
    pub async fn stop_timer(&self) -> Result<(), ServiceError> {
        self.clear_countdown().await
    }

    /// Clear the countdown, leaving the enabled flag and duration as
    /// configured.
    pub async fn reset_timer(&self) -> Result<(), ServiceError> {
        self.clear_countdown().await
    }

    /// Latest replicated snapshot of the attached room.
    pub async fn room_snapshot(&self) -> Result<Room, ServiceError> {
        let room_id = self.require_room().await?;
        self.fetch_room(&room_id).await
    }

    /// Standing subscription on the attached room's subtree. Reads never
    /// block: the latest snapshot is delivered whenever any observed path
    /// changes.
    pub async fn subscribe(&self) -> Result<StoreSubscription, ServiceError> {
        let room_id = self.require_room().await?;
        Ok(self.store.subscribe(&room_path(&room_id)).await?)
    }

    async fn clear_countdown(&self) -> Result<(), ServiceError> {
        self.run_write(async {
            let room_id = self.require_room().await?;
            self.fetch_open_room(&room_id).await?;

            let mut patch = Map::new();
            patch.insert("timer/startedAt".to_string(), Value::Null);
            self.store.update(&room_path(&room_id), patch).await?;
            Ok(())
        })
        .await
    }

    fn ensure_join_capacity(&self, room: &Room) -> Result<(), ServiceError> {
        let features = self.config.plan_features(room.metadata.creator_plan);
        if !capacity::can_join(room.active_count(), features) {
            return Err(ServiceError::CapacityExceeded(format!(
                "plan `{}` allows at most {} participants per room",
                room.metadata.creator_plan.as_str(),
                features.max_participants
            )));
        }
        Ok(())
    }

    async fn fetch_room(&self, room_id: &str) -> Result<Room, ServiceError> {
        let value = self
            .store
            .get(&room_path(room_id))
            .await?
            .ok_or_else(|| ServiceError::RoomNotFound(room_id.to_string()))?;
        parse_room(value, room_id)
    }

    /// Fetch a room that still accepts actions; closed or marked rooms are
    /// reported as not found so stale clients drop their session.
    async fn fetch_open_room(&self, room_id: &str) -> Result<Room, ServiceError> {
        let room = self.fetch_room(room_id).await?;
        if !room.is_open() {
            return Err(ServiceError::RoomNotFound(room_id.to_string()));
        }
        Ok(room)
    }

    async fn require_room(&self) -> Result<String, ServiceError> {
        self.identity
            .read()
            .await
            .as_ref()
            .map(|identity| identity.room_id.clone())
            .ok_or_else(|| ServiceError::Validation("no room attached to this session".into()))
    }

    async fn require_participant(&self) -> Result<(String, String), ServiceError> {
        let guard = self.identity.read().await;
        let identity = guard
            .as_ref()
            .ok_or_else(|| ServiceError::Validation("no room attached to this session".into()))?;
        let participant_id = identity.participant_id.clone().ok_or_else(|| {
            ServiceError::Validation("no participant joined in this session".into())
        })?;
        Ok((identity.room_id.clone(), participant_id))
    }

    /// Bracket a write: raise the loading flag for its duration and mirror
    /// the outcome into the error slot for passive observers.
    async fn run_write<T>(
        &self,
        work: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        self.status.send_modify(|status| status.is_loading = true);
        let outcome = work.await;
        self.status.send_modify(|status| {
            status.is_loading = false;
            status.last_error = outcome.as_ref().err().map(ToString::to_string);
        });
        outcome
    }
}

/// Path of a room's subtree.
pub fn room_path(room_id: &str) -> StorePath {
    StorePath::new(["rooms", room_id])
}

/// Whether a room still exists and accepts members — the check a local
/// persistence layer runs before offering "resume session".
pub async fn is_room_active(
    store: &Arc<dyn RoomStore>,
    room_id: &str,
) -> Result<bool, ServiceError> {
    match store.get(&room_path(room_id).child("metadata")).await? {
        None => Ok(false),
        Some(value) => {
            let metadata: RoomMeta = serde_json::from_value(value).map_err(|err| {
                ServiceError::Unknown(format!("malformed metadata for room `{room_id}`: {err}"))
            })?;
            Ok(metadata.active && !metadata.marked_for_deletion)
        }
    }
}

/// Level-triggered auto-reveal: reveal the round iff the countdown has run
/// out and every present member (at least one) has voted. Safe to invoke
/// from any number of observers — the decision is recomputed from the
/// replicated state and the write is idempotent.
pub async fn run_auto_reveal_check(
    store: Arc<dyn RoomStore>,
    room_id: &str,
) -> Result<bool, ServiceError> {
    let Some(value) = store.get(&room_path(room_id)).await? else {
        return Ok(false);
    };
    let room = parse_room(value, room_id)?;

    if !room.is_open() || room.reveal {
        return Ok(false);
    }
    if !timer::expired(&room.timer, timer::now_ms()) {
        return Ok(false);
    }

    let next = VotingProtocol::from_reveal(room.reveal)
        .apply(VoteEvent::TimerExpired {
            all_voted: room.all_active_voted(),
        })
        .map_err(|err| ServiceError::Validation(err.to_string()))?;

    if next != VotePhase::Revealed {
        debug!(room = %room_id, "countdown expired with votes still missing");
        return Ok(false);
    }

    store.update(&room_path(room_id), reveal_patch(&room)).await?;
    Ok(true)
}

/// The reveal write: flips the flag and, when an issue is selected, closes
/// the round for it. Shared by the explicit action and the auto-reveal.
fn reveal_patch(room: &Room) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert("reveal".to_string(), json!(true));

    if let Some(issue_id) = &room.current_issue_id {
        if let Some(issue) = room.issues.get(issue_id) {
            if issue.status != IssueStatus::Skipped {
                patch.insert(
                    format!("issues/{issue_id}/status"),
                    json!(IssueStatus::Estimated.as_str()),
                );
                patch.insert(
                    format!("issues/{issue_id}/average"),
                    round_average(room).map(|avg| json!(avg)).unwrap_or(Value::Null),
                );
            }
        }
    }

    patch
}

/// Mean of the numeric estimates of present members. Sentinel values such
/// as `?` or `∞` are excluded; a round with no numeric votes has no
/// average.
fn round_average(room: &Room) -> Option<f64> {
    let votes = room
        .active_participants()
        .filter_map(|(_, participant)| participant.estimation.as_deref())
        .filter_map(|value| value.parse::<f64>().ok())
        .collect::<Vec<_>>();

    if votes.is_empty() {
        return None;
    }
    Some(votes.iter().sum::<f64>() / votes.len() as f64)
}

async fn count_active_rooms_for(
    store: &Arc<dyn RoomStore>,
    account: &str,
) -> Result<usize, ServiceError> {
    let Some(rooms) = store.get(&StorePath::new(["rooms"])).await? else {
        return Ok(0);
    };
    let Some(rooms) = rooms.as_object() else {
        return Ok(0);
    };

    let count = rooms
        .values()
        .filter_map(|room| room.get("metadata"))
        .filter(|metadata| {
            metadata.get("creatorUserId").and_then(Value::as_str) == Some(account)
                && metadata.get("active").and_then(Value::as_bool) == Some(true)
                && metadata.get("markedForDeletion").and_then(Value::as_bool) != Some(true)
        })
        .count();
    Ok(count)
}

fn parse_room(value: Value, room_id: &str) -> Result<Room, ServiceError> {
    serde_json::from_value(value)
        .map_err(|err| ServiceError::Unknown(format!("malformed tree for room `{room_id}`: {err}")))
}

fn generate_room_id() -> String {
    let mut rng = rand::rng();
    (0..ROOM_ID_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..ROOM_ID_ALPHABET.len());
            ROOM_ID_ALPHABET[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::room_store::memory::MemoryRoomStore, state::room::Role};

    fn engine(store: &Arc<dyn RoomStore>) -> SessionStore {
        SessionStore::new(store.clone(), Arc::new(AppConfig::default()))
    }

    async fn free_room(store: &Arc<dyn RoomStore>) -> String {
        engine(store)
            .create_room("fibonacci", Some("Sprint 12".into()), PlanTier::Free, None)
            .await
            .unwrap()
    }

    async fn join(store: &Arc<dyn RoomStore>, room_id: &str, name: &str) -> (SessionStore, String) {
        let session = engine(store);
        let participant_id = session
            .join_room_with_name(room_id, name, None, None)
            .await
            .unwrap();
        (session, participant_id)
    }

    async fn snapshot(store: &Arc<dyn RoomStore>, room_id: &str) -> Room {
        let value = store.get(&room_path(room_id)).await.unwrap().unwrap();
        serde_json::from_value(value).unwrap()
    }

    async fn backdate_timer(store: &Arc<dyn RoomStore>, room_id: &str, seconds_ago: u64) {
        let mut patch = Map::new();
        patch.insert(
            "timer/startedAt".to_string(),
            json!(timer::now_ms() - seconds_ago * 1000),
        );
        store.update(&room_path(room_id), patch).await.unwrap();
    }

    #[tokio::test]
    async fn create_room_rejects_unknown_series() {
        let store = MemoryRoomStore::shared();
        let err = engine(&store)
            .create_room("dogecoin", None, PlanTier::Free, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn first_joiner_moderates_later_joiners_estimate() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;

        let (_, alice) = join(&store, &room_id, "Alice").await;
        let (_, bob) = join(&store, &room_id, "Bob").await;

        let room = snapshot(&store, &room_id).await;
        assert_eq!(room.participants[&alice].role, Role::Moderator);
        assert_eq!(room.participants[&bob].role, Role::Participant);
    }

    #[tokio::test]
    async fn join_rejects_missing_or_closed_rooms() {
        let store = MemoryRoomStore::shared();
        let session = engine(&store);

        let err = session
            .join_room_with_name("nosuchrm", "Alice", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotFound(_)));

        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;
        alice.leave_room().await.unwrap();

        let err = session
            .join_room_with_name(&room_id, "Bob", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn estimation_can_change_until_reveal_then_freezes() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, alice_id) = join(&store, &room_id, "Alice").await;

        alice.select_estimation("5").await.unwrap();
        alice.select_estimation("8").await.unwrap();
        let room = snapshot(&store, &room_id).await;
        assert_eq!(room.participants[&alice_id].estimation.as_deref(), Some("8"));

        alice.reveal_estimations().await.unwrap();
        let err = alice.select_estimation("3").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let room = snapshot(&store, &room_id).await;
        assert_eq!(room.participants[&alice_id].estimation.as_deref(), Some("8"));
    }

    #[tokio::test]
    async fn estimation_must_come_from_the_series() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;

        let err = alice.select_estimation("7").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        alice.select_estimation("?").await.unwrap();
    }

    #[tokio::test]
    async fn reveal_is_idempotent() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;
        alice.select_estimation("5").await.unwrap();

        alice.reveal_estimations().await.unwrap();
        let first = serde_json::to_value(snapshot(&store, &room_id).await).unwrap();
        alice.reveal_estimations().await.unwrap();
        let second = serde_json::to_value(snapshot(&store, &room_id).await).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn start_new_vote_clears_every_estimation_and_hides_votes() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, alice_id) = join(&store, &room_id, "Alice").await;
        let (bob, bob_id) = join(&store, &room_id, "Bob").await;

        alice.select_estimation("5").await.unwrap();
        bob.select_estimation("8").await.unwrap();
        alice.reveal_estimations().await.unwrap();

        alice.start_new_vote().await.unwrap();
        let room = snapshot(&store, &room_id).await;
        assert!(!room.reveal);
        assert!(room.participants[&alice_id].estimation.is_none());
        assert!(room.participants[&bob_id].estimation.is_none());

        // Estimating is legal again.
        bob.select_estimation("13").await.unwrap();
    }

    #[tokio::test]
    async fn last_leave_marks_the_room_for_deletion() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, alice_id) = join(&store, &room_id, "Alice").await;
        let (bob, _) = join(&store, &room_id, "Bob").await;

        alice.leave_room().await.unwrap();
        let room = snapshot(&store, &room_id).await;
        assert!(room.metadata.active);
        // The departed record is retained, not deleted.
        assert!(!room.participants[&alice_id].active);

        bob.leave_room().await.unwrap();
        let room = snapshot(&store, &room_id).await;
        assert!(!room.metadata.active);
        assert!(room.metadata.marked_for_deletion);
        assert_eq!(room.participants.len(), 2);

        // Idempotent second leave.
        bob.leave_room().await.unwrap();
    }

    #[tokio::test]
    async fn issue_round_trip_preserves_key_and_summary() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;

        let issue_id = alice.add_issue("PROJ-1", "Test").await.unwrap();
        alice.select_current_issue(Some(&issue_id)).await.unwrap();

        let room = snapshot(&store, &room_id).await;
        assert_eq!(room.current_issue_id.as_deref(), Some(issue_id.as_str()));
        assert_eq!(room.issues[&issue_id].key, "PROJ-1");
        assert_eq!(room.issues[&issue_id].summary, "Test");
        assert_eq!(room.issues[&issue_id].status, IssueStatus::Pending);

        alice.select_current_issue(None).await.unwrap();
        let room = snapshot(&store, &room_id).await;
        assert!(room.current_issue_id.is_none());
    }

    #[tokio::test]
    async fn add_issue_rejects_blank_input() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;

        assert!(matches!(
            alice.add_issue("  ", "Test").await.unwrap_err(),
            ServiceError::Validation(_)
        ));
        assert!(matches!(
            alice.add_issue("PROJ-1", "").await.unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn reveal_closes_the_selected_issue_with_an_average() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;
        let (bob, _) = join(&store, &room_id, "Bob").await;

        let issue_id = alice.add_issue("PROJ-1", "Login page").await.unwrap();
        alice.select_current_issue(Some(&issue_id)).await.unwrap();
        alice.select_estimation("5").await.unwrap();
        bob.select_estimation("8").await.unwrap();
        alice.reveal_estimations().await.unwrap();

        let room = snapshot(&store, &room_id).await;
        assert_eq!(room.issues[&issue_id].status, IssueStatus::Estimated);
        assert_eq!(room.issues[&issue_id].average, Some(6.5));
    }

    #[tokio::test]
    async fn sentinel_votes_are_excluded_from_the_average() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;
        let (bob, _) = join(&store, &room_id, "Bob").await;

        let issue_id = alice.add_issue("PROJ-2", "Spike").await.unwrap();
        alice.select_current_issue(Some(&issue_id)).await.unwrap();
        alice.select_estimation("?").await.unwrap();
        bob.select_estimation("8").await.unwrap();
        alice.reveal_estimations().await.unwrap();

        let room = snapshot(&store, &room_id).await;
        assert_eq!(room.issues[&issue_id].average, Some(8.0));
    }

    #[tokio::test]
    async fn skip_marks_pending_issues_only() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;

        let skipped = alice.add_issue("PROJ-3", "Cut scope").await.unwrap();
        alice.skip_issue(&skipped).await.unwrap();
        alice.skip_issue(&skipped).await.unwrap();
        let room = snapshot(&store, &room_id).await;
        assert_eq!(room.issues[&skipped].status, IssueStatus::Skipped);

        let estimated = alice.add_issue("PROJ-4", "Ship it").await.unwrap();
        alice.select_current_issue(Some(&estimated)).await.unwrap();
        alice.select_estimation("5").await.unwrap();
        alice.reveal_estimations().await.unwrap();
        assert!(matches!(
            alice.skip_issue(&estimated).await.unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn sixth_join_exceeds_the_free_tier() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;

        for name in ["Alice", "Bob", "Carol", "Dave", "Eve"] {
            join(&store, &room_id, name).await;
        }

        let err = engine(&store)
            .join_room_with_name(&room_id, "Frank", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CapacityExceeded(_)));
        assert_eq!(snapshot(&store, &room_id).await.active_count(), 5);
    }

    #[tokio::test]
    async fn account_room_limit_blocks_a_second_free_room() {
        let store = MemoryRoomStore::shared();
        let session = engine(&store);

        session
            .create_room("fibonacci", None, PlanTier::Free, Some("acct-1".into()))
            .await
            .unwrap();
        let err = session
            .create_room("fibonacci", None, PlanTier::Free, Some("acct-1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CapacityExceeded(_)));

        // A different account is unaffected.
        session
            .create_room("fibonacci", None, PlanTier::Free, Some("acct-2".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejoin_keeps_the_stored_identity() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, alice_id) = join(&store, &room_id, "Alice").await;
        let (_bob, _) = join(&store, &room_id, "Bob").await;

        alice.leave_room().await.unwrap();

        let returning = engine(&store);
        returning.rejoin(&room_id, &alice_id).await.unwrap();

        let room = snapshot(&store, &room_id).await;
        let record = &room.participants[&alice_id];
        assert!(record.active);
        assert_eq!(record.name, "Alice");
        assert_eq!(record.role, Role::Moderator);
        assert!(record.estimation.is_none());
    }

    #[tokio::test]
    async fn expiry_auto_reveals_only_full_ballots() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;
        let (bob, _) = join(&store, &room_id, "Bob").await;

        alice.set_timer_enabled(true).await.unwrap();
        alice.set_timer_duration(30).await.unwrap();
        alice.select_estimation("5").await.unwrap();

        // One vote missing at expiry: the round stays open.
        backdate_timer(&store, &room_id, 31).await;
        assert!(!run_auto_reveal_check(store.clone(), &room_id).await.unwrap());
        assert!(!snapshot(&store, &room_id).await.reveal);

        // Full ballot at expiry: the round reveals without user action.
        bob.select_estimation("8").await.unwrap();
        let room = snapshot(&store, &room_id).await;
        assert!(room.reveal);
    }

    #[tokio::test]
    async fn mid_round_joiner_counts_against_the_ballot() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;
        let (bob, _) = join(&store, &room_id, "Bob").await;

        alice.set_timer_duration(30).await.unwrap();
        alice.select_estimation("5").await.unwrap();
        bob.select_estimation("8").await.unwrap();
        backdate_timer(&store, &room_id, 31).await;

        // Carol joins before any observer ran the expiry check; her missing
        // vote holds the round open.
        let (carol, _) = join(&store, &room_id, "Carol").await;
        assert!(!run_auto_reveal_check(store.clone(), &room_id).await.unwrap());
        assert!(!snapshot(&store, &room_id).await.reveal);

        carol.select_estimation("13").await.unwrap();
        assert!(snapshot(&store, &room_id).await.reveal);
    }

    #[tokio::test]
    async fn expiry_check_never_reveals_an_empty_room() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;
        alice.set_timer_duration(30).await.unwrap();
        alice.start_timer().await.unwrap();
        alice.leave_room().await.unwrap();

        backdate_timer(&store, &room_id, 31).await;
        assert!(!run_auto_reveal_check(store.clone(), &room_id).await.unwrap());
    }

    #[tokio::test]
    async fn stop_and_reset_clear_the_start_instant() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;

        alice.set_timer_duration(30).await.unwrap();
        alice.start_timer().await.unwrap();
        assert!(snapshot(&store, &room_id).await.timer.started_at.is_some());

        alice.stop_timer().await.unwrap();
        let room = snapshot(&store, &room_id).await;
        assert!(room.timer.started_at.is_none());
        assert_eq!(room.timer.duration_seconds, 30);

        alice.start_timer().await.unwrap();
        alice.reset_timer().await.unwrap();
        assert!(snapshot(&store, &room_id).await.timer.started_at.is_none());
    }

    #[tokio::test]
    async fn failed_actions_land_in_the_status_slot() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;
        let status = alice.subscribe_status();

        alice.select_estimation("5").await.unwrap();
        alice.reveal_estimations().await.unwrap();
        let _ = alice.select_estimation("3").await;

        let latest = status.borrow();
        assert!(!latest.is_loading);
        assert!(
            latest
                .last_error
                .as_deref()
                .is_some_and(|message| message.contains("after reveal"))
        );
    }

    #[tokio::test]
    async fn is_room_active_reflects_closure() {
        let store = MemoryRoomStore::shared();
        assert!(!is_room_active(&store, "nosuchrm").await.unwrap());

        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;
        assert!(is_room_active(&store, &room_id).await.unwrap());

        alice.leave_room().await.unwrap();
        assert!(!is_room_active(&store, &room_id).await.unwrap());
    }

    #[tokio::test]
    async fn subscription_sees_the_effect_of_own_writes() {
        let store = MemoryRoomStore::shared();
        let room_id = free_room(&store).await;
        let (alice, _) = join(&store, &room_id, "Alice").await;

        let mut subscription = alice.subscribe().await.unwrap();
        assert!(subscription.initial.is_some());

        alice.select_estimation("5").await.unwrap();
        let update = subscription.updates.recv().await.unwrap();
        let room: Room = serde_json::from_value(update).unwrap();
        assert_eq!(room.active_count(), 1);
    }
}
