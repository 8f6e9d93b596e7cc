use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::format_epoch_ms,
    services::timer,
    state::room::{Issue, Participant, PlanTier, Role, Room, TimerState},
};

/// Payload used to open a new estimation room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Name of the estimation scale to use (e.g. `fibonacci`).
    #[validate(length(min = 1))]
    pub series_key: String,
    /// Optional display title for the meeting.
    #[serde(default)]
    pub title: Option<String>,
    /// Creator's plan tier; defaults to the free tier.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub creator_plan: Option<PlanTier>,
    /// Authenticated account of the creator, when known. Enables the
    /// active-rooms-per-account limit.
    #[serde(default)]
    pub creator_user_id: Option<String>,
}

/// Payload used to join a room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Display name shown at the table.
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// Optional avatar URL.
    #[serde(default)]
    #[validate(url)]
    pub photo_url: Option<String>,
    /// Optional authenticated identity to link the member to.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Payload setting the caller's estimate.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct EstimationRequest {
    /// One of the room's series values.
    #[validate(length(min = 1))]
    pub value: String,
}

/// Payload appending a work item to the backlog.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddIssueRequest {
    /// External tracker key (e.g. `PROJ-1`).
    #[validate(length(min = 1))]
    pub key: String,
    /// Short description.
    #[validate(length(min = 1))]
    pub summary: String,
}

/// Payload selecting (or clearing) the issue under estimation.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectIssueRequest {
    /// Issue to focus; `null` clears the selection.
    #[serde(default)]
    pub issue_id: Option<String>,
}

/// Payload toggling the countdown feature.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TimerEnabledRequest {
    /// Whether the countdown is available in this room.
    pub enabled: bool,
}

/// Payload configuring the round duration.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TimerDurationRequest {
    /// Round duration in seconds, strictly positive.
    #[validate(range(min = 1))]
    pub seconds: u64,
}

/// Returned once a room has been created.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatedResponse {
    /// Shareable room token.
    pub room_id: String,
}

/// Returned once a member has joined.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinedResponse {
    /// Store-assigned participant id; clients retain it to resume or
    /// rejoin under the same identity.
    pub participant_id: String,
}

/// Returned once an issue has been appended.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueCreatedResponse {
    /// Store-assigned issue id.
    pub issue_id: String,
}

/// Generic acknowledgement for imperative actions.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Always `ok`; failures travel as error responses instead.
    pub status: String,
}

impl ActionResponse {
    /// The positive acknowledgement.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Public projection of a room, pushed over SSE and returned by reads.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    /// Shareable room token.
    pub id: String,
    /// Display title, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Name of the estimation scale.
    pub series_key: String,
    /// Ordered selectable values.
    pub series_values: Vec<String>,
    /// Creation instant, RFC3339.
    pub created_at: String,
    /// False once the room is logically closed.
    pub active: bool,
    /// Whether the room awaits housekeeping deletion.
    pub marked_for_deletion: bool,
    /// Members, in join order.
    pub participants: Vec<ParticipantSummary>,
    /// Backlog, in creation order.
    pub issues: Vec<IssueSummary>,
    /// Issue currently under estimation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_issue_id: Option<String>,
    /// Whether estimates are visible.
    pub reveal: bool,
    /// True when the countdown ran out while votes are still missing.
    pub votes_needed: bool,
    /// Countdown state.
    pub timer: TimerSummary,
}

/// Public projection of a member.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    /// Participant id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Member role.
    #[schema(value_type = String)]
    pub role: Role,
    /// Whether the member is currently present.
    pub active: bool,
    /// Whether the member has voted this round. Always public, unlike the
    /// estimate itself.
    pub voted: bool,
    /// The estimate — only projected once the round is revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimation: Option<String>,
    /// Optional avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Public projection of an issue.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    /// Issue id.
    pub id: String,
    /// External tracker key.
    pub key: String,
    /// Short description.
    pub summary: String,
    /// Creation instant, RFC3339.
    pub created_at: String,
    /// Lifecycle status.
    pub status: String,
    /// Mean of the numeric estimates, once a round closed for this issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

/// Public projection of the countdown.
///
/// Only the absolute start instant is shipped; every client derives the
/// remaining time against its own clock, so skew and tab suspension cannot
/// desynchronize the displayed countdowns.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerSummary {
    /// Whether the countdown feature is on.
    pub enabled: bool,
    /// Configured round duration in seconds.
    pub duration_seconds: u64,
    /// Absolute start instant (epoch milliseconds), when running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
}

impl RoomSummary {
    /// Project a replicated room for API consumers.
    pub fn new(id: &str, room: &Room) -> Self {
        let mut issues = room
            .issues
            .iter()
            .map(|(issue_id, issue)| IssueSummary::new(issue_id, issue))
            .collect::<Vec<_>>();
        issues.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Self {
            id: id.to_string(),
            title: room.metadata.title.clone(),
            series_key: room.metadata.series_key.clone(),
            series_values: room.metadata.series_values.clone(),
            created_at: format_epoch_ms(room.metadata.created_at),
            active: room.metadata.active,
            marked_for_deletion: room.metadata.marked_for_deletion,
            participants: room
                .participants
                .iter()
                .map(|(participant_id, participant)| {
                    ParticipantSummary::new(participant_id, participant, room.reveal)
                })
                .collect(),
            issues,
            current_issue_id: room.current_issue_id.clone(),
            reveal: room.reveal,
            votes_needed: timer::votes_needed(room, timer::now_ms()),
            timer: TimerSummary::from(&room.timer),
        }
    }
}

impl ParticipantSummary {
    fn new(id: &str, participant: &Participant, reveal: bool) -> Self {
        Self {
            id: id.to_string(),
            name: participant.name.clone(),
            role: participant.role,
            active: participant.active,
            voted: participant.has_voted(),
            estimation: if reveal {
                participant.estimation.clone()
            } else {
                None
            },
            photo_url: participant.photo_url.clone(),
        }
    }
}

impl IssueSummary {
    fn new(id: &str, issue: &Issue) -> Self {
        Self {
            id: id.to_string(),
            key: issue.key.clone(),
            summary: issue.summary.clone(),
            created_at: format_epoch_ms(issue.created_at),
            status: issue.status.as_str().to_string(),
            average: issue.average,
        }
    }
}

impl From<&TimerState> for TimerSummary {
    fn from(timer: &TimerState) -> Self {
        Self {
            enabled: timer.enabled,
            duration_seconds: timer.duration_seconds,
            started_at: timer.started_at,
        }
    }
}

/// Default plan tier applied when a create request names none.
pub fn default_plan(requested: Option<PlanTier>) -> PlanTier {
    requested.unwrap_or(PlanTier::Free)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::room::{IssueStatus, RoomMeta};
    use indexmap::IndexMap;

    fn sample_room(reveal: bool) -> Room {
        let mut participants = IndexMap::new();
        participants.insert(
            "p1".to_string(),
            Participant {
                name: "Alice".into(),
                role: Role::Moderator,
                estimation: Some("8".into()),
                active: true,
                user_id: None,
                photo_url: None,
            },
        );

        Room {
            metadata: RoomMeta {
                created_at: 1_700_000_000_000,
                series_key: "fibonacci".into(),
                series_values: vec!["5".into(), "8".into()],
                title: Some("Sprint 12".into()),
                active: true,
                marked_for_deletion: false,
                creator_plan: PlanTier::Free,
                creator_user_id: None,
            },
            participants,
            issues: IndexMap::new(),
            current_issue_id: None,
            reveal,
            timer: TimerState::default(),
        }
    }

    #[test]
    fn estimations_stay_hidden_until_reveal() {
        let hidden = RoomSummary::new("ab12cd34", &sample_room(false));
        assert!(hidden.participants[0].voted);
        assert!(hidden.participants[0].estimation.is_none());

        let revealed = RoomSummary::new("ab12cd34", &sample_room(true));
        assert_eq!(revealed.participants[0].estimation.as_deref(), Some("8"));
    }

    #[test]
    fn issues_are_listed_in_creation_order() {
        let mut room = sample_room(false);
        room.issues.insert(
            "later".to_string(),
            Issue {
                key: "PROJ-2".into(),
                summary: "Second".into(),
                created_at: 2_000,
                status: IssueStatus::Pending,
                average: None,
            },
        );
        room.issues.insert(
            "earlier".to_string(),
            Issue {
                key: "PROJ-1".into(),
                summary: "First".into(),
                created_at: 1_000,
                status: IssueStatus::Pending,
                average: None,
            },
        );

        let summary = RoomSummary::new("ab12cd34", &room);
        assert_eq!(summary.issues[0].key, "PROJ-1");
        assert_eq!(summary.issues[1].key, "PROJ-2");
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let summary = RoomSummary::new("ab12cd34", &sample_room(false));
        assert!(summary.created_at.starts_with("2023-11-14T"));
    }
}
