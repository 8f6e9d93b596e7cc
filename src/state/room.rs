use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Subscription tier snapshotted onto a room when it is created.
///
/// Capacity decisions always consult this snapshot, never the creator's
/// current plan, so later plan changes cannot shrink a running meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Free tier.
    Free,
    /// Paid individual tier.
    Pro,
    /// Paid organization tier.
    Enterprise,
}

impl PlanTier {
    /// Stable lowercase name used in the tree and in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

/// Role a participant holds inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Runs the meeting: drives issues, reveal, and the timer (a UI
    /// affordance; the engine accepts these actions from any member).
    Moderator,
    /// Regular estimating member.
    Participant,
}

/// Lifecycle status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    /// Not yet estimated.
    Pending,
    /// A round was closed for this issue.
    Estimated,
    /// Deliberately passed over.
    Skipped,
}

impl IssueStatus {
    /// Stable lowercase name used in the tree.
    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::Estimated => "estimated",
            IssueStatus::Skipped => "skipped",
        }
    }
}

/// Room metadata subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMeta {
    /// Creation instant, epoch milliseconds.
    pub created_at: u64,
    /// Name of the estimation scale in the series catalog.
    pub series_key: String,
    /// Ordered selectable values, including non-numeric sentinels.
    pub series_values: Vec<String>,
    /// Optional display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// False once the room is logically closed.
    pub active: bool,
    /// Set when the last active participant leaves; physical deletion is a
    /// separate, time-delayed housekeeping concern.
    pub marked_for_deletion: bool,
    /// Creator's plan tier at creation time.
    pub creator_plan: PlanTier,
    /// Authenticated account that created the room, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_user_id: Option<String>,
}

/// One member of a room. Departed members are retained with
/// `active = false`; the record is never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// User-supplied display name, non-empty.
    pub name: String,
    /// Member role.
    pub role: Role,
    /// Current estimate. Absent means "no vote cast this round"; a present
    /// value is a vote even when it looks falsy (e.g. the scale value "0").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimation: Option<String>,
    /// Whether the member is currently present.
    pub active: bool,
    /// Optional link to an authenticated identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Optional avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl Participant {
    /// Whether this member has cast a vote in the current round.
    pub fn has_voted(&self) -> bool {
        self.estimation.is_some()
    }
}

/// A work item under estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// External tracker key (e.g. `PROJ-1`).
    pub key: String,
    /// Short description.
    pub summary: String,
    /// Creation instant, epoch milliseconds. Drives display order.
    pub created_at: u64,
    /// Lifecycle status.
    pub status: IssueStatus,
    /// Mean of the numeric estimates, set when a round closes for this
    /// issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

/// Shared countdown state. `started_at` is the only replicated fact;
/// every observer derives the remaining time from it locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    /// Whether the countdown feature is switched on for this room.
    #[serde(default)]
    pub enabled: bool,
    /// Configured round duration in seconds.
    #[serde(default)]
    pub duration_seconds: u64,
    /// Absolute start instant (epoch milliseconds); absent when no
    /// countdown is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
}

/// Root aggregate for one estimation meeting, mirroring the replicated
/// subtree at `rooms/{roomId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Metadata subtree.
    pub metadata: RoomMeta,
    /// Members keyed by participant id.
    #[serde(default)]
    pub participants: IndexMap<String, Participant>,
    /// Work items keyed by issue id.
    #[serde(default)]
    pub issues: IndexMap<String, Issue>,
    /// The item currently being estimated, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_issue_id: Option<String>,
    /// Whether estimates are visible.
    #[serde(default)]
    pub reveal: bool,
    /// Shared countdown state.
    #[serde(default)]
    pub timer: TimerState,
}

impl Room {
    /// Iterate over currently present members.
    pub fn active_participants(&self) -> impl Iterator<Item = (&String, &Participant)> {
        self.participants
            .iter()
            .filter(|(_, participant)| participant.active)
    }

    /// Number of currently present members.
    pub fn active_count(&self) -> usize {
        self.active_participants().count()
    }

    /// Whether every present member has voted. Requires at least one
    /// present member so an abandoned room never counts as fully voted.
    pub fn all_active_voted(&self) -> bool {
        let mut any = false;
        for (_, participant) in self.active_participants() {
            if !participant.has_voted() {
                return false;
            }
            any = true;
        }
        any
    }

    /// Whether the room still accepts joins and actions.
    pub fn is_open(&self) -> bool {
        self.metadata.active && !self.metadata.marked_for_deletion
    }
}
