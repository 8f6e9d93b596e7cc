use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use validator::Validate;

use crate::{
    dto::{
        room::{
            ActionResponse, AddIssueRequest, CreateRoomRequest, EstimationRequest,
            IssueCreatedResponse, JoinRoomRequest, JoinedResponse, RoomCreatedResponse,
            RoomSummary, SelectIssueRequest, TimerDurationRequest, TimerEnabledRequest,
            default_plan,
        },
        validation::validate_room_id,
    },
    error::AppError,
    services::session_service::SessionStore,
    state::SharedState,
};

/// Routes covering the whole room lifecycle: creation, presence, voting,
/// issues, and the shared countdown.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{id}", get(get_room))
        .route("/rooms/{id}/join", post(join_room))
        .route(
            "/rooms/{id}/participants/{pid}/rejoin",
            post(rejoin_room),
        )
        .route("/rooms/{id}/participants/{pid}/leave", post(leave_room))
        .route(
            "/rooms/{id}/participants/{pid}/estimation",
            put(select_estimation),
        )
        .route("/rooms/{id}/reveal", post(reveal_estimations))
        .route("/rooms/{id}/new-vote", post(start_new_vote))
        .route("/rooms/{id}/issues", post(add_issue))
        .route("/rooms/{id}/issues/{iid}/skip", post(skip_issue))
        .route("/rooms/{id}/current-issue", put(select_current_issue))
        .route("/rooms/{id}/timer/enabled", put(set_timer_enabled))
        .route("/rooms/{id}/timer/duration", put(set_timer_duration))
        .route("/rooms/{id}/timer/start", post(start_timer))
        .route("/rooms/{id}/timer/stop", post(stop_timer))
        .route("/rooms/{id}/timer/reset", post(reset_timer))
}

/// Open a new estimation room.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "room",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomCreatedResponse),
        (status = 403, description = "Active-rooms limit for the account reached")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<Json<RoomCreatedResponse>, AppError> {
    payload.validate()?;
    let session = detached(&state);
    let room_id = session
        .create_room(
            &payload.series_key,
            payload.title,
            default_plan(payload.creator_plan),
            payload.creator_user_id,
        )
        .await?;
    Ok(Json(RoomCreatedResponse { room_id }))
}

/// Read the current room snapshot. Also serves as the "is this room still
/// active?" probe for clients resuming a stored session.
#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSummary),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    ensure_room_id(&room_id)?;
    let room = attached(&state, &room_id, None).room_snapshot().await?;
    Ok(Json(RoomSummary::new(&room_id, &room)))
}

/// Join a room under a display name.
#[utoipa::path(
    post,
    path = "/rooms/{id}/join",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Joined", body = JoinedResponse),
        (status = 403, description = "Room is at its plan's participant limit"),
        (status = 404, description = "Unknown or closed room")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Json(payload): Json<JoinRoomRequest>,
) -> Result<Json<JoinedResponse>, AppError> {
    ensure_room_id(&room_id)?;
    payload.validate()?;
    let session = detached(&state);
    let participant_id = session
        .join_room_with_name(&room_id, &payload.name, payload.photo_url, payload.user_id)
        .await?;
    Ok(Json(JoinedResponse { participant_id }))
}

/// Re-enter a room with a participant id retained by the client.
#[utoipa::path(
    post,
    path = "/rooms/{id}/participants/{pid}/rejoin",
    tag = "room",
    params(
        ("id" = String, Path, description = "Room token"),
        ("pid" = String, Path, description = "Retained participant id")
    ),
    responses((status = 200, description = "Rejoined", body = ActionResponse))
)]
pub async fn rejoin_room(
    State(state): State<SharedState>,
    Path((room_id, participant_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    detached(&state).rejoin(&room_id, &participant_id).await?;
    Ok(Json(ActionResponse::ok()))
}

/// Leave the room. Idempotent: leaving twice is accepted.
#[utoipa::path(
    post,
    path = "/rooms/{id}/participants/{pid}/leave",
    tag = "room",
    params(
        ("id" = String, Path, description = "Room token"),
        ("pid" = String, Path, description = "Participant id")
    ),
    responses((status = 200, description = "Left", body = ActionResponse))
)]
pub async fn leave_room(
    State(state): State<SharedState>,
    Path((room_id, participant_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    attached(&state, &room_id, Some(participant_id))
        .leave_room()
        .await?;
    Ok(Json(ActionResponse::ok()))
}

/// Set the caller's estimate for the current round.
#[utoipa::path(
    put,
    path = "/rooms/{id}/participants/{pid}/estimation",
    tag = "room",
    params(
        ("id" = String, Path, description = "Room token"),
        ("pid" = String, Path, description = "Participant id")
    ),
    request_body = EstimationRequest,
    responses(
        (status = 200, description = "Estimate recorded", body = ActionResponse),
        (status = 400, description = "Round already revealed, or value not in the series")
    )
)]
pub async fn select_estimation(
    State(state): State<SharedState>,
    Path((room_id, participant_id)): Path<(String, String)>,
    Json(payload): Json<EstimationRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    payload.validate()?;
    attached(&state, &room_id, Some(participant_id))
        .select_estimation(&payload.value)
        .await?;
    Ok(Json(ActionResponse::ok()))
}

/// Make all estimates visible. Idempotent.
#[utoipa::path(
    post,
    path = "/rooms/{id}/reveal",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    responses((status = 200, description = "Estimates revealed", body = ActionResponse))
)]
pub async fn reveal_estimations(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    attached(&state, &room_id, None).reveal_estimations().await?;
    Ok(Json(ActionResponse::ok()))
}

/// Start a new round: clears every estimate and hides votes again.
#[utoipa::path(
    post,
    path = "/rooms/{id}/new-vote",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    responses((status = 200, description = "New round started", body = ActionResponse))
)]
pub async fn start_new_vote(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    attached(&state, &room_id, None).start_new_vote().await?;
    Ok(Json(ActionResponse::ok()))
}

/// Append a work item to the room's backlog.
#[utoipa::path(
    post,
    path = "/rooms/{id}/issues",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    request_body = AddIssueRequest,
    responses((status = 200, description = "Issue added", body = IssueCreatedResponse))
)]
pub async fn add_issue(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Json(payload): Json<AddIssueRequest>,
) -> Result<Json<IssueCreatedResponse>, AppError> {
    ensure_room_id(&room_id)?;
    payload.validate()?;
    let issue_id = attached(&state, &room_id, None)
        .add_issue(&payload.key, &payload.summary)
        .await?;
    Ok(Json(IssueCreatedResponse { issue_id }))
}

/// Pass over a pending issue.
#[utoipa::path(
    post,
    path = "/rooms/{id}/issues/{iid}/skip",
    tag = "room",
    params(
        ("id" = String, Path, description = "Room token"),
        ("iid" = String, Path, description = "Issue id")
    ),
    responses((status = 200, description = "Issue skipped", body = ActionResponse))
)]
pub async fn skip_issue(
    State(state): State<SharedState>,
    Path((room_id, issue_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    attached(&state, &room_id, None).skip_issue(&issue_id).await?;
    Ok(Json(ActionResponse::ok()))
}

/// Point the room at an issue, or clear the selection. Never resets votes.
#[utoipa::path(
    put,
    path = "/rooms/{id}/current-issue",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    request_body = SelectIssueRequest,
    responses((status = 200, description = "Selection updated", body = ActionResponse))
)]
pub async fn select_current_issue(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Json(payload): Json<SelectIssueRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    attached(&state, &room_id, None)
        .select_current_issue(payload.issue_id.as_deref())
        .await?;
    Ok(Json(ActionResponse::ok()))
}

/// Switch the countdown feature on or off.
#[utoipa::path(
    put,
    path = "/rooms/{id}/timer/enabled",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    request_body = TimerEnabledRequest,
    responses((status = 200, description = "Timer toggled", body = ActionResponse))
)]
pub async fn set_timer_enabled(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Json(payload): Json<TimerEnabledRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    attached(&state, &room_id, None)
        .set_timer_enabled(payload.enabled)
        .await?;
    Ok(Json(ActionResponse::ok()))
}

/// Configure the round duration.
#[utoipa::path(
    put,
    path = "/rooms/{id}/timer/duration",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    request_body = TimerDurationRequest,
    responses((status = 200, description = "Duration updated", body = ActionResponse))
)]
pub async fn set_timer_duration(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Json(payload): Json<TimerDurationRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    payload.validate()?;
    attached(&state, &room_id, None)
        .set_timer_duration(payload.seconds)
        .await?;
    Ok(Json(ActionResponse::ok()))
}

/// Start the shared countdown.
#[utoipa::path(
    post,
    path = "/rooms/{id}/timer/start",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    responses((status = 200, description = "Countdown started", body = ActionResponse))
)]
pub async fn start_timer(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    attached(&state, &room_id, None).start_timer().await?;
    Ok(Json(ActionResponse::ok()))
}

/// Stop the shared countdown.
#[utoipa::path(
    post,
    path = "/rooms/{id}/timer/stop",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    responses((status = 200, description = "Countdown stopped", body = ActionResponse))
)]
pub async fn stop_timer(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    attached(&state, &room_id, None).stop_timer().await?;
    Ok(Json(ActionResponse::ok()))
}

/// Reset the countdown, keeping the enabled flag and duration.
#[utoipa::path(
    post,
    path = "/rooms/{id}/timer/reset",
    tag = "room",
    params(("id" = String, Path, description = "Room token")),
    responses((status = 200, description = "Countdown reset", body = ActionResponse))
)]
pub async fn reset_timer(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    ensure_room_id(&room_id)?;
    attached(&state, &room_id, None).reset_timer().await?;
    Ok(Json(ActionResponse::ok()))
}

fn detached(state: &SharedState) -> SessionStore {
    SessionStore::new(state.store(), state.config())
}

fn attached(state: &SharedState, room_id: &str, participant_id: Option<String>) -> SessionStore {
    SessionStore::resume(
        state.store(),
        state.config(),
        room_id.to_string(),
        participant_id,
    )
}

pub(crate) fn ensure_room_id(id: &str) -> Result<(), AppError> {
    validate_room_id(id).map_err(|err| {
        AppError::BadRequest(
            err.message
                .map(|message| message.to_string())
                .unwrap_or_else(|| err.code.to_string()),
        )
    })
}
