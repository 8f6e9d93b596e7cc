use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for StoryDeck Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::room::create_room,
        crate::routes::room::get_room,
        crate::routes::room::join_room,
        crate::routes::room::rejoin_room,
        crate::routes::room::leave_room,
        crate::routes::room::select_estimation,
        crate::routes::room::reveal_estimations,
        crate::routes::room::start_new_vote,
        crate::routes::room::add_issue,
        crate::routes::room::skip_issue,
        crate::routes::room::select_current_issue,
        crate::routes::room::set_timer_enabled,
        crate::routes::room::set_timer_duration,
        crate::routes::room::start_timer,
        crate::routes::room::stop_timer,
        crate::routes::room::reset_timer,
        crate::routes::sse::room_events,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::EstimationRequest,
            crate::dto::room::AddIssueRequest,
            crate::dto::room::SelectIssueRequest,
            crate::dto::room::TimerEnabledRequest,
            crate::dto::room::TimerDurationRequest,
            crate::dto::room::RoomCreatedResponse,
            crate::dto::room::JoinedResponse,
            crate::dto::room::IssueCreatedResponse,
            crate::dto::room::ActionResponse,
            crate::dto::room::RoomSummary,
            crate::dto::room::ParticipantSummary,
            crate::dto::room::IssueSummary,
            crate::dto::room::TimerSummary,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "room", description = "Room lifecycle, presence, voting, issues and timer"),
        (name = "sse", description = "Server-sent room snapshot streams"),
    )
)]
pub struct ApiDoc;
