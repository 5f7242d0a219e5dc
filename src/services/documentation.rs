use utoipa::OpenApi;

/// Aggregated OpenAPI specification for the planning-poker backend.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::poker::get_session,
        crate::routes::poker::join_session,
        crate::routes::poker::leave_session,
        crate::routes::poker::cast_vote,
        crate::routes::poker::set_observer,
        crate::routes::poker::activate_card,
        crate::routes::poker::finish_vote,
        crate::routes::poker::restart_vote,
        crate::routes::poker::assign_story_points,
        crate::routes::poker::skip_card,
        crate::routes::poker::transfer_host,
        crate::routes::poker::close_session,
        crate::routes::sse::session_events,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::poker::SessionView,
            crate::dto::poker::ParticipantView,
            crate::dto::poker::ClosingView,
            crate::dto::poker::PhaseView,
            crate::dto::poker::JoinSessionRequest,
            crate::dto::poker::LeaveSessionRequest,
            crate::dto::poker::CastVoteRequest,
            crate::dto::poker::SetObserverRequest,
            crate::dto::poker::ActivateCardRequest,
            crate::dto::poker::AssignStoryPointsRequest,
            crate::dto::poker::TransferHostRequest,
            crate::dto::sse::Handshake,
            crate::state::session::VoteValue,
            crate::state::session::ClosingReason,
            crate::state::vote_stats::VoteStats,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "planning-poker", description = "Planning-poker session operations"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
