use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::poker::{
        ActivateCardRequest, AssignStoryPointsRequest, CastVoteRequest, JoinSessionRequest,
        LeaveSessionRequest, SessionView, SetObserverRequest, TransferHostRequest,
    },
    error::AppError,
    services::poker_service,
    state::SharedState,
};

const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the caller, authenticated upstream and forwarded in `X-User-Id`.
pub struct ActingUser(pub String);

impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| ActingUser(value.to_owned()))
            .ok_or_else(|| AppError::Unauthorized("missing user header `X-User-Id`".into()))
    }
}

/// Planning-poker session endpoints scoped to a project.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/projects/{project_id}/planning-poker", get(get_session))
        .route("/projects/{project_id}/planning-poker/join", post(join_session))
        .route("/projects/{project_id}/planning-poker/leave", post(leave_session))
        .route("/projects/{project_id}/planning-poker/vote", post(cast_vote))
        .route("/projects/{project_id}/planning-poker/observer", post(set_observer))
        .route("/projects/{project_id}/planning-poker/activate", post(activate_card))
        .route("/projects/{project_id}/planning-poker/finish", post(finish_vote))
        .route("/projects/{project_id}/planning-poker/restart", post(restart_vote))
        .route(
            "/projects/{project_id}/planning-poker/assign",
            post(assign_story_points),
        )
        .route("/projects/{project_id}/planning-poker/skip", post(skip_card))
        .route("/projects/{project_id}/planning-poker/host", post(transfer_host))
        .route("/projects/{project_id}/planning-poker/close", post(close_session))
}

/// Current session of the project, or `null` when none is open.
#[utoipa::path(
    get,
    path = "/projects/{project_id}/planning-poker",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    responses(
        (status = 200, description = "Current session or null", body = Option<SessionView>),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(_user_id): ActingUser,
) -> Result<Json<Option<SessionView>>, AppError> {
    Ok(Json(poker_service::get_session(&state, &project_id).await?))
}

/// Join the session, opening it with the caller as host when none exists.
#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/join",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Joined", body = SessionView),
        (status = 403, description = "Caller is not a board member")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::join_session(&state, &project_id, &user_id, payload).await?;
    Ok(Json(view))
}

/// Drop one of the caller's connections.
#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/leave",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    request_body = LeaveSessionRequest,
    responses(
        (status = 200, description = "Connection dropped", body = SessionView),
        (status = 404, description = "No session for the project")
    )
)]
pub async fn leave_session(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
    Valid(Json(payload)): Valid<Json<LeaveSessionRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::leave_session(&state, &project_id, &user_id, payload).await?;
    Ok(Json(view))
}

/// Record or replace the caller's vote on the active card.
#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/vote",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    request_body = CastVoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = SessionView),
        (status = 400, description = "Value outside the deck"),
        (status = 409, description = "No vote in progress")
    )
)]
pub async fn cast_vote(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
    Valid(Json(payload)): Valid<Json<CastVoteRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::cast_vote(&state, &project_id, &user_id, payload).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/observer",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    request_body = SetObserverRequest,
    responses((status = 200, description = "Observer flag updated", body = SessionView))
)]
/// Toggle observer mode for the caller.
pub async fn set_observer(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
    Valid(Json(payload)): Valid<Json<SetObserverRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::set_observer(&state, &project_id, &user_id, payload).await?;
    Ok(Json(view))
}

/// Start voting on a card (host only).
#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/activate",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    request_body = ActivateCardRequest,
    responses(
        (status = 200, description = "Voting started", body = SessionView),
        (status = 404, description = "Card cannot be estimated in this session")
    )
)]
pub async fn activate_card(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
    Valid(Json(payload)): Valid<Json<ActivateCardRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::activate_card(&state, &project_id, &user_id, payload).await?;
    Ok(Json(view))
}

/// Reveal the votes (host only).
#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/finish",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    responses((status = 200, description = "Votes revealed", body = SessionView))
)]
pub async fn finish_vote(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::finish_vote(&state, &project_id, &user_id).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/restart",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    responses((status = 200, description = "Votes cleared", body = SessionView))
)]
/// Clear the votes and vote again.
pub async fn restart_vote(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::restart_vote(&state, &project_id, &user_id).await?;
    Ok(Json(view))
}

/// Write the agreed estimate to the card (host only).
#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/assign",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    request_body = AssignStoryPointsRequest,
    responses(
        (status = 200, description = "Estimate stored", body = SessionView),
        (status = 400, description = "Story points must be positive")
    )
)]
pub async fn assign_story_points(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
    Valid(Json(payload)): Valid<Json<AssignStoryPointsRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view =
        poker_service::assign_story_points(&state, &project_id, &user_id, payload).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/skip",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    responses((status = 200, description = "Card excluded", body = SessionView))
)]
/// Exclude the active card without estimating it.
pub async fn skip_card(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::skip_card(&state, &project_id, &user_id).await?;
    Ok(Json(view))
}

/// Hand the host role to another participant.
#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/host",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    request_body = TransferHostRequest,
    responses((status = 200, description = "Host transferred", body = SessionView))
)]
pub async fn transfer_host(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
    Valid(Json(payload)): Valid<Json<TransferHostRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::transfer_host(&state, &project_id, &user_id, payload).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/planning-poker/close",
    tag = "planning-poker",
    params(
        ("project_id" = String, Path, description = "Project owning the session"),
        ("X-User-Id" = String, Header, description = "Acting user"),
    ),
    responses(
        (status = 200, description = "Session closing", body = SessionView),
        (status = 409, description = "Session is already closing")
    )
)]
/// Start the closing window.
pub async fn close_session(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    ActingUser(user_id): ActingUser,
) -> Result<Json<SessionView>, AppError> {
    let view = poker_service::close_session(&state, &project_id, &user_id).await?;
    Ok(Json(view))
}
