use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/projects/{project_id}/planning-poker/events",
    tag = "sse",
    params(("project_id" = String, Path, description = "Project whose session is streamed")),
    responses((status = 200, description = "Planning-poker session stream", content_type = "text/event-stream", body = String))
)]
/// Stream the project's session: a handshake, the current state, then every change.
pub async fn session_events(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    sse_service::open_session_stream(state, project_id).await
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route(
        "/projects/{project_id}/planning-poker/events",
        get(session_events),
    )
}
