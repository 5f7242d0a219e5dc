use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{poker::SessionView, sse::ServerEvent},
    state::SharedState,
};

/// Event name carried by every session broadcast.
pub const EVENT_SESSION: &str = "planning_poker.session";

/// Broadcast topic for `project_id`.
pub fn session_topic(project_id: &str) -> String {
    format!("planningPoker:{project_id}")
}

/// Publish the serialized session, or `null` once it has been deleted.
pub fn broadcast_session(state: &SharedState, project_id: &str, view: Option<&SessionView>) {
    send_topic_event(state, &session_topic(project_id), EVENT_SESSION, &view);
}

fn send_topic_event(state: &SharedState, topic: &str, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.sse().publish(topic, event),
        Err(err) => warn!(topic, event, error = %err, "failed to serialize SSE payload"),
    }
}
