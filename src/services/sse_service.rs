use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        poker::LeaveSessionRequest,
        sse::{Handshake, ServerEvent},
    },
    services::{
        poker_service,
        sse_events::{EVENT_SESSION, session_topic},
    },
    state::SharedState,
};

const EVENT_HANDSHAKE: &str = "handshake";

/// Open the event stream of `project_id`.
///
/// The client first receives a handshake carrying its connection id, then the
/// current session (when storage is reachable), then every later broadcast.
pub async fn open_session_stream(
    state: SharedState,
    project_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let topic = session_topic(&project_id);
    let receiver = state.sse().subscribe(&topic);
    let connection_id = Uuid::new_v4().simple().to_string();
    info!(project_id = %project_id, connection_id = %connection_id, "new planning-poker SSE connection");

    let mut initial = Vec::with_capacity(2);
    let handshake = Handshake {
        topic: topic.clone(),
        connection_id: connection_id.clone(),
        degraded: state.is_degraded().await,
    };
    match ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &handshake) {
        Ok(event) => initial.push(event),
        Err(err) => warn!(error = %err, "failed to serialize SSE handshake"),
    }

    match poker_service::get_session(&state, &project_id).await {
        Ok(view) => match ServerEvent::json(Some(EVENT_SESSION.to_string()), &view) {
            Ok(event) => initial.push(event),
            Err(err) => warn!(error = %err, "failed to serialize initial session"),
        },
        Err(err) => warn!(project_id = %project_id, error = %err, "initial session unavailable"),
    }

    to_sse_stream(state, project_id, connection_id, initial, receiver)
}

/// Convert a broadcast receiver into an SSE response, forwarding events.
///
/// On disconnect the topic hub is pruned and the connection handed out in the
/// handshake leaves the session.
fn to_sse_stream(
    state: SharedState,
    project_id: String,
    connection_id: String,
    initial: Vec<ServerEvent>,
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let topic = session_topic(&project_id);
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                break;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // The next broadcast carries the full session again.
                            warn!(topic = %topic, skipped, "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        drop(receiver);
        state.sse().prune(&topic);
        info!(topic = %topic, connection_id = %connection_id, "planning-poker SSE stream disconnected");
        release_connection(&state, &project_id, &connection_id).await;
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Run the leave transition for whoever joined through `connection_id`.
async fn release_connection(state: &SharedState, project_id: &str, connection_id: &str) {
    let Some(user_id) = state.connections().owner(project_id, connection_id) else {
        return;
    };
    let request = LeaveSessionRequest {
        connection_id: connection_id.to_owned(),
    };
    match poker_service::leave_session(state, project_id, &user_id, request).await {
        Ok(_) => info!(project_id, user_id = %user_id, "participant connection closed with its stream"),
        Err(err) => {
            state
                .connections()
                .unregister(project_id, &user_id, connection_id);
            warn!(project_id, user_id = %user_id, error = %err, "failed to leave after stream disconnect");
        }
    }
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}
