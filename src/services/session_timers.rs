//! Automatic transitions driven by the per-project timer.
//!
//! Open sessions carry an inactivity timer, closing sessions a finalization
//! timer. A firing timer re-reads the stored session under the project gate
//! and re-arms whenever the session moved on since it was armed.

use std::{
    sync::{Arc, Weak},
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};

use crate::{
    services::{poker_service, sse_events},
    state::{
        AppState, SharedState,
        session::{ClosingReason, Session},
        timers::{TimerKind, TimerTicket},
    },
};

/// Delay before a timer that could not reach storage tries again.
const STORAGE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Arm the timer matching the session's phase, replacing any previous one.
pub fn schedule(state: &SharedState, session: &Session) {
    let (kind, deadline) = match session.phase.closing() {
        Some(window) => (TimerKind::Finalize, window.ends_at),
        None => (
            TimerKind::Inactivity,
            session.inactivity_deadline(state.config().auto_close_after),
        ),
    };
    let delay = deadline
        .duration_since(SystemTime::now())
        .unwrap_or_default();
    arm(state, &session.project_id, kind, session.version, delay);
}

fn arm(state: &SharedState, project_id: &str, kind: TimerKind, version: u64, delay: Duration) {
    let weak: Weak<AppState> = Arc::downgrade(state);
    state
        .timers()
        .arm(project_id, kind, version, delay, move |ticket| async move {
            if let Some(state) = weak.upgrade() {
                fire(state, ticket).await;
            }
        });
}

async fn fire(state: SharedState, ticket: TimerTicket) {
    let project_id = ticket.project_id.as_str();
    let _gate = state.lock_project(project_id).await;
    if !state.timers().claim(&ticket) {
        debug!(project_id, generation = ticket.generation, "superseded timer ignored");
        return;
    }

    let sessions = match state.sessions().await {
        Ok(sessions) => sessions,
        Err(err) => {
            warn!(project_id, error = %err, "timer fired without storage; retrying later");
            retry(&state, &ticket);
            return;
        }
    };
    let mut session = match sessions.get(project_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!(project_id, "timer fired for a session that no longer exists");
            return;
        }
        Err(err) => {
            warn!(project_id, error = %err, "timer could not load session; retrying later");
            retry(&state, &ticket);
            return;
        }
    };

    if session.version != ticket.session_version {
        debug!(
            project_id,
            armed_for = ticket.session_version,
            current = session.version,
            "session changed since timer was armed; re-arming"
        );
        schedule(&state, &session);
        return;
    }

    let now = SystemTime::now();
    match (ticket.kind, session.phase.closing().copied()) {
        (TimerKind::Inactivity, None) => {
            if session.inactivity_deadline(state.config().auto_close_after) > now {
                schedule(&state, &session);
                return;
            }
            if let Err(err) =
                session.start_closing(ClosingReason::Inactivity, now, state.config().closing_duration)
            {
                warn!(project_id, error = %err, "inactivity close rejected");
                return;
            }
            info!(project_id, "closing planning-poker session after inactivity");
            if let Err(err) = poker_service::commit(&state, &sessions, session).await {
                warn!(project_id, error = %err, "failed to persist inactivity close; retrying later");
                retry(&state, &ticket);
            }
        }
        (TimerKind::Finalize, Some(window)) => {
            if window.ends_at > now {
                schedule(&state, &session);
                return;
            }
            match sessions.delete(project_id).await {
                Ok(_) => {
                    state.connections().forget_project(project_id);
                    info!(project_id, reason = ?window.reason, "planning-poker session finalized");
                    sse_events::broadcast_session(&state, project_id, None);
                }
                Err(err) => {
                    warn!(project_id, error = %err, "failed to delete closed session; retrying later");
                    retry(&state, &ticket);
                }
            }
        }
        // Phase and timer disagree: arm the timer the current phase calls for.
        (TimerKind::Inactivity, Some(_)) | (TimerKind::Finalize, None) => {
            schedule(&state, &session);
        }
    }
}

fn retry(state: &SharedState, ticket: &TimerTicket) {
    arm(
        state,
        &ticket.project_id,
        ticket.kind,
        ticket.session_version,
        STORAGE_RETRY_DELAY,
    );
}
