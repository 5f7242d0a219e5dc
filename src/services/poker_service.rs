//! Planning-poker engine operations.
//!
//! Every mutation holds the project gate for the whole load, transition,
//! persist, re-arm and broadcast cycle.

use std::time::SystemTime;

use tracing::{debug, info};

use crate::{
    dao::session::SessionRepository,
    dto::poker::{
        ActivateCardRequest, AssignStoryPointsRequest, CastVoteRequest, JoinSessionRequest,
        LeaveSessionRequest, SessionView, SetObserverRequest, TransferHostRequest,
    },
    error::ServiceError,
    services::{session_timers, sse_events},
    state::{
        SharedState,
        session::{Session, SessionError, UnknownVoteValue, VoteValue},
    },
};

/// Current session of `project_id`, if any.
///
/// A session without an armed timer, as left behind by a restart, gets one
/// again so it can still close and be finalized.
pub async fn get_session(
    state: &SharedState,
    project_id: &str,
) -> Result<Option<SessionView>, ServiceError> {
    let _gate = state.lock_project(project_id).await;
    let sessions = state.sessions().await?;
    let Some(session) = sessions.get(project_id).await? else {
        return Ok(None);
    };

    if state.timers().armed(project_id).is_none() {
        debug!(project_id, version = session.version, "re-arming timer for loaded session");
        session_timers::schedule(state, &session);
    }
    Ok(Some(SessionView::new(&session, state.connections())))
}

/// Join the project's session, creating it with the caller as host when none exists.
pub async fn join_session(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
    request: JoinSessionRequest,
) -> Result<SessionView, ServiceError> {
    let _gate = state.lock_project(project_id).await;
    let sessions = state.sessions().await?;
    let existing = sessions.get(project_id).await?;

    let board_id = existing
        .as_ref()
        .map_or(request.board_id.as_str(), |session| session.board_id.as_str());
    if !state.directory().is_board_member(board_id, user_id).await? {
        return Err(ServiceError::NotEnoughRights(format!(
            "user `{user_id}` is not a member of board `{board_id}`"
        )));
    }

    let now = SystemTime::now();
    let mut session = match existing {
        Some(session) => session,
        None => {
            info!(project_id, user_id, board_id = %request.board_id, "opening planning-poker session");
            Session::new(
                project_id.to_owned(),
                request.board_id,
                request.list_id,
                user_id.to_owned(),
                now,
            )
        }
    };
    session.join(user_id, now);

    state
        .connections()
        .register(project_id, user_id, &request.connection_id);
    let committed = commit(state, &sessions, session).await;
    if committed.is_err() {
        state
            .connections()
            .unregister(project_id, user_id, &request.connection_id);
    }
    committed
}

/// Drop one connection; the participant leaves once their last connection is gone.
pub async fn leave_session(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
    request: LeaveSessionRequest,
) -> Result<SessionView, ServiceError> {
    let _gate = state.lock_project(project_id).await;
    let sessions = state.sessions().await?;
    let mut session = load_existing(&sessions, project_id).await?;

    let remaining = state
        .connections()
        .unregister(project_id, user_id, &request.connection_id);
    if remaining > 0 || !session.participants.contains_key(user_id) {
        debug!(project_id, user_id, remaining, "connection closed; participant stays");
        return Ok(SessionView::new(&session, state.connections()));
    }

    let emptied = session.leave(user_id, SystemTime::now(), state.config().closing_duration);
    if emptied {
        info!(project_id, "last participant left; session is closing");
    }
    commit(state, &sessions, session).await
}

/// Record or replace the caller's vote on the active card.
pub async fn cast_vote(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
    request: CastVoteRequest,
) -> Result<SessionView, ServiceError> {
    let value: VoteValue = request
        .value
        .parse()
        .map_err(|err: UnknownVoteValue| ServiceError::InvalidValue(err.to_string()))?;

    mutate(state, project_id, |session, now| {
        session.cast_vote(user_id, value, now)
    })
    .await
}

/// Switch the caller between voting and observing.
pub async fn set_observer(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
    request: SetObserverRequest,
) -> Result<SessionView, ServiceError> {
    mutate(state, project_id, |session, now| {
        session.set_observer(user_id, request.is_observer, now)
    })
    .await
}

/// Put a card on the table.
///
/// The card must exist on the session's board (and list, when one is set),
/// must not carry a positive estimate yet, and must not have been resolved
/// earlier in this session.
pub async fn activate_card(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
    request: ActivateCardRequest,
) -> Result<SessionView, ServiceError> {
    let _gate = state.lock_project(project_id).await;
    let sessions = state.sessions().await?;
    let mut session = load_existing(&sessions, project_id).await?;
    if !session.is_host(user_id) {
        return Err(ServiceError::NotEnoughRights(format!(
            "user `{user_id}` is not the session host"
        )));
    }

    let card = state
        .directory()
        .find_card(&request.card_id)
        .await?
        .filter(|card| card.board_id == session.board_id)
        .filter(|card| {
            session
                .list_id
                .as_ref()
                .is_none_or(|list_id| *list_id == card.list_id)
        })
        .filter(|card| card.is_unestimated())
        .ok_or_else(|| ServiceError::CardNotFound(request.card_id.clone()))?;

    session.activate_card(user_id, &card.id, SystemTime::now())?;
    commit(state, &sessions, session).await
}

/// Reveal the votes and compute their statistics (host only).
pub async fn finish_vote(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
) -> Result<SessionView, ServiceError> {
    mutate(state, project_id, |session, now| session.finish_vote(user_id, now)).await
}

/// Discard the votes and vote again on the same card (host only).
pub async fn restart_vote(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
) -> Result<SessionView, ServiceError> {
    mutate(state, project_id, |session, now| session.restart_vote(user_id, now)).await
}

/// Write the estimate to the card, then return the session to idle.
pub async fn assign_story_points(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
    request: AssignStoryPointsRequest,
) -> Result<SessionView, ServiceError> {
    let story_points = u32::try_from(request.story_points)
        .ok()
        .filter(|points| *points > 0)
        .ok_or_else(|| {
            ServiceError::InvalidValue(format!(
                "story points must be positive, got {}",
                request.story_points
            ))
        })?;

    let _gate = state.lock_project(project_id).await;
    let sessions = state.sessions().await?;
    let mut session = load_existing(&sessions, project_id).await?;
    let card_id = session.ensure_resolvable(user_id)?;

    state
        .directory()
        .set_story_points(&card_id, story_points)
        .await?;
    info!(project_id, card_id = %card_id, story_points, "story points assigned");

    session.resolve_card(user_id, SystemTime::now())?;
    commit(state, &sessions, session).await
}

/// Exclude the active card without estimating it (host only).
pub async fn skip_card(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
) -> Result<SessionView, ServiceError> {
    mutate(state, project_id, |session, now| {
        session.resolve_card(user_id, now).map(|_| ())
    })
    .await
}

/// Hand the host role to another participant.
pub async fn transfer_host(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
    request: TransferHostRequest,
) -> Result<SessionView, ServiceError> {
    mutate(state, project_id, |session, now| {
        session.transfer_host(user_id, &request.user_id, now)
    })
    .await
}

/// Host-initiated close; the session is deleted once the closing window elapses.
pub async fn close_session(
    state: &SharedState,
    project_id: &str,
    user_id: &str,
) -> Result<SessionView, ServiceError> {
    let closing_duration = state.config().closing_duration;
    let view = mutate(state, project_id, |session, now| {
        session.close(user_id, now, closing_duration)
    })
    .await?;
    info!(project_id, user_id, "session closed by host");
    Ok(view)
}

/// Persist `session` under a new version, re-arm its timer and broadcast it.
///
/// Callers must hold the project gate.
pub(crate) async fn commit(
    state: &SharedState,
    sessions: &SessionRepository,
    mut session: Session,
) -> Result<SessionView, ServiceError> {
    session.version += 1;
    sessions.save(&session).await?;
    session_timers::schedule(state, &session);

    let view = SessionView::new(&session, state.connections());
    sse_events::broadcast_session(state, &session.project_id, Some(&view));
    Ok(view)
}

async fn load_existing(
    sessions: &SessionRepository,
    project_id: &str,
) -> Result<Session, ServiceError> {
    sessions
        .get(project_id)
        .await?
        .ok_or_else(|| ServiceError::SessionNotFound(project_id.to_owned()))
}

/// Gate, load, apply a purely local transition, then commit.
async fn mutate<F>(
    state: &SharedState,
    project_id: &str,
    apply: F,
) -> Result<SessionView, ServiceError>
where
    F: FnOnce(&mut Session, SystemTime) -> Result<(), SessionError>,
{
    let _gate = state.lock_project(project_id).await;
    let sessions = state.sessions().await?;
    let mut session = load_existing(&sessions, project_id).await?;
    apply(&mut session, SystemTime::now())?;
    commit(state, &sessions, session).await
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            board_directory::{CardEntity, MemoryBoardDirectory},
            session_store::{SessionStore, memory::MemorySessionStore},
        },
        dto::poker::PhaseView,
        services::sse_events::{EVENT_SESSION, session_topic},
        state::{AppState, session::ClosingReason},
    };

    struct Fixture {
        state: SharedState,
        directory: MemoryBoardDirectory,
        store: MemorySessionStore,
    }

    async fn fixture_with(config: AppConfig) -> Fixture {
        let directory = MemoryBoardDirectory::new();
        for user in ["u1", "u2", "u3"] {
            directory.add_member("b1", user);
        }
        directory.insert_card(card("c1", "l1", None));
        directory.insert_card(card("c2", "l2", None));
        directory.insert_card(card("done", "l1", Some(8)));

        let store = MemorySessionStore::new();
        let state = AppState::new(config, Arc::new(directory.clone()));
        state.set_session_store(Arc::new(store.clone())).await;
        Fixture {
            state,
            directory,
            store,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(AppConfig::default()).await
    }

    fn card(id: &str, list_id: &str, story_points: Option<i64>) -> CardEntity {
        CardEntity {
            id: id.into(),
            board_id: "b1".into(),
            list_id: list_id.into(),
            story_points,
        }
    }

    fn join_request(connection_id: &str) -> JoinSessionRequest {
        JoinSessionRequest {
            board_id: "b1".into(),
            list_id: None,
            connection_id: connection_id.into(),
        }
    }

    fn vote(value: &str) -> CastVoteRequest {
        CastVoteRequest {
            value: value.into(),
        }
    }

    fn activate(card_id: &str) -> ActivateCardRequest {
        ActivateCardRequest {
            card_id: card_id.into(),
        }
    }

    #[tokio::test]
    async fn estimation_round_end_to_end() {
        let Fixture {
            state, directory, ..
        } = fixture().await;

        let view = join_session(&state, "p1", "u1", join_request("tab-1"))
            .await
            .unwrap();
        assert_eq!(view.host_user_id, "u1");
        assert_eq!(view.phase, PhaseView::Idle);

        let view = activate_card(&state, "p1", "u1", activate("c1")).await.unwrap();
        assert_eq!(view.phase, PhaseView::Voting);
        assert_eq!(view.active_card_id.as_deref(), Some("c1"));

        let view = cast_vote(&state, "p1", "u1", vote("5")).await.unwrap();
        assert!(view.revealed_votes.is_none());

        let view = finish_vote(&state, "p1", "u1").await.unwrap();
        assert_eq!(view.phase, PhaseView::Revealed);
        let stats = view.vote_stats.unwrap();
        assert_eq!(stats.average, Some(5.0));
        assert_eq!(stats.suggested_story_points, Some(5));

        let view = assign_story_points(
            &state,
            "p1",
            "u1",
            AssignStoryPointsRequest { story_points: 5 },
        )
        .await
        .unwrap();
        assert_eq!(view.phase, PhaseView::Idle);
        assert_eq!(view.excluded_card_ids, vec!["c1".to_string()]);
        assert!(view.active_card_id.is_none());
        assert_eq!(directory.card("c1").unwrap().story_points, Some(5));
    }

    #[tokio::test]
    async fn every_mutation_bumps_version_and_broadcasts() {
        let Fixture { state, .. } = fixture().await;
        let mut events = state.sse().subscribe(&session_topic("p1"));

        let first = join_session(&state, "p1", "u1", join_request("a"))
            .await
            .unwrap();
        let second = join_session(&state, "p1", "u2", join_request("b"))
            .await
            .unwrap();
        assert_eq!(second.version, first.version + 1);

        for expected in [first.version, second.version] {
            let event = events.recv().await.unwrap();
            assert_eq!(event.event.as_deref(), Some(EVENT_SESSION));
            let payload: serde_json::Value = serde_json::from_str(&event.data).unwrap();
            assert_eq!(payload["version"], expected);
        }
    }

    #[tokio::test]
    async fn non_members_cannot_join() {
        let Fixture { state, store, .. } = fixture().await;

        let err = join_session(&state, "p1", "stranger", join_request("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotEnoughRights(_)));
        assert!(store.find_session("p1").await.unwrap().is_none());
        assert!(!state.connections().is_connected("p1", "stranger"));
    }

    #[tokio::test]
    async fn host_only_operations_reject_participants() {
        let Fixture { state, .. } = fixture().await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();
        join_session(&state, "p1", "u2", join_request("b")).await.unwrap();

        let err = activate_card(&state, "p1", "u2", activate("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotEnoughRights(_)));
        let err = close_session(&state, "p1", "u2").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotEnoughRights(_)));
    }

    #[tokio::test]
    async fn ineligible_cards_are_rejected() {
        let Fixture {
            state, directory, ..
        } = fixture().await;
        directory.insert_card(CardEntity {
            id: "foreign".into(),
            board_id: "b2".into(),
            list_id: "l1".into(),
            story_points: None,
        });
        join_session(
            &state,
            "p1",
            "u1",
            JoinSessionRequest {
                list_id: Some("l1".into()),
                ..join_request("a")
            },
        )
        .await
        .unwrap();

        for card_id in ["missing", "foreign", "c2", "done"] {
            let err = activate_card(&state, "p1", "u1", activate(card_id))
                .await
                .unwrap_err();
            assert!(
                matches!(err, ServiceError::CardNotFound(ref id) if id == card_id),
                "{card_id}: {err:?}"
            );
        }

        activate_card(&state, "p1", "u1", activate("c1")).await.unwrap();
        skip_card(&state, "p1", "u1").await.unwrap();
        let err = activate_card(&state, "p1", "u1", activate("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CardNotFound(_)));
    }

    #[tokio::test]
    async fn voting_rules_are_enforced() {
        let Fixture { state, .. } = fixture().await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();
        join_session(&state, "p1", "u2", join_request("b")).await.unwrap();

        let err = cast_vote(&state, "p1", "u2", vote("5")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        activate_card(&state, "p1", "u1", activate("c1")).await.unwrap();
        let err = cast_vote(&state, "p1", "u2", vote("4")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidValue(_)));

        set_observer(&state, "p1", "u2", SetObserverRequest { is_observer: true })
            .await
            .unwrap();
        let err = cast_vote(&state, "p1", "u2", vote("5")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotEnoughRights(_)));

        let err = cast_vote(&state, "p1", "u3", vote("5")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotEnoughRights(_)));
    }

    #[tokio::test]
    async fn becoming_observer_discards_vote() {
        let Fixture { state, .. } = fixture().await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();
        join_session(&state, "p1", "u2", join_request("b")).await.unwrap();
        activate_card(&state, "p1", "u1", activate("c1")).await.unwrap();
        cast_vote(&state, "p1", "u2", vote("coffee")).await.unwrap();

        let view = set_observer(&state, "p1", "u2", SetObserverRequest { is_observer: true })
            .await
            .unwrap();
        let u2 = view.participants.iter().find(|p| p.user_id == "u2").unwrap();
        assert!(u2.is_observer);
        assert!(!u2.has_voted);
    }

    #[tokio::test]
    async fn restart_clears_revealed_round() {
        let Fixture { state, .. } = fixture().await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();
        activate_card(&state, "p1", "u1", activate("c1")).await.unwrap();
        cast_vote(&state, "p1", "u1", vote("13")).await.unwrap();
        finish_vote(&state, "p1", "u1").await.unwrap();

        let view = restart_vote(&state, "p1", "u1").await.unwrap();
        assert_eq!(view.phase, PhaseView::Voting);
        assert!(view.vote_stats.is_none());
        assert!(view.participants.iter().all(|p| !p.has_voted));
        assert_eq!(view.active_card_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn non_positive_story_points_are_invalid() {
        let Fixture { state, .. } = fixture().await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();
        activate_card(&state, "p1", "u1", activate("c1")).await.unwrap();

        for story_points in [0, -2] {
            let err = assign_story_points(
                &state,
                "p1",
                "u1",
                AssignStoryPointsRequest { story_points },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidValue(_)));
        }
    }

    #[tokio::test]
    async fn host_moves_on_when_host_leaves() {
        let Fixture { state, .. } = fixture().await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();
        join_session(&state, "p1", "u2", join_request("b")).await.unwrap();

        let view = leave_session(
            &state,
            "p1",
            "u1",
            LeaveSessionRequest {
                connection_id: "a".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(view.host_user_id, "u2");
        assert_eq!(view.participants.len(), 1);
    }

    #[tokio::test]
    async fn participant_stays_while_another_tab_is_open() {
        let Fixture { state, .. } = fixture().await;
        join_session(&state, "p1", "u1", join_request("tab-1")).await.unwrap();
        join_session(&state, "p1", "u1", join_request("tab-2")).await.unwrap();

        let view = leave_session(
            &state,
            "p1",
            "u1",
            LeaveSessionRequest {
                connection_id: "tab-1".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(view.participants.len(), 1);
        assert!(view.participants[0].is_connected);
    }

    #[tokio::test]
    async fn transfer_host_requires_participant_target() {
        let Fixture { state, .. } = fixture().await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();
        join_session(&state, "p1", "u2", join_request("b")).await.unwrap();

        let err = transfer_host(
            &state,
            "p1",
            "u1",
            TransferHostRequest {
                user_id: "u3".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotEnoughRights(_)));

        let view = transfer_host(
            &state,
            "p1",
            "u1",
            TransferHostRequest {
                user_id: "u2".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(view.host_user_id, "u2");
    }

    #[tokio::test]
    async fn operations_without_session_fail() {
        let Fixture { state, .. } = fixture().await;
        assert!(get_session(&state, "p1").await.unwrap().is_none());
        assert!(matches!(
            finish_vote(&state, "p1", "u1").await,
            Err(ServiceError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn degraded_mode_rejects_operations() {
        let Fixture { state, .. } = fixture().await;
        state.update_degraded(true).await;
        assert!(matches!(
            join_session(&state, "p1", "u1", join_request("a")).await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn closing_twice_is_invalid() {
        let Fixture { state, .. } = fixture().await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();

        let view = close_session(&state, "p1", "u1").await.unwrap();
        assert_eq!(view.phase, PhaseView::Closing);
        assert_eq!(view.closing.unwrap().reason, ClosingReason::Manual);

        let err = close_session(&state, "p1", "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        let err = activate_card(&state, "p1", "u1", activate("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    fn fast_timers() -> AppConfig {
        AppConfig {
            auto_close_after: Duration::from_millis(80),
            closing_duration: Duration::from_millis(80),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn inactive_session_closes_then_disappears() {
        let Fixture { state, store, .. } = fixture_with(fast_timers()).await;
        let mut events = state.sse().subscribe(&session_topic("p1"));
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();
        events.recv().await.unwrap();

        let closing = timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(&closing.data).unwrap();
        assert_eq!(payload["phase"], "closing");
        assert_eq!(payload["closing"]["reason"], "inactivity");

        let deleted = timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deleted.data, "null");
        assert!(store.find_session("p1").await.unwrap().is_none());
        assert!(get_session(&state, "p1").await.unwrap().is_none());
        assert!(!state.connections().is_connected("p1", "u1"));
    }

    #[tokio::test]
    async fn activity_postpones_inactivity_close() {
        let Fixture { state, .. } = fixture_with(AppConfig {
            auto_close_after: Duration::from_millis(150),
            ..fast_timers()
        })
        .await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();

        for _ in 0..4 {
            sleep(Duration::from_millis(60)).await;
            set_observer(&state, "p1", "u1", SetObserverRequest { is_observer: false })
                .await
                .unwrap();
        }

        let view = get_session(&state, "p1").await.unwrap().unwrap();
        assert_eq!(view.phase, PhaseView::Idle);
    }

    #[tokio::test]
    async fn last_leave_closes_with_empty_reason() {
        let Fixture { state, store, .. } = fixture_with(fast_timers()).await;
        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();

        let view = leave_session(
            &state,
            "p1",
            "u1",
            LeaveSessionRequest {
                connection_id: "a".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(view.phase, PhaseView::Closing);
        assert!(view.participants.is_empty());
        assert_eq!(view.closing.unwrap().reason, ClosingReason::Empty);

        sleep(Duration::from_millis(300)).await;
        assert!(store.find_session("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn gates_do_not_outlive_their_sessions() {
        let Fixture { state, store, .. } = fixture_with(fast_timers()).await;
        for index in 0..500 {
            let project_id = format!("unknown-{index}");
            assert!(get_session(&state, &project_id).await.unwrap().is_none());
        }
        assert_eq!(state.open_gates(), 0);

        join_session(&state, "p1", "u1", join_request("a")).await.unwrap();
        sleep(Duration::from_millis(400)).await;

        assert!(store.find_session("p1").await.unwrap().is_none());
        assert_eq!(state.open_gates(), 0);
    }

    #[tokio::test]
    async fn reading_a_session_without_timer_rearms_it() {
        let Fixture { state, store, .. } = fixture().await;
        let sessions = SessionRepository::new(Arc::new(store.clone()));
        let past = SystemTime::now() - Duration::from_secs(120);
        let mut orphan = Session::new("p1".into(), "b1".into(), None, "u1".into(), past);
        orphan.join("u1", past);
        orphan.close("u1", past, Duration::from_secs(60)).unwrap();
        orphan.version = 4;
        sessions.save(&orphan).await.unwrap();
        assert!(state.timers().armed("p1").is_none());

        let view = get_session(&state, "p1").await.unwrap().unwrap();
        assert_eq!(view.phase, PhaseView::Closing);

        sleep(Duration::from_millis(100)).await;
        assert!(store.find_session("p1").await.unwrap().is_none());
        assert!(get_session(&state, "p1").await.unwrap().is_none());
    }
}
