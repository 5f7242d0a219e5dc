use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    dao::{
        models::{ParticipantEntity, PhaseEntity, SessionEntity},
        session_store::SessionStore,
        storage::StorageResult,
    },
    state::session::{ClosingReason, ClosingWindow, Participant, Session, SessionPhase},
};

/// Loads and stores sessions, repairing documents on the way in.
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn SessionStore>,
}

impl SessionRepository {
    /// Create an empty instance.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Fetch the session for `project_id`.
    ///
    /// A document that no longer describes a live session (nobody left and
    /// not closing) is deleted and reported as absent.
    pub async fn get(&self, project_id: &str) -> StorageResult<Option<Session>> {
        let Some(entity) = self.store.find_session(project_id).await? else {
            return Ok(None);
        };

        match Session::from(entity).normalize() {
            Some(session) => Ok(Some(session)),
            None => {
                info!(project_id, "deleting defunct planning-poker session");
                self.store.delete_session(project_id).await?;
                Ok(None)
            }
        }
    }

    /// Persist `session` as is; the caller bumps the version.
    pub async fn save(&self, session: &Session) -> StorageResult<()> {
        debug!(
            project_id = %session.project_id,
            version = session.version,
            "persisting planning-poker session"
        );
        self.store
            .upsert_session(SessionEntity::from(session))
            .await
    }

    /// Remove the session document, reporting whether one existed.
    pub async fn delete(&self, project_id: &str) -> StorageResult<bool> {
        self.store.delete_session(project_id).await
    }
}

impl From<&Session> for SessionEntity {
    fn from(session: &Session) -> Self {
        let (phase, closing) = match session.phase {
            SessionPhase::Idle => (PhaseEntity::Idle, None),
            SessionPhase::Voting => (PhaseEntity::Voting, None),
            SessionPhase::Revealed => (PhaseEntity::Revealed, None),
            SessionPhase::Closing(window) => (PhaseEntity::Closing, Some(window)),
        };

        Self {
            project_id: session.project_id.clone(),
            board_id: session.board_id.clone(),
            list_id: session.list_id.clone(),
            host_user_id: session.host_user_id.clone(),
            participants: session
                .participants
                .values()
                .map(|participant| ParticipantEntity {
                    user_id: participant.user_id.clone(),
                    is_observer: participant.is_observer,
                    joined_at: participant.joined_at,
                })
                .collect(),
            active_card_id: session.active_card_id.clone(),
            phase,
            votes: session.votes.clone(),
            vote_stats: session.vote_stats.clone(),
            excluded_card_ids: session.excluded_card_ids.iter().cloned().collect(),
            last_activity_at: session.last_activity_at,
            updated_at: session.updated_at,
            created_at: session.created_at,
            closing_started_at: closing.map(|window| window.started_at),
            closing_ends_at: closing.map(|window| window.ends_at),
            closing_reason: closing.map(|window| window.reason),
            version: session.version,
        }
    }
}

impl From<SessionEntity> for Session {
    fn from(entity: SessionEntity) -> Self {
        let phase = match entity.phase {
            PhaseEntity::Idle => SessionPhase::Idle,
            PhaseEntity::Voting => SessionPhase::Voting,
            PhaseEntity::Revealed => SessionPhase::Revealed,
            PhaseEntity::Closing => {
                // Incomplete windows finalize on the next timer pass.
                let started_at = entity.closing_started_at.unwrap_or(entity.updated_at);
                SessionPhase::Closing(ClosingWindow {
                    started_at,
                    ends_at: entity.closing_ends_at.unwrap_or(started_at),
                    reason: entity.closing_reason.unwrap_or(ClosingReason::Inactivity),
                })
            }
        };

        Self {
            project_id: entity.project_id,
            board_id: entity.board_id,
            list_id: entity.list_id,
            host_user_id: entity.host_user_id,
            participants: entity
                .participants
                .into_iter()
                .map(|participant| {
                    (
                        participant.user_id.clone(),
                        Participant {
                            user_id: participant.user_id,
                            is_observer: participant.is_observer,
                            joined_at: participant.joined_at,
                        },
                    )
                })
                .collect(),
            active_card_id: entity.active_card_id,
            phase,
            votes: entity.votes,
            vote_stats: entity.vote_stats,
            excluded_card_ids: entity.excluded_card_ids.into_iter().collect(),
            last_activity_at: entity.last_activity_at,
            updated_at: entity.updated_at,
            created_at: entity.created_at,
            version: entity.version,
        }
    }
}
