use indexmap::IndexMap;
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::{
    dao::models::{ParticipantEntity, PhaseEntity, SessionEntity},
    state::{
        session::{ClosingReason, VoteValue},
        vote_stats::VoteStats,
    },
};

/// Session document as stored in MongoDB; timestamps use native BSON dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    project_id: String,
    board_id: String,
    list_id: Option<String>,
    host_user_id: String,
    participants: Vec<MongoParticipant>,
    active_card_id: Option<String>,
    phase: PhaseEntity,
    #[serde(default)]
    votes: IndexMap<String, VoteValue>,
    #[serde(default)]
    vote_stats: Option<VoteStats>,
    #[serde(default)]
    excluded_card_ids: Vec<String>,
    last_activity_at: DateTime,
    updated_at: DateTime,
    created_at: DateTime,
    #[serde(default)]
    closing_started_at: Option<DateTime>,
    #[serde(default)]
    closing_ends_at: Option<DateTime>,
    #[serde(default)]
    closing_reason: Option<ClosingReason>,
    #[serde(default)]
    version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoParticipant {
    user_id: String,
    is_observer: bool,
    joined_at: DateTime,
}

impl From<ParticipantEntity> for MongoParticipant {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            user_id: value.user_id,
            is_observer: value.is_observer,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl From<MongoParticipant> for ParticipantEntity {
    fn from(value: MongoParticipant) -> Self {
        Self {
            user_id: value.user_id,
            is_observer: value.is_observer,
            joined_at: value.joined_at.to_system_time(),
        }
    }
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            project_id: value.project_id,
            board_id: value.board_id,
            list_id: value.list_id,
            host_user_id: value.host_user_id,
            participants: value.participants.into_iter().map(Into::into).collect(),
            active_card_id: value.active_card_id,
            phase: value.phase,
            votes: value.votes,
            vote_stats: value.vote_stats,
            excluded_card_ids: value.excluded_card_ids,
            last_activity_at: DateTime::from_system_time(value.last_activity_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            created_at: DateTime::from_system_time(value.created_at),
            closing_started_at: value.closing_started_at.map(DateTime::from_system_time),
            closing_ends_at: value.closing_ends_at.map(DateTime::from_system_time),
            closing_reason: value.closing_reason,
            version: i64::try_from(value.version).unwrap_or(i64::MAX),
        }
    }
}

impl From<MongoSessionDocument> for SessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            project_id: value.project_id,
            board_id: value.board_id,
            list_id: value.list_id,
            host_user_id: value.host_user_id,
            participants: value.participants.into_iter().map(Into::into).collect(),
            active_card_id: value.active_card_id,
            phase: value.phase,
            votes: value.votes,
            vote_stats: value.vote_stats,
            excluded_card_ids: value.excluded_card_ids,
            last_activity_at: value.last_activity_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            created_at: value.created_at.to_system_time(),
            closing_started_at: value.closing_started_at.map(|at| at.to_system_time()),
            closing_ends_at: value.closing_ends_at.map(|at| at.to_system_time()),
            closing_reason: value.closing_reason,
            version: u64::try_from(value.version).unwrap_or_default(),
        }
    }
}
