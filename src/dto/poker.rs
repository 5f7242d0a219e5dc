//! Client-facing session view and request bodies for the planning-poker API.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::format_system_time,
    state::{
        connections::ConnectionRegistry,
        session::{ClosingReason, NUMERIC_SCALE, Session, SessionPhase, VoteValue},
        vote_stats::VoteStats,
    },
};

/// Phase tag exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PhaseView {
    /// No card on the table.
    Idle,
    /// Votes are being collected.
    Voting,
    /// Votes are visible.
    Revealed,
    /// Grace period before deletion.
    Closing,
}

impl From<&SessionPhase> for PhaseView {
    fn from(phase: &SessionPhase) -> Self {
        match phase {
            SessionPhase::Idle => PhaseView::Idle,
            SessionPhase::Voting => PhaseView::Voting,
            SessionPhase::Revealed => PhaseView::Revealed,
            SessionPhase::Closing(_) => PhaseView::Closing,
        }
    }
}

/// One participant as shown to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantView {
    /// User identifier.
    pub user_id: String,
    /// Observers cannot vote.
    pub is_observer: bool,
    /// Whether the user currently holds at least one live connection.
    pub is_connected: bool,
    /// Whether a vote was recorded for the active card; the value stays hidden until reveal.
    pub has_voted: bool,
    /// RFC 3339.
    pub joined_at: String,
}

/// Grace period of a closing session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClosingView {
    /// RFC 3339 start of the closing window.
    pub started_at: String,
    /// When the session gets deleted.
    pub ends_at: String,
    /// Why the session is closing.
    pub reason: ClosingReason,
}

/// Serialized session broadcast to every subscriber of the project topic.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    /// Project owning the session.
    pub project_id: String,
    /// Board owning the session.
    pub board_id: String,
    /// List restricting which cards may be activated.
    pub list_id: Option<String>,
    /// Participant allowed to drive the rounds.
    pub host_user_id: String,
    /// Current phase.
    pub phase: PhaseView,
    /// Card being estimated, if any.
    pub active_card_id: Option<String>,
    /// Sorted by join time, oldest first.
    pub participants: Vec<ParticipantView>,
    /// Individual votes, only present once the round is revealed.
    #[schema(value_type = Option<Object>)]
    pub revealed_votes: Option<IndexMap<String, VoteValue>>,
    /// Present once revealed.
    pub vote_stats: Option<VoteStats>,
    /// Cards already estimated or skipped.
    pub excluded_card_ids: Vec<String>,
    /// Present while closing.
    pub closing: Option<ClosingView>,
    /// Deck offered to voters.
    pub allowed_votes: Vec<VoteValue>,
    /// Numeric part of the deck, ascending.
    pub numeric_scale: Vec<u32>,
    /// RFC 3339.
    pub last_activity_at: String,
    /// RFC 3339.
    pub updated_at: String,
    /// RFC 3339.
    pub created_at: String,
    /// Monotonic revision; increases with every change.
    pub version: u64,
}

impl SessionView {
    /// Client view of `session`; votes stay hidden until reveal.
    pub fn new(session: &Session, connections: &ConnectionRegistry) -> Self {
        let mut participants: Vec<ParticipantView> = session
            .participants
            .values()
            .map(|participant| ParticipantView {
                user_id: participant.user_id.clone(),
                is_observer: participant.is_observer,
                is_connected: connections.is_connected(&session.project_id, &participant.user_id),
                has_voted: session.votes.contains_key(&participant.user_id),
                joined_at: format_system_time(participant.joined_at),
            })
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        let joined_at = |view: &ParticipantView| {
            session
                .participants
                .get(&view.user_id)
                .map(|participant| participant.joined_at)
        };
        participants.sort_by_key(|view| joined_at(view));

        let revealed_votes =
            matches!(session.phase, SessionPhase::Revealed).then(|| session.votes.clone());

        Self {
            project_id: session.project_id.clone(),
            board_id: session.board_id.clone(),
            list_id: session.list_id.clone(),
            host_user_id: session.host_user_id.clone(),
            phase: PhaseView::from(&session.phase),
            active_card_id: session.active_card_id.clone(),
            participants,
            revealed_votes,
            vote_stats: session.vote_stats.clone(),
            excluded_card_ids: session.excluded_card_ids.iter().cloned().collect(),
            closing: session.phase.closing().map(|window| ClosingView {
                started_at: format_system_time(window.started_at),
                ends_at: format_system_time(window.ends_at),
                reason: window.reason,
            }),
            allowed_votes: VoteValue::ALL.to_vec(),
            numeric_scale: NUMERIC_SCALE.to_vec(),
            last_activity_at: format_system_time(session.last_activity_at),
            updated_at: format_system_time(session.updated_at),
            created_at: format_system_time(session.created_at),
            version: session.version,
        }
    }
}

/// Join (or re-join from another tab) the project's session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    /// Board scoping the session; only used when the session is created.
    #[validate(length(min = 1, max = 128))]
    pub board_id: String,
    /// Optional list restricting which cards may be estimated.
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub list_id: Option<String>,
    /// Connection identifier handed out by the events stream.
    #[validate(length(min = 1, max = 128))]
    pub connection_id: String,
}

/// Drop one of the caller's connections.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct LeaveSessionRequest {
    /// Connection identifier handed out by the events stream.
    #[validate(length(min = 1, max = 128))]
    pub connection_id: String,
}

/// Vote on the active card.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CastVoteRequest {
    /// One of `1`, `2`, `3`, `5`, `8`, `13`, `21`, `coffee`.
    #[validate(length(min = 1, max = 16))]
    pub value: String,
}

/// Toggle observer mode.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SetObserverRequest {
    /// Observers cannot vote.
    pub is_observer: bool,
}

/// Put a card on the table.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ActivateCardRequest {
    /// Card to estimate.
    #[validate(length(min = 1, max = 128))]
    pub card_id: String,
}

/// Write the estimate of the active card.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AssignStoryPointsRequest {
    /// Must be a positive number.
    pub story_points: i64,
}

/// Hand over the host role.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TransferHostRequest {
    /// User identifier.
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
}
