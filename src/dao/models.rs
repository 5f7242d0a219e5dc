use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::state::{
    session::{ClosingReason, VoteValue},
    vote_stats::VoteStats,
};

/// Persisted phase of a session document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEntity {
    /// No card on the table.
    Idle,
    /// Votes are being collected.
    Voting,
    /// Votes are visible.
    Revealed,
    /// Grace period before deletion.
    Closing,
}

/// Participant entry stored inside a session document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// User identifier.
    pub user_id: String,
    /// Observers cannot vote.
    pub is_observer: bool,
    /// First time the user joined.
    pub joined_at: SystemTime,
}

/// Planning-poker session document, one per project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntity {
    /// Project owning the session; doubles as the document key.
    pub project_id: String,
    /// Board owning the session.
    pub board_id: String,
    /// Optional list restricting which cards can be estimated.
    pub list_id: Option<String>,
    /// Participant allowed to drive the rounds.
    pub host_user_id: String,
    /// Participants in join order.
    pub participants: Vec<ParticipantEntity>,
    /// Card under estimation.
    pub active_card_id: Option<String>,
    /// Stored phase tag.
    pub phase: PhaseEntity,
    /// Votes for the active card, keyed by user id.
    #[serde(default)]
    pub votes: IndexMap<String, VoteValue>,
    /// Only stored while revealed.
    #[serde(default)]
    pub vote_stats: Option<VoteStats>,
    /// Cards estimated or skipped earlier in the session.
    #[serde(default)]
    pub excluded_card_ids: Vec<String>,
    /// Last user action; drives the inactivity timer.
    pub last_activity_at: SystemTime,
    /// Last change of any kind.
    pub updated_at: SystemTime,
    /// When the session was opened.
    pub created_at: SystemTime,
    /// Populated only while the session is closing.
    #[serde(default)]
    pub closing_started_at: Option<SystemTime>,
    /// End of the closing window.
    #[serde(default)]
    pub closing_ends_at: Option<SystemTime>,
    /// Why the session is closing.
    #[serde(default)]
    pub closing_reason: Option<ClosingReason>,
    /// Monotonic change counter.
    #[serde(default)]
    pub version: u64,
}
