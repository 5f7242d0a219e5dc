use std::{
    fmt,
    str::FromStr,
    time::{Duration, SystemTime},
};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::{
    state_machine::{InvalidTransition, PokerEvent, next_phase},
    vote_stats::{self, VoteStats},
};

/// Numeric estimation scale offered to voters, in ascending order.
pub const NUMERIC_SCALE: [u32; 7] = [1, 2, 3, 5, 8, 13, 21];

/// A single card a participant can put on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum VoteValue {
    /// One point.
    #[serde(rename = "1")]
    One,
    /// Two points.
    #[serde(rename = "2")]
    Two,
    /// Three points.
    #[serde(rename = "3")]
    Three,
    /// Five points.
    #[serde(rename = "5")]
    Five,
    /// Eight points.
    #[serde(rename = "8")]
    Eight,
    /// Thirteen points.
    #[serde(rename = "13")]
    Thirteen,
    /// Twenty-one points.
    #[serde(rename = "21")]
    TwentyOne,
    /// "I need a break" card; counted but never part of the numeric statistics.
    #[serde(rename = "coffee")]
    Coffee,
}

impl VoteValue {
    /// Every accepted vote, in display order.
    pub const ALL: [VoteValue; 8] = [
        VoteValue::One,
        VoteValue::Two,
        VoteValue::Three,
        VoteValue::Five,
        VoteValue::Eight,
        VoteValue::Thirteen,
        VoteValue::TwentyOne,
        VoteValue::Coffee,
    ];

    /// Wire representation of the vote.
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteValue::One => "1",
            VoteValue::Two => "2",
            VoteValue::Three => "3",
            VoteValue::Five => "5",
            VoteValue::Eight => "8",
            VoteValue::Thirteen => "13",
            VoteValue::TwentyOne => "21",
            VoteValue::Coffee => "coffee",
        }
    }

    /// Numeric weight of the vote, `None` for the coffee card.
    pub fn numeric(&self) -> Option<u32> {
        match self {
            VoteValue::One => Some(1),
            VoteValue::Two => Some(2),
            VoteValue::Three => Some(3),
            VoteValue::Five => Some(5),
            VoteValue::Eight => Some(8),
            VoteValue::Thirteen => Some(13),
            VoteValue::TwentyOne => Some(21),
            VoteValue::Coffee => None,
        }
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a vote string is not part of [`VoteValue::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not an allowed vote value")]
pub struct UnknownVoteValue(pub String);

impl FromStr for VoteValue {
    type Err = UnknownVoteValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        VoteValue::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value.trim())
            .ok_or_else(|| UnknownVoteValue(value.to_owned()))
    }
}

/// Why a session entered its closing grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClosingReason {
    /// The last participant left.
    Empty,
    /// Nobody touched the session for the configured inactivity window.
    Inactivity,
    /// The host closed the session.
    Manual,
}

/// Grace period bookkeeping carried by [`SessionPhase::Closing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosingWindow {
    /// Start of the closing window.
    pub started_at: SystemTime,
    /// Deletion deadline.
    pub ends_at: SystemTime,
    /// Why the session is closing.
    pub reason: ClosingReason,
}

/// Phase of the estimation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No card on the table.
    Idle,
    /// A card is active and votes are being collected.
    Voting,
    /// Votes are disclosed along with their statistics.
    Revealed,
    /// The session is winding down and will be deleted once the window ends.
    Closing(ClosingWindow),
}

impl SessionPhase {
    /// Closing window, if the session is winding down.
    pub fn closing(&self) -> Option<&ClosingWindow> {
        match self {
            SessionPhase::Closing(window) => Some(window),
            _ => None,
        }
    }

    /// Whether the session is in its closing window.
    pub fn is_closing(&self) -> bool {
        matches!(self, SessionPhase::Closing(_))
    }
}

/// Member of an estimation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// User identifier.
    pub user_id: String,
    /// Observers watch without voting.
    pub is_observer: bool,
    /// First time the user joined.
    pub joined_at: SystemTime,
}

/// Domain failures raised by session operations before anything is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Only the host may perform the operation.
    #[error("user `{0}` is not the session host")]
    NotHost(String),
    /// The user has not joined the session.
    #[error("user `{0}` is not a participant of the session")]
    NotParticipant(String),
    /// Observers cannot vote.
    #[error("observer `{0}` cannot vote")]
    ObserverCannotVote(String),
    /// The current phase does not accept the operation.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// A closing window is already running.
    #[error("session is already closing")]
    AlreadyClosing,
    /// The card was already estimated or skipped.
    #[error("card `{0}` was already estimated or skipped in this session")]
    CardExcluded(String),
}

/// Shared estimation state for a single project.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Project owning the session.
    pub project_id: String,
    /// Board owning the session.
    pub board_id: String,
    /// Restricts activatable cards to one list when set.
    pub list_id: Option<String>,
    /// Participant allowed to drive the rounds.
    pub host_user_id: String,
    /// Participants in insertion order; the first one inherits the host role.
    pub participants: IndexMap<String, Participant>,
    /// Card under estimation.
    pub active_card_id: Option<String>,
    /// Current phase.
    pub phase: SessionPhase,
    /// Votes on the active card, by user id.
    pub votes: IndexMap<String, VoteValue>,
    /// Computed on reveal.
    pub vote_stats: Option<VoteStats>,
    /// Cards estimated or skipped in this session.
    pub excluded_card_ids: IndexSet<String>,
    /// Last user action; drives the inactivity timer.
    pub last_activity_at: SystemTime,
    /// Last change of any kind.
    pub updated_at: SystemTime,
    /// When the session was opened.
    pub created_at: SystemTime,
    /// Bumped on every persisted change; timers compare against it to detect staleness.
    pub version: u64,
}

impl Session {
    /// Open a fresh idle session hosted by `host_user_id`.
    ///
    /// The host is not added as a participant here; callers join them before
    /// the session is first persisted.
    pub fn new(
        project_id: String,
        board_id: String,
        list_id: Option<String>,
        host_user_id: String,
        now: SystemTime,
    ) -> Self {
        Self {
            project_id,
            board_id,
            list_id,
            host_user_id,
            participants: IndexMap::new(),
            active_card_id: None,
            phase: SessionPhase::Idle,
            votes: IndexMap::new(),
            vote_stats: None,
            excluded_card_ids: IndexSet::new(),
            last_activity_at: now,
            updated_at: now,
            created_at: now,
            version: 0,
        }
    }

    /// Whether `user_id` currently hosts the session.
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_user_id == user_id
    }

    /// Refresh the activity timestamps that drive the inactivity timer.
    pub fn touch(&mut self, now: SystemTime) {
        self.last_activity_at = now;
        self.updated_at = now;
    }

    /// Moment after which the inactivity timer may close the session.
    pub fn inactivity_deadline(&self, auto_close_after: Duration) -> SystemTime {
        self.last_activity_at + auto_close_after
    }

    /// Add `user_id` to the session, keeping an existing membership untouched.
    pub fn join(&mut self, user_id: &str, now: SystemTime) {
        if !self.participants.contains_key(user_id) {
            self.participants.insert(
                user_id.to_owned(),
                Participant {
                    user_id: user_id.to_owned(),
                    is_observer: false,
                    joined_at: now,
                },
            );
        }

        if !self.participants.contains_key(&self.host_user_id) {
            self.host_user_id = user_id.to_owned();
        }

        self.touch(now);
    }

    /// Remove `user_id` together with their vote.
    ///
    /// Returns `true` when the departure emptied the session and started the
    /// closing window.
    pub fn leave(&mut self, user_id: &str, now: SystemTime, closing_duration: Duration) -> bool {
        if self.participants.shift_remove(user_id).is_none() {
            return false;
        }
        self.discard_vote(user_id);

        if self.host_user_id == user_id {
            if let Some(next_host) = self.participants.keys().next() {
                self.host_user_id = next_host.clone();
            }
        }

        self.touch(now);

        self.participants.is_empty()
            && self
                .start_closing(ClosingReason::Empty, now, closing_duration)
                .is_ok()
    }

    /// Record a vote for the active card.
    pub fn cast_vote(
        &mut self,
        user_id: &str,
        value: VoteValue,
        now: SystemTime,
    ) -> Result<(), SessionError> {
        let participant = self.require_participant(user_id)?;
        if participant.is_observer {
            return Err(SessionError::ObserverCannotVote(user_id.to_owned()));
        }
        next_phase(&self.phase, &PokerEvent::Vote)?;

        self.votes.insert(user_id.to_owned(), value);
        self.touch(now);
        Ok(())
    }

    /// Toggle observer mode; becoming an observer discards any pending vote.
    pub fn set_observer(
        &mut self,
        user_id: &str,
        is_observer: bool,
        now: SystemTime,
    ) -> Result<(), SessionError> {
        let participant = self
            .participants
            .get_mut(user_id)
            .ok_or_else(|| SessionError::NotParticipant(user_id.to_owned()))?;
        participant.is_observer = is_observer;

        if is_observer {
            self.discard_vote(user_id);
        }

        self.touch(now);
        Ok(())
    }

    /// Put `card_id` on the table and open the vote.
    ///
    /// Board, list and story-point eligibility are checked by the caller
    /// against the card domain; only the session-local exclusion list is
    /// enforced here.
    pub fn activate_card(
        &mut self,
        user_id: &str,
        card_id: &str,
        now: SystemTime,
    ) -> Result<(), SessionError> {
        self.require_host(user_id)?;
        if self.excluded_card_ids.contains(card_id) {
            return Err(SessionError::CardExcluded(card_id.to_owned()));
        }
        let next = next_phase(&self.phase, &PokerEvent::ActivateCard)?;

        self.phase = next;
        self.active_card_id = Some(card_id.to_owned());
        self.votes.clear();
        self.vote_stats = None;
        self.touch(now);
        Ok(())
    }

    /// Reveal the votes and compute their statistics.
    pub fn finish_vote(&mut self, user_id: &str, now: SystemTime) -> Result<(), SessionError> {
        self.require_host(user_id)?;
        let next = next_phase(&self.phase, &PokerEvent::FinishVote)?;

        self.phase = next;
        self.vote_stats = Some(vote_stats::aggregate(&self.participants, &self.votes));
        self.touch(now);
        Ok(())
    }

    /// Throw away revealed votes and vote again on the same card.
    pub fn restart_vote(&mut self, user_id: &str, now: SystemTime) -> Result<(), SessionError> {
        self.require_host(user_id)?;
        let next = next_phase(&self.phase, &PokerEvent::RestartVote)?;

        self.phase = next;
        self.votes.clear();
        self.vote_stats = None;
        self.touch(now);
        Ok(())
    }

    /// Check that the host may resolve the active card, returning its id.
    ///
    /// Split from [`Session::resolve_card`] so story points can be written to
    /// the card domain before the session itself changes.
    pub fn ensure_resolvable(&self, user_id: &str) -> Result<String, SessionError> {
        self.require_host(user_id)?;
        next_phase(&self.phase, &PokerEvent::ResolveCard)?;
        self.active_card_id.clone().ok_or_else(|| {
            SessionError::InvalidTransition(InvalidTransition {
                from: self.phase,
                event: PokerEvent::ResolveCard,
            })
        })
    }

    /// Close the round on the active card, excluding it from further rounds.
    pub fn resolve_card(&mut self, user_id: &str, now: SystemTime) -> Result<String, SessionError> {
        let card_id = self.ensure_resolvable(user_id)?;

        self.phase = SessionPhase::Idle;
        self.excluded_card_ids.insert(card_id.clone());
        self.clear_round();
        self.touch(now);
        Ok(card_id)
    }

    /// Hand the host role to another participant.
    pub fn transfer_host(
        &mut self,
        user_id: &str,
        target_user_id: &str,
        now: SystemTime,
    ) -> Result<(), SessionError> {
        self.require_host(user_id)?;
        self.require_participant(target_user_id)?;

        self.host_user_id = target_user_id.to_owned();
        self.touch(now);
        Ok(())
    }

    /// Host-initiated close.
    pub fn close(
        &mut self,
        user_id: &str,
        now: SystemTime,
        closing_duration: Duration,
    ) -> Result<(), SessionError> {
        self.require_host(user_id)?;
        self.start_closing(ClosingReason::Manual, now, closing_duration)
    }

    /// Enter the closing window for `reason`, dropping the current round.
    pub fn start_closing(
        &mut self,
        reason: ClosingReason,
        now: SystemTime,
        closing_duration: Duration,
    ) -> Result<(), SessionError> {
        let window = ClosingWindow {
            started_at: now,
            ends_at: now + closing_duration,
            reason,
        };
        self.phase = next_phase(&self.phase, &PokerEvent::StartClosing(window))
            .map_err(|_| SessionError::AlreadyClosing)?;
        self.clear_round();
        self.updated_at = now;
        Ok(())
    }

    /// Repair a loaded session so its participant, vote and host fields agree again.
    ///
    /// Returns `None` for a defunct session: no participants left and not
    /// winding down.
    pub fn normalize(mut self) -> Option<Self> {
        if self.participants.is_empty() && !self.phase.is_closing() {
            return None;
        }

        let participants = &self.participants;
        self.votes.retain(|user_id, _| {
            participants
                .get(user_id)
                .is_some_and(|participant| !participant.is_observer)
        });

        match self.phase {
            SessionPhase::Voting | SessionPhase::Revealed => {
                if self.active_card_id.is_none() {
                    self.phase = SessionPhase::Idle;
                    self.clear_round();
                }
            }
            SessionPhase::Idle | SessionPhase::Closing(_) => self.clear_round(),
        }

        self.vote_stats = (self.phase == SessionPhase::Revealed)
            .then(|| vote_stats::aggregate(&self.participants, &self.votes));

        if !self.participants.contains_key(&self.host_user_id) {
            if let Some(first) = self.participants.keys().next() {
                self.host_user_id = first.clone();
            }
        }

        Some(self)
    }

    /// Drop `user_id`'s vote; revealed statistics follow the remaining votes.
    fn discard_vote(&mut self, user_id: &str) {
        if self.votes.shift_remove(user_id).is_some() && self.phase == SessionPhase::Revealed {
            self.vote_stats = Some(vote_stats::aggregate(&self.participants, &self.votes));
        }
    }

    fn clear_round(&mut self) {
        self.active_card_id = None;
        self.votes.clear();
        self.vote_stats = None;
    }

    fn require_host(&self, user_id: &str) -> Result<(), SessionError> {
        if self.is_host(user_id) {
            Ok(())
        } else {
            Err(SessionError::NotHost(user_id.to_owned()))
        }
    }

    fn require_participant(&self, user_id: &str) -> Result<&Participant, SessionError> {
        self.participants
            .get(user_id)
            .ok_or_else(|| SessionError::NotParticipant(user_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOSING: Duration = Duration::from_secs(60);

    fn session_with(users: &[&str]) -> Session {
        let now = SystemTime::now();
        let mut session = Session::new("p1".into(), "b1".into(), None, users[0].into(), now);
        for user in users {
            session.join(user, now);
        }
        session
    }

    #[test]
    fn vote_values_parse_from_wire_strings() {
        assert_eq!("13".parse::<VoteValue>().unwrap(), VoteValue::Thirteen);
        assert_eq!("coffee".parse::<VoteValue>().unwrap(), VoteValue::Coffee);
        assert!("4".parse::<VoteValue>().is_err());
        assert!("?".parse::<VoteValue>().is_err());
    }

    #[test]
    fn joining_twice_keeps_original_membership() {
        let mut session = session_with(&["u1"]);
        let joined_at = session.participants["u1"].joined_at;
        session.join("u1", joined_at + Duration::from_secs(5));
        assert_eq!(session.participants.len(), 1);
        assert_eq!(session.participants["u1"].joined_at, joined_at);
    }

    #[test]
    fn host_departure_promotes_next_participant() {
        let mut session = session_with(&["u1", "u2", "u3"]);
        let emptied = session.leave("u1", SystemTime::now(), CLOSING);
        assert!(!emptied);
        assert_eq!(session.host_user_id, "u2");
        assert!(!session.participants.contains_key("u1"));
    }

    #[test]
    fn last_departure_starts_closing() {
        let mut session = session_with(&["u1"]);
        let now = SystemTime::now();
        assert!(session.leave("u1", now, CLOSING));
        let window = session.phase.closing().copied().unwrap();
        assert_eq!(window.reason, ClosingReason::Empty);
        assert_eq!(window.ends_at, now + CLOSING);
    }

    #[test]
    fn leaving_removes_vote() {
        let mut session = session_with(&["u1", "u2"]);
        let now = SystemTime::now();
        session.activate_card("u1", "c1", now).unwrap();
        session.cast_vote("u2", VoteValue::Three, now).unwrap();
        session.leave("u2", now, CLOSING);
        assert!(session.votes.is_empty());
    }

    #[test]
    fn voting_requires_voting_phase() {
        let mut session = session_with(&["u1"]);
        let err = session
            .cast_vote("u1", VoteValue::Five, SystemTime::now())
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition(_)));
    }

    #[test]
    fn observers_cannot_vote_and_lose_existing_vote() {
        let mut session = session_with(&["u1", "u2"]);
        let now = SystemTime::now();
        session.activate_card("u1", "c1", now).unwrap();
        session.cast_vote("u2", VoteValue::Eight, now).unwrap();

        session.set_observer("u2", true, now).unwrap();
        assert!(!session.votes.contains_key("u2"));

        let err = session.cast_vote("u2", VoteValue::Eight, now).unwrap_err();
        assert_eq!(err, SessionError::ObserverCannotVote("u2".into()));
    }

    #[test]
    fn host_only_operations_reject_other_participants() {
        let mut session = session_with(&["u1", "u2"]);
        let now = SystemTime::now();
        assert_eq!(
            session.activate_card("u2", "c1", now).unwrap_err(),
            SessionError::NotHost("u2".into())
        );
        assert_eq!(
            session.close("u2", now, CLOSING).unwrap_err(),
            SessionError::NotHost("u2".into())
        );
        assert_eq!(
            session.transfer_host("u2", "u2", now).unwrap_err(),
            SessionError::NotHost("u2".into())
        );
    }

    fn revealed(users: &[&str], votes: &[(&str, VoteValue)]) -> Session {
        let mut session = session_with(users);
        let now = SystemTime::now();
        session.activate_card(users[0], "c1", now).unwrap();
        for (user, value) in votes {
            session.cast_vote(user, *value, now).unwrap();
        }
        session.finish_vote(users[0], now).unwrap();
        session
    }

    #[test]
    fn observer_toggle_after_reveal_refreshes_stats() {
        let mut session = revealed(
            &["u1", "u2"],
            &[("u1", VoteValue::One), ("u2", VoteValue::TwentyOne)],
        );
        assert_eq!(session.vote_stats.as_ref().unwrap().total_votes, 2);

        session.set_observer("u2", true, SystemTime::now()).unwrap();

        let stats = session.vote_stats.as_ref().unwrap();
        assert_eq!(session.votes.len(), 1);
        assert_eq!(stats.total_votes, 1);
        assert_eq!(stats.average, Some(1.0));
        assert_eq!(stats.suggested_story_points, Some(1));
    }

    #[test]
    fn departure_after_reveal_refreshes_stats() {
        let mut session = revealed(
            &["u1", "u2", "u3"],
            &[("u1", VoteValue::Three), ("u2", VoteValue::Thirteen), ("u3", VoteValue::Three)],
        );

        session.leave("u2", SystemTime::now(), CLOSING);

        let stats = session.vote_stats.as_ref().unwrap();
        assert_eq!(stats.total_votes, 2);
        assert_eq!(stats.maximum, Some(3));
        assert_eq!(stats.average, Some(3.0));
    }

    #[test]
    fn reveal_then_restart_resets_round() {
        let mut session = session_with(&["u1", "u2"]);
        let now = SystemTime::now();
        session.activate_card("u1", "c1", now).unwrap();
        session.cast_vote("u1", VoteValue::Five, now).unwrap();
        session.cast_vote("u2", VoteValue::Coffee, now).unwrap();
        session.finish_vote("u1", now).unwrap();
        assert!(session.vote_stats.is_some());

        session.restart_vote("u1", now).unwrap();
        assert_eq!(session.phase, SessionPhase::Voting);
        assert!(session.votes.is_empty());
        assert!(session.vote_stats.is_none());
        assert_eq!(session.active_card_id.as_deref(), Some("c1"));
    }

    #[test]
    fn resolved_cards_cannot_be_reactivated() {
        let mut session = session_with(&["u1"]);
        let now = SystemTime::now();
        session.activate_card("u1", "c1", now).unwrap();
        assert_eq!(session.resolve_card("u1", now).unwrap(), "c1");
        assert_eq!(session.phase, SessionPhase::Idle);
        assert!(session.active_card_id.is_none());

        assert_eq!(
            session.activate_card("u1", "c1", now).unwrap_err(),
            SessionError::CardExcluded("c1".into())
        );
    }

    #[test]
    fn manual_close_clears_round_and_cannot_repeat() {
        let mut session = session_with(&["u1"]);
        let now = SystemTime::now();
        session.activate_card("u1", "c1", now).unwrap();
        session.close("u1", now, CLOSING).unwrap();

        assert_eq!(
            session.phase.closing().map(|window| window.reason),
            Some(ClosingReason::Manual)
        );
        assert!(session.active_card_id.is_none());
        assert_eq!(
            session.close("u1", now, CLOSING).unwrap_err(),
            SessionError::AlreadyClosing
        );
    }

    #[test]
    fn transfer_host_requires_participant_target() {
        let mut session = session_with(&["u1", "u2"]);
        let now = SystemTime::now();
        assert_eq!(
            session.transfer_host("u1", "u9", now).unwrap_err(),
            SessionError::NotParticipant("u9".into())
        );
        session.transfer_host("u1", "u2", now).unwrap();
        assert!(session.is_host("u2"));
    }

    #[test]
    fn normalize_discards_defunct_sessions() {
        let now = SystemTime::now();
        let session = Session::new("p1".into(), "b1".into(), None, "u1".into(), now);
        assert!(session.normalize().is_none());
    }

    #[test]
    fn normalize_repairs_votes_and_host() {
        let mut session = session_with(&["u1", "u2"]);
        let now = SystemTime::now();
        session.activate_card("u1", "c1", now).unwrap();
        session.votes.insert("ghost".into(), VoteValue::One);
        session.votes.insert("u2".into(), VoteValue::Two);
        session.participants.get_mut("u2").unwrap().is_observer = true;
        session.participants.shift_remove("u1");

        let session = session.normalize().unwrap();
        assert!(session.votes.is_empty());
        assert_eq!(session.host_user_id, "u2");
        assert_eq!(session.phase, SessionPhase::Voting);
    }
}
