use thiserror::Error;

use crate::state::session::{ClosingWindow, SessionPhase};

/// Events that move a session between phases.
///
/// Membership changes (join, leave, observer toggles, host transfer) never
/// change the phase on their own and are therefore not modelled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PokerEvent {
    /// Host puts a card on the table.
    ActivateCard,
    /// A participant votes on the active card.
    Vote,
    /// Host reveals the collected votes.
    FinishVote,
    /// Host discards revealed votes and votes again.
    RestartVote,
    /// Host assigns story points to, or skips, the active card.
    ResolveCard,
    /// Session starts winding down (empty, inactive, or closed by the host).
    StartClosing(ClosingWindow),
}

/// Error returned when an event cannot be applied in the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in when the event was received.
    pub from: SessionPhase,
    /// The rejected event.
    pub event: PokerEvent,
}

/// Compute the phase reached by applying `event` in `phase`.
///
/// Total over every (phase, event) pair: anything not listed is rejected.
pub fn next_phase(phase: &SessionPhase, event: &PokerEvent) -> Result<SessionPhase, InvalidTransition> {
    let next = match (phase, event) {
        (SessionPhase::Idle, PokerEvent::ActivateCard) => SessionPhase::Voting,
        (SessionPhase::Voting, PokerEvent::Vote) => SessionPhase::Voting,
        (SessionPhase::Voting, PokerEvent::FinishVote) => SessionPhase::Revealed,
        (SessionPhase::Revealed, PokerEvent::RestartVote) => SessionPhase::Voting,
        (SessionPhase::Voting | SessionPhase::Revealed, PokerEvent::ResolveCard) => {
            SessionPhase::Idle
        }
        (
            SessionPhase::Idle | SessionPhase::Voting | SessionPhase::Revealed,
            PokerEvent::StartClosing(window),
        ) => SessionPhase::Closing(*window),
        (from, event) => {
            return Err(InvalidTransition {
                from: *from,
                event: *event,
            });
        }
    };

    Ok(next)
}
