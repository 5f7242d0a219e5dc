//! Reveal-time statistics computed from the collected votes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::session::{NUMERIC_SCALE, Participant, VoteValue};

/// Aggregate of the votes disclosed when a round is revealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VoteStats {
    /// Number of votes per allowed value (keyed by wire value), zero for values nobody picked.
    #[schema(value_type = Object)]
    pub counts: IndexMap<String, usize>,
    /// Number of votes taken into account, coffee included.
    pub total_votes: usize,
    /// Lowest numeric vote.
    pub minimum: Option<u32>,
    /// Highest numeric vote.
    pub maximum: Option<u32>,
    /// Mean of the numeric votes; coffee is ignored.
    pub average: Option<f64>,
    /// Smallest scale value at or above the average, clamped to the top of the scale.
    pub suggested_story_points: Option<u32>,
}

/// Compute the statistics for `votes`, ignoring anything cast by
/// non-participants or observers.
pub fn aggregate(
    participants: &IndexMap<String, Participant>,
    votes: &IndexMap<String, VoteValue>,
) -> VoteStats {
    let mut counts: IndexMap<String, usize> = VoteValue::ALL
        .into_iter()
        .map(|value| (value.as_str().to_owned(), 0))
        .collect();

    let eligible: Vec<VoteValue> = votes
        .iter()
        .filter(|(user_id, _)| {
            participants
                .get(*user_id)
                .is_some_and(|participant| !participant.is_observer)
        })
        .map(|(_, value)| *value)
        .collect();

    for value in &eligible {
        *counts.entry(value.as_str().to_owned()).or_default() += 1;
    }

    let numeric: Vec<u32> = eligible.iter().filter_map(VoteValue::numeric).collect();
    let average = if numeric.is_empty() {
        None
    } else {
        Some(numeric.iter().map(|value| f64::from(*value)).sum::<f64>() / numeric.len() as f64)
    };

    VoteStats {
        counts,
        total_votes: eligible.len(),
        minimum: numeric.iter().min().copied(),
        maximum: numeric.iter().max().copied(),
        average,
        suggested_story_points: average.map(suggest_story_points),
    }
}

/// Round `average` up to the estimation scale.
pub fn suggest_story_points(average: f64) -> u32 {
    NUMERIC_SCALE
        .into_iter()
        .find(|candidate| f64::from(*candidate) >= average)
        .unwrap_or(NUMERIC_SCALE[NUMERIC_SCALE.len() - 1])
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn participants(entries: &[(&str, bool)]) -> IndexMap<String, Participant> {
        entries
            .iter()
            .map(|(user_id, is_observer)| {
                (
                    user_id.to_string(),
                    Participant {
                        user_id: user_id.to_string(),
                        is_observer: *is_observer,
                        joined_at: SystemTime::now(),
                    },
                )
            })
            .collect()
    }

    fn votes(entries: &[(&str, VoteValue)]) -> IndexMap<String, VoteValue> {
        entries
            .iter()
            .map(|(user_id, value)| (user_id.to_string(), *value))
            .collect()
    }

    #[test]
    fn suggestion_rounds_up_to_scale() {
        assert_eq!(suggest_story_points(4.0), 5);
        assert_eq!(suggest_story_points(1.0), 1);
        assert_eq!(suggest_story_points(5.5), 8);
        assert_eq!(suggest_story_points(25.0), 21);
    }

    #[test]
    fn coffee_is_counted_but_not_averaged() {
        let stats = aggregate(
            &participants(&[("u1", false), ("u2", false), ("u3", false)]),
            &votes(&[
                ("u1", VoteValue::Three),
                ("u2", VoteValue::Five),
                ("u3", VoteValue::Coffee),
            ]),
        );

        assert_eq!(stats.total_votes, 3);
        assert_eq!(stats.counts["coffee"], 1);
        assert_eq!(stats.counts["13"], 0);
        assert_eq!(stats.minimum, Some(3));
        assert_eq!(stats.maximum, Some(5));
        assert_eq!(stats.average, Some(4.0));
        assert_eq!(stats.suggested_story_points, Some(5));
    }

    #[test]
    fn only_coffee_yields_no_numeric_stats() {
        let stats = aggregate(
            &participants(&[("u1", false)]),
            &votes(&[("u1", VoteValue::Coffee)]),
        );
        assert_eq!(stats.average, None);
        assert_eq!(stats.minimum, None);
        assert_eq!(stats.maximum, None);
        assert_eq!(stats.suggested_story_points, None);
    }

    #[test]
    fn observer_and_stranger_votes_are_ignored() {
        let stats = aggregate(
            &participants(&[("u1", false), ("u2", true)]),
            &votes(&[
                ("u1", VoteValue::Two),
                ("u2", VoteValue::TwentyOne),
                ("ghost", VoteValue::Thirteen),
            ]),
        );
        assert_eq!(stats.total_votes, 1);
        assert_eq!(stats.average, Some(2.0));
        assert_eq!(stats.suggested_story_points, Some(2));
    }

    #[test]
    fn counts_follow_allowed_value_order() {
        let stats = aggregate(&participants(&[]), &votes(&[]));
        let keys: Vec<&str> = stats.counts.keys().map(String::as_str).collect();
        assert_eq!(keys, ["1", "2", "3", "5", "8", "13", "21", "coffee"]);
    }
}
