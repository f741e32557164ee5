//! Popularity scoring for stories and places.
//!
//! A score is always recomputed from the full set of per-post aggregates that
//! are currently mirrored, never accumulated from deltas. Replaying, dropping
//! duplicates or reordering the events that produced those aggregates cannot
//! change the result as long as the final aggregates agree.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::types::{PopularitySummary, PostAggregate, UserId};

/// Inputs to [`popularity`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopularityCounts {
    pub posts: u64,
    pub viewers: u64,
    pub participants: u64,
}

impl PopularityCounts {
    /// Count live posts and the distinct people across all of them.
    pub fn from_aggregates<'a, I>(aggregates: I) -> Self
    where
        I: IntoIterator<Item = &'a PostAggregate>,
    {
        let mut posts = 0u64;
        let mut viewers: BTreeSet<&UserId> = BTreeSet::new();
        let mut participants: BTreeSet<&UserId> = BTreeSet::new();
        for aggregate in aggregates {
            posts += 1;
            viewers.extend(aggregate.viewers.iter());
            participants.extend(aggregate.participants.iter());
        }
        Self {
            posts,
            viewers: viewers.len() as u64,
            participants: participants.len() as u64,
        }
    }
}

/// Relative weight of each count. Tunable through `[scoring]` in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PopularityWeights {
    pub post_weight: f64,
    pub viewer_weight: f64,
    pub participant_weight: f64,
}

impl Default for PopularityWeights {
    fn default() -> Self {
        Self {
            post_weight: 1.0,
            viewer_weight: 1.0,
            participant_weight: 2.0,
        }
    }
}

/// `wp·ln(1+posts) + wv·ln(1+viewers) + wc·ln(1+participants)`.
///
/// Non-negative and monotonic in every count for non-negative weights.
/// Negative weights are clamped to zero.
pub fn popularity(counts: PopularityCounts, weights: &PopularityWeights) -> f64 {
    let term = |weight: f64, count: u64| weight.max(0.0) * (count as f64).ln_1p();
    term(weights.post_weight, counts.posts)
        + term(weights.viewer_weight, counts.viewers)
        + term(weights.participant_weight, counts.participants)
}

/// Counts plus score, as stored under `stats/*/summary`.
pub fn summarize(counts: PopularityCounts, weights: &PopularityWeights) -> PopularitySummary {
    PopularitySummary {
        posts: counts.posts,
        viewers: counts.viewers,
        participants: counts.participants,
        score: popularity(counts, weights),
    }
}
