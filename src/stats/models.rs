use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::StatsError;
use crate::tournament::ParticipantKey;

/// Identifier of one time bucket, e.g. `2024-03-01` for a daily bucketing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeriodKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Aggregate for one (tournament, period) pair, keyed by participant index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateBucket {
    #[serde(default)]
    pub scores: BTreeMap<usize, i64>,
    #[serde(default)]
    pub wins: BTreeMap<usize, i64>,
}

impl AggregateBucket {
    pub fn score(&self, index: usize) -> i64 {
        self.scores.get(&index).copied().unwrap_or_default()
    }

    pub fn wins(&self, index: usize) -> i64 {
        self.wins.get(&index).copied().unwrap_or_default()
    }

    /// Adds each delta to its participant's fields, saturating at the i64 bounds.
    /// With `clamp_to_zero` every touched field is floored at zero after the addition.
    pub fn apply(&mut self, deltas: &[ParticipantDelta], clamp_to_zero: bool) {
        for delta in deltas {
            let score = self.scores.entry(delta.index).or_insert(0);
            *score = score.saturating_add(delta.score);
            let wins = self.wins.entry(delta.index).or_insert(0);
            *wins = wins.saturating_add(delta.wins);
            if clamp_to_zero {
                *score = (*score).max(0);
                *wins = (*wins).max(0);
            }
        }
    }

    /// Copy containing only the given indices, used for merge writes
    pub fn restricted_to(&self, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut partial = Self::default();
        for index in indices {
            partial.scores.insert(index, self.score(index));
            partial.wins.insert(index, self.wins(index));
        }
        partial
    }

    /// Overlays `partial` onto this bucket, leaving other indices untouched
    pub fn overlay(&mut self, partial: &AggregateBucket) {
        self.scores
            .extend(partial.scores.iter().map(|(index, value)| (*index, *value)));
        self.wins
            .extend(partial.wins.iter().map(|(index, value)| (*index, *value)));
    }
}

/// Signed change for one participant inside one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDelta {
    pub index: usize,
    pub score: i64,
    pub wins: i64,
}

impl ParticipantDelta {
    pub fn new(index: usize, score: i64, wins: i64) -> Self {
        Self { index, score, wins }
    }

    pub fn is_zero(&self) -> bool {
        self.score == 0 && self.wins == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodDelta {
    pub period: PeriodKey,
    pub deltas: Vec<ParticipantDelta>,
    /// Set on the deletion path only
    pub clamp_to_zero: bool,
}

impl PeriodDelta {
    pub fn is_noop(&self) -> bool {
        self.deltas.iter().all(ParticipantDelta::is_zero)
    }

    pub fn get(&self, index: usize) -> Option<&ParticipantDelta> {
        self.deltas.iter().find(|delta| delta.index == index)
    }
}

/// Output of the delta calculation for one game mutation.
///
/// Holds at most two periods: the old one and the new one of a cross-period
/// update. Keys that did not resolve against the tournament are reported in
/// `unresolved` and contribute nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaPlan {
    pub periods: Vec<PeriodDelta>,
    pub unresolved: Vec<ParticipantKey>,
}

impl DeltaPlan {
    pub fn period(&self, period: &PeriodKey) -> Option<&PeriodDelta> {
        self.periods.iter().find(|p| &p.period == period)
    }

    pub fn is_noop(&self) -> bool {
        self.periods.iter().all(PeriodDelta::is_noop)
    }

    /// Flattened `(period, index, score delta, win delta)` view
    pub fn tuples(&self) -> impl Iterator<Item = (&PeriodKey, usize, i64, i64)> + '_ {
        self.periods.iter().flat_map(|period| {
            period
                .deltas
                .iter()
                .map(move |d| (&period.period, d.index, d.score, d.wins))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRef {
    pub tournament_id: String,
    pub period: PeriodKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingTournamentId,
    TournamentNotFound { tournament_id: String },
    EmptyMutation,
}

impl TryFrom<&StatsError> for SkipReason {
    type Error = ();

    fn try_from(err: &StatsError) -> Result<Self, Self::Error> {
        match err {
            StatsError::MissingTournamentId => Ok(SkipReason::MissingTournamentId),
            StatsError::TournamentNotFound(tournament_id) => Ok(SkipReason::TournamentNotFound {
                tournament_id: tournament_id.clone(),
            }),
            _ => Err(()),
        }
    }
}

/// What processing one mutation did to the aggregate store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    /// Buckets that received a merge
    pub applied: Vec<PeriodRef>,
    /// Buckets skipped because the event id was already applied to them
    pub duplicates: Vec<PeriodRef>,
    pub skipped: Vec<SkipReason>,
    pub unresolved: Vec<ParticipantKey>,
}

impl MutationOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: vec![reason],
            ..Self::default()
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.applied.is_empty() && self.duplicates.is_empty() && !self.skipped.is_empty()
    }
}
