use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::warn;

use super::{DeltaPlan, ParticipantDelta, PeriodDelta, PeriodKeyer};
use crate::game::{parse_score, GameRecord};
use crate::tournament::{ParticipantIndexer, ParticipantKey, Tournament};

/// A single game's contribution to its period, resolved to participant indices
#[derive(Debug, Default)]
struct Footprint {
    scores: BTreeMap<usize, i64>,
    winner: Option<usize>,
}

impl Footprint {
    fn indices(&self) -> BTreeSet<usize> {
        self.scores.keys().copied().chain(self.winner).collect()
    }

    fn score(&self, index: usize) -> i64 {
        self.scores.get(&index).copied().unwrap_or_default()
    }

    fn win(&self, index: usize) -> i64 {
        i64::from(self.winner == Some(index))
    }

    /// Whole footprint with `sign` applied: +1 to add the game, -1 to remove it
    fn signed(&self, sign: i64) -> Vec<ParticipantDelta> {
        self.indices()
            .into_iter()
            .map(|index| {
                ParticipantDelta::new(
                    index,
                    sign.saturating_mul(self.score(index)),
                    sign * self.win(index),
                )
            })
            .collect()
    }

    /// Difference between two footprints of the same game in the same period
    fn diff(old: &Footprint, new: &Footprint) -> Vec<ParticipantDelta> {
        let mut indices = old.indices();
        indices.extend(new.indices());
        indices
            .into_iter()
            .map(|index| {
                ParticipantDelta::new(
                    index,
                    new.score(index).saturating_sub(old.score(index)),
                    new.win(index) - old.win(index),
                )
            })
            .collect()
    }
}

/// Computes the per-period deltas that move the aggregates from a game's
/// previous snapshot to its new one.
pub struct DeltaCalculator {
    keyer: Arc<dyn PeriodKeyer>,
    indexer: ParticipantIndexer,
}

impl DeltaCalculator {
    pub fn new(keyer: Arc<dyn PeriodKeyer>, indexer: ParticipantIndexer) -> Self {
        Self { keyer, indexer }
    }

    pub fn keyer(&self) -> &Arc<dyn PeriodKeyer> {
        &self.keyer
    }

    pub fn calculate(
        &self,
        previous: Option<&GameRecord>,
        current: Option<&GameRecord>,
        tournament: &Tournament,
    ) -> DeltaPlan {
        let mut plan = DeltaPlan::default();

        match (previous, current) {
            (None, None) => {}
            (None, Some(new)) => {
                let footprint = self.footprint(new, tournament, &mut plan.unresolved);
                plan.periods.push(PeriodDelta {
                    period: self.keyer.period_key(new.date_time),
                    deltas: footprint.signed(1),
                    clamp_to_zero: false,
                });
            }
            (Some(old), None) => {
                let footprint = self.footprint(old, tournament, &mut plan.unresolved);
                plan.periods.push(PeriodDelta {
                    period: self.keyer.period_key(old.date_time),
                    deltas: footprint.signed(-1),
                    clamp_to_zero: true,
                });
            }
            (Some(old), Some(new)) => {
                let old_period = self.keyer.period_key(old.date_time);
                let new_period = self.keyer.period_key(new.date_time);
                let old_footprint = self.footprint(old, tournament, &mut plan.unresolved);
                let new_footprint = self.footprint(new, tournament, &mut plan.unresolved);

                if old_period == new_period {
                    plan.periods.push(PeriodDelta {
                        period: new_period,
                        deltas: Footprint::diff(&old_footprint, &new_footprint),
                        clamp_to_zero: false,
                    });
                } else {
                    // Independent aggregates: reverse fully, then re-apply fully
                    plan.periods.push(PeriodDelta {
                        period: old_period,
                        deltas: old_footprint.signed(-1),
                        clamp_to_zero: false,
                    });
                    plan.periods.push(PeriodDelta {
                        period: new_period,
                        deltas: new_footprint.signed(1),
                        clamp_to_zero: false,
                    });
                }
            }
        }

        plan
    }

    fn footprint(
        &self,
        game: &GameRecord,
        tournament: &Tournament,
        unresolved: &mut Vec<ParticipantKey>,
    ) -> Footprint {
        let mut footprint = Footprint::default();

        for (key, raw) in &game.scores {
            let Some(index) = self.resolve(game, tournament, key, unresolved) else {
                continue;
            };
            let score = parse_score(raw).unwrap_or_else(|| {
                warn!(
                    event = "malformed_score",
                    tournament_id = %tournament.id,
                    game_id = %game.id,
                    participant = %key,
                    raw = %raw,
                    "Score is not numeric; counting it as 0"
                );
                0
            });
            let total = footprint.scores.entry(index).or_insert(0);
            *total = total.saturating_add(score);
        }

        if let Some(key) = &game.winner_key {
            footprint.winner = self.resolve(game, tournament, key, unresolved);
        }

        footprint
    }

    fn resolve(
        &self,
        game: &GameRecord,
        tournament: &Tournament,
        key: &ParticipantKey,
        unresolved: &mut Vec<ParticipantKey>,
    ) -> Option<usize> {
        match self.indexer.index_of(tournament, key) {
            Ok(index) => Some(index),
            Err(err) => {
                warn!(
                    error = %err,
                    game_id = %game.id,
                    resolution = ?self.indexer.resolution(),
                    "Skipping contribution of unresolved participant"
                );
                if !unresolved.contains(key) {
                    unresolved.push(key.clone());
                }
                None
            }
        }
    }
}
