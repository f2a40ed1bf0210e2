use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{
    AggregateBucket, AggregateMerger, BucketStore, DailyPeriodKeyer, DeltaCalculator, EventLedger,
    MutationOutcome, PeriodKey, PeriodKeyer, PeriodRef, SkipReason, StatsError,
};
use crate::game::{GameMutation, GameRecord};
use crate::tournament::{
    ParticipantIndexer, ParticipantResolution, Tournament, TournamentLookup,
};

/// Processes game mutations into per-period tournament aggregates.
///
/// Each call is independent; the service holds no per-tournament locks and
/// relies on the bucket store's merge semantics for concurrency safety.
pub struct StatsService {
    tournaments: Arc<dyn TournamentLookup>,
    calculator: DeltaCalculator,
    merger: AggregateMerger,
    ledger: Option<Arc<dyn EventLedger>>,
}

impl StatsService {
    pub fn builder(
        tournaments: Arc<dyn TournamentLookup>,
        buckets: Arc<dyn BucketStore>,
    ) -> StatsServiceBuilder {
        StatsServiceBuilder::new(tournaments, buckets)
    }

    pub fn period_keyer(&self) -> &Arc<dyn PeriodKeyer> {
        self.calculator.keyer()
    }

    #[instrument(skip(self, mutation), fields(game_id = %mutation.game_id, kind = mutation.kind().as_str()))]
    pub async fn process_mutation(
        &self,
        mutation: &GameMutation,
    ) -> Result<MutationOutcome, StatsError> {
        let mut outcome = MutationOutcome::default();

        if let (true, Some(previous), Some(current)) = (
            mutation.is_reassignment(),
            mutation.previous_snapshot.as_ref(),
            mutation.new_snapshot.as_ref(),
        ) {
            info!(
                from = ?previous.tournament_id,
                to = ?current.tournament_id,
                "Game moved between tournaments; splitting into delete and create"
            );
            self.apply(mutation.event_id, previous.tournament_id.as_deref(), Some(previous), None, &mut outcome)
                .await?;
            self.apply(mutation.event_id, current.tournament_id.as_deref(), None, Some(current), &mut outcome)
                .await?;
        } else {
            self.apply(
                mutation.event_id,
                mutation.tournament_id(),
                mutation.previous_snapshot.as_ref(),
                mutation.new_snapshot.as_ref(),
                &mut outcome,
            )
            .await?;
        }

        info!(
            applied = outcome.applied.len(),
            duplicates = outcome.duplicates.len(),
            skipped = outcome.skipped.len(),
            unresolved = outcome.unresolved.len(),
            "Game mutation processed"
        );
        Ok(outcome)
    }

    pub async fn get_bucket(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<Option<AggregateBucket>, StatsError> {
        self.merger.store().get_bucket(tournament_id, period).await
    }

    pub async fn buckets_for(
        &self,
        tournament_id: &str,
    ) -> Result<BTreeMap<PeriodKey, AggregateBucket>, StatsError> {
        self.merger.store().buckets_for(tournament_id).await
    }

    async fn apply(
        &self,
        event_id: Option<Uuid>,
        tournament_id: Option<&str>,
        previous: Option<&GameRecord>,
        current: Option<&GameRecord>,
        outcome: &mut MutationOutcome,
    ) -> Result<(), StatsError> {
        let tournament = match self.load_tournament(tournament_id).await {
            Ok(tournament) => tournament,
            Err(err) if err.is_noop() => {
                warn!(error = %err, "Skipping game mutation");
                if let Ok(reason) = SkipReason::try_from(&err) {
                    outcome.skipped.push(reason);
                }
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if previous.is_none() && current.is_none() {
            debug!(tournament_id = %tournament.id, "Mutation carries no snapshots");
            outcome.skipped.push(SkipReason::EmptyMutation);
            return Ok(());
        }

        let plan = self.calculator.calculate(previous, current, &tournament);
        for key in plan.unresolved {
            if !outcome.unresolved.contains(&key) {
                outcome.unresolved.push(key);
            }
        }

        for period_delta in &plan.periods {
            let period_ref = PeriodRef {
                tournament_id: tournament.id.clone(),
                period: period_delta.period.clone(),
            };

            if period_delta.is_noop() {
                debug!(period = %period_delta.period, "All deltas are zero; nothing to write");
                continue;
            }

            let claim = match (&self.ledger, event_id) {
                (Some(ledger), Some(event_id)) => Some((ledger, event_id)),
                _ => None,
            };

            if let Some((ledger, event_id)) = claim {
                if !ledger
                    .try_claim(event_id, &tournament.id, &period_delta.period)
                    .await?
                {
                    info!(
                        %event_id,
                        period = %period_delta.period,
                        "Mutation already claimed for this period; ignoring redelivery"
                    );
                    outcome.duplicates.push(period_ref);
                    continue;
                }
            }

            if let Err(err) = self.merger.merge(&tournament.id, period_delta).await {
                if let Some((ledger, event_id)) = claim {
                    if let Err(release_err) = ledger
                        .release(event_id, &tournament.id, &period_delta.period)
                        .await
                    {
                        error!(
                            %event_id,
                            period = %period_delta.period,
                            error = %release_err,
                            "Failed to release ledger claim after merge failure"
                        );
                    }
                }
                return Err(err);
            }
            outcome.applied.push(period_ref);
        }

        Ok(())
    }

    async fn load_tournament(&self, tournament_id: Option<&str>) -> Result<Tournament, StatsError> {
        let tournament_id = tournament_id.ok_or(StatsError::MissingTournamentId)?;
        self.tournaments
            .get(tournament_id)
            .await?
            .ok_or_else(|| StatsError::TournamentNotFound(tournament_id.to_string()))
    }
}

pub struct StatsServiceBuilder {
    tournaments: Arc<dyn TournamentLookup>,
    buckets: Arc<dyn BucketStore>,
    keyer: Arc<dyn PeriodKeyer>,
    resolution: ParticipantResolution,
    max_retries: u32,
    backoff: Duration,
    ledger: Option<Arc<dyn EventLedger>>,
}

impl StatsServiceBuilder {
    fn new(tournaments: Arc<dyn TournamentLookup>, buckets: Arc<dyn BucketStore>) -> Self {
        Self {
            tournaments,
            buckets,
            keyer: Arc::new(DailyPeriodKeyer::utc()),
            resolution: ParticipantResolution::default(),
            max_retries: 3,
            backoff: Duration::from_millis(100),
            ledger: None,
        }
    }

    pub fn with_period_keyer(mut self, keyer: Arc<dyn PeriodKeyer>) -> Self {
        self.keyer = keyer;
        self
    }

    pub fn with_participant_resolution(mut self, resolution: ParticipantResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn EventLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn build(self) -> StatsService {
        StatsService {
            tournaments: self.tournaments,
            calculator: DeltaCalculator::new(self.keyer, ParticipantIndexer::new(self.resolution)),
            merger: AggregateMerger::new(self.buckets)
                .with_max_retries(self.max_retries)
                .with_backoff(self.backoff),
            ledger: self.ledger,
        }
    }
}
