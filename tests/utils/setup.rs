use std::sync::Arc;
use std::time::Duration;

use tournament_tally::{
    stats::{
        EventLedger, InMemoryBucketStore, InMemoryEventLedger, InMemoryVersionedBackend,
        OptimisticBucketStore,
    },
    tournament::{InMemoryTournamentRepository, ParticipantResolution},
    AggregateBucket, BucketStore, GameMutation, MutationOutcome, PeriodKey, StatsService,
    Tournament,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub service: Arc<StatsService>,
    pub buckets: Arc<dyn BucketStore>,
    pub tournament_id: String,
}

impl TestSetup {
    pub async fn process(&self, mutation: GameMutation) -> MutationOutcome {
        self.service
            .process_mutation(&mutation)
            .await
            .expect("mutation should process")
    }

    /// Bucket for the default tournament, empty when never written
    pub async fn bucket(&self, period: &str) -> AggregateBucket {
        self.buckets
            .get_bucket(&self.tournament_id, &PeriodKey::new(period))
            .await
            .expect("bucket read should succeed")
            .unwrap_or_default()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Atomic,
    Optimistic,
}

pub struct TestSetupBuilder {
    tournament_id: String,
    participants: Vec<String>,
    resolution: ParticipantResolution,
    store: StoreKind,
    max_retries: u32,
    dedupe: bool,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            tournament_id: "tournament-1".to_string(),
            participants: vec![],
            resolution: ParticipantResolution::ByName,
            store: StoreKind::Atomic,
            max_retries: 3,
            dedupe: false,
        }
    }

    pub fn with_participants(mut self, names: &[&str]) -> Self {
        self.participants = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn with_ana_and_bo(self) -> Self {
        self.with_participants(&["Ana", "Bo"])
    }

    pub fn with_resolution(mut self, resolution: ParticipantResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_store(mut self, store: StoreKind) -> Self {
        self.store = store;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_dedupe(mut self) -> Self {
        self.dedupe = true;
        self
    }

    pub fn build(self) -> TestSetup {
        let names: Vec<&str> = self.participants.iter().map(String::as_str).collect();
        let tournaments = Arc::new(InMemoryTournamentRepository::with_tournaments(vec![
            Tournament::with_names(self.tournament_id.clone(), &names),
        ]));

        let buckets: Arc<dyn BucketStore> = match self.store {
            StoreKind::Atomic => Arc::new(InMemoryBucketStore::new()),
            StoreKind::Optimistic => {
                Arc::new(OptimisticBucketStore::new(InMemoryVersionedBackend::new()))
            }
        };

        let mut builder = StatsService::builder(tournaments, buckets.clone())
            .with_participant_resolution(self.resolution)
            .with_max_retries(self.max_retries)
            .with_backoff(Duration::from_millis(1));
        if self.dedupe {
            let ledger: Arc<dyn EventLedger> = Arc::new(InMemoryEventLedger::new());
            builder = builder.with_ledger(ledger);
        }

        TestSetup {
            service: Arc::new(builder.build()),
            buckets,
            tournament_id: self.tournament_id,
        }
    }
}
