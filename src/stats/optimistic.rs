use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{AggregateBucket, BucketStore, ParticipantDelta, PeriodKey, StatsError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedBucket {
    pub bucket: AggregateBucket,
    pub version: u64,
}

/// Document-style storage without field-level increments.
///
/// Writers follow compare-and-retry: read a versioned bucket, compute the new
/// values, then write only if the version is still the one that was read.
#[async_trait]
pub trait VersionedBucketBackend: Send + Sync {
    async fn load(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<Option<VersionedBucket>, StatsError>;

    /// Writes the indices present in `touched` and bumps the version, but only
    /// if the stored version equals `expected` (`None`: bucket must not exist).
    /// Returns `false` when the version moved on.
    async fn compare_and_merge(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
        expected: Option<u64>,
        touched: &AggregateBucket,
    ) -> Result<bool, StatsError>;

    async fn load_all(
        &self,
        tournament_id: &str,
    ) -> Result<BTreeMap<PeriodKey, AggregateBucket>, StatsError>;
}

/// `BucketStore` over a versioned backend; a lost race surfaces as
/// `StatsError::StoreConflict` so the merger re-reads and retries.
pub struct OptimisticBucketStore<B> {
    backend: B,
}

impl<B: VersionedBucketBackend> OptimisticBucketStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: VersionedBucketBackend> BucketStore for OptimisticBucketStore<B> {
    #[instrument(skip(self, deltas), fields(period = %period))]
    async fn merge_deltas(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
        deltas: &[ParticipantDelta],
        clamp_to_zero: bool,
    ) -> Result<(), StatsError> {
        let current = self.backend.load(tournament_id, period).await?;
        let expected = current.as_ref().map(|versioned| versioned.version);

        let mut updated = current.map(|versioned| versioned.bucket).unwrap_or_default();
        updated.apply(deltas, clamp_to_zero);
        let touched = updated.restricted_to(deltas.iter().map(|delta| delta.index));

        if self
            .backend
            .compare_and_merge(tournament_id, period, expected, &touched)
            .await?
        {
            Ok(())
        } else {
            debug!(tournament_id = %tournament_id, ?expected, "Bucket version moved during merge");
            Err(StatsError::conflict(tournament_id, period))
        }
    }

    async fn get_bucket(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<Option<AggregateBucket>, StatsError> {
        Ok(self
            .backend
            .load(tournament_id, period)
            .await?
            .map(|versioned| versioned.bucket))
    }

    async fn buckets_for(
        &self,
        tournament_id: &str,
    ) -> Result<BTreeMap<PeriodKey, AggregateBucket>, StatsError> {
        self.backend.load_all(tournament_id).await
    }
}

/// In-memory versioned documents; reads and conditional writes take the lock
/// separately, so concurrent writers genuinely race.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVersionedBackend {
    documents: Arc<RwLock<HashMap<(String, PeriodKey), VersionedBucket>>>,
}

impl InMemoryVersionedBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionedBucketBackend for InMemoryVersionedBackend {
    async fn load(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<Option<VersionedBucket>, StatsError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&(tournament_id.to_string(), period.clone()))
            .cloned())
    }

    async fn compare_and_merge(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
        expected: Option<u64>,
        touched: &AggregateBucket,
    ) -> Result<bool, StatsError> {
        let mut documents = self.documents.write().await;
        let key = (tournament_id.to_string(), period.clone());
        let stored_version = documents.get(&key).map(|versioned| versioned.version);
        if stored_version != expected {
            return Ok(false);
        }

        let document = documents.entry(key).or_default();
        document.bucket.overlay(touched);
        document.version += 1;
        Ok(true)
    }

    async fn load_all(
        &self,
        tournament_id: &str,
    ) -> Result<BTreeMap<PeriodKey, AggregateBucket>, StatsError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|((owner, _), _)| owner == tournament_id)
            .map(|((_, period), versioned)| (period.clone(), versioned.bucket.clone()))
            .collect())
    }
}
