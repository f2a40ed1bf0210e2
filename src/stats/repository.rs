use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::errors::classify_sqlx;
use super::{AggregateBucket, ParticipantDelta, PeriodKey, StatsError};

/// Storage boundary for aggregate buckets.
///
/// `merge_deltas` must behave as an atomic per-field increment of the touched
/// indices of one bucket: concurrent callers on other periods, or on other
/// indices of the same period, must never lose each other's writes. Adapters
/// that cannot increment atomically report `StatsError::StoreConflict` and the
/// merger retries.
#[async_trait]
pub trait BucketStore: Send + Sync {
    async fn merge_deltas(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
        deltas: &[ParticipantDelta],
        clamp_to_zero: bool,
    ) -> Result<(), StatsError>;

    async fn get_bucket(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<Option<AggregateBucket>, StatsError>;

    async fn buckets_for(
        &self,
        tournament_id: &str,
    ) -> Result<BTreeMap<PeriodKey, AggregateBucket>, StatsError>;
}

/// In-memory bucket store; merges run under the write lock so each one is atomic
#[derive(Debug, Default)]
pub struct InMemoryBucketStore {
    tournaments: Arc<RwLock<HashMap<String, BTreeMap<PeriodKey, AggregateBucket>>>>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a bucket directly, bypassing merge semantics
    pub async fn put_bucket(&self, tournament_id: &str, period: PeriodKey, bucket: AggregateBucket) {
        self.tournaments
            .write()
            .await
            .entry(tournament_id.to_string())
            .or_default()
            .insert(period, bucket);
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    #[instrument(skip(self, deltas), fields(period = %period, touched = deltas.len()))]
    async fn merge_deltas(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
        deltas: &[ParticipantDelta],
        clamp_to_zero: bool,
    ) -> Result<(), StatsError> {
        let mut tournaments = self.tournaments.write().await;
        let bucket = tournaments
            .entry(tournament_id.to_string())
            .or_default()
            .entry(period.clone())
            .or_default();
        bucket.apply(deltas, clamp_to_zero);

        debug!(tournament_id = %tournament_id, "Bucket merged in memory");
        Ok(())
    }

    async fn get_bucket(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<Option<AggregateBucket>, StatsError> {
        let tournaments = self.tournaments.read().await;
        Ok(tournaments
            .get(tournament_id)
            .and_then(|periods| periods.get(period))
            .cloned())
    }

    async fn buckets_for(
        &self,
        tournament_id: &str,
    ) -> Result<BTreeMap<PeriodKey, AggregateBucket>, StatsError> {
        let tournaments = self.tournaments.read().await;
        Ok(tournaments.get(tournament_id).cloned().unwrap_or_default())
    }
}

pub const BUCKET_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS period_buckets (
    tournament_id TEXT NOT NULL,
    period_key TEXT NOT NULL,
    participant_index INTEGER NOT NULL,
    score BIGINT NOT NULL DEFAULT 0,
    wins BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (tournament_id, period_key, participant_index)
)";

const MERGE_SQL: &str = "INSERT INTO period_buckets (tournament_id, period_key, participant_index, score, wins)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (tournament_id, period_key, participant_index) DO UPDATE SET
        score = CASE WHEN $6 THEN GREATEST(period_buckets.score + $7, 0) ELSE period_buckets.score + $7 END,
        wins = CASE WHEN $6 THEN GREATEST(period_buckets.wins + $8, 0) ELSE period_buckets.wins + $8 END";

/// PostgreSQL bucket store.
///
/// One row per (tournament, period, participant). Merges are row-level
/// `score = score + delta` upserts inside a transaction, so concurrent merges
/// never read-then-overwrite each other.
pub struct PostgresBucketStore {
    pool: PgPool,
}

impl PostgresBucketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StatsError> {
        sqlx::query(BUCKET_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StatsError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    fn rows_to_buckets(rows: Vec<sqlx::postgres::PgRow>) -> BTreeMap<PeriodKey, AggregateBucket> {
        let mut buckets: BTreeMap<PeriodKey, AggregateBucket> = BTreeMap::new();
        for row in rows {
            let period = PeriodKey::new(row.get::<String, _>("period_key"));
            let index = row.get::<i32, _>("participant_index") as usize;
            let bucket = buckets.entry(period).or_default();
            bucket.scores.insert(index, row.get("score"));
            bucket.wins.insert(index, row.get("wins"));
        }
        buckets
    }
}

#[async_trait]
impl BucketStore for PostgresBucketStore {
    #[instrument(skip(self, deltas), fields(period = %period, touched = deltas.len()))]
    async fn merge_deltas(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
        deltas: &[ParticipantDelta],
        clamp_to_zero: bool,
    ) -> Result<(), StatsError> {
        let fail = |e: sqlx::Error| {
            warn!(error = %e, tournament_id = %tournament_id, "Failed to merge bucket in database");
            classify_sqlx(e, tournament_id, period.as_str())
        };

        let mut tx = self.pool.begin().await.map_err(fail)?;
        for delta in deltas {
            let index = i32::try_from(delta.index).map_err(|_| {
                StatsError::Validation(format!("participant index {} out of range", delta.index))
            })?;
            let (initial_score, initial_wins) = if clamp_to_zero {
                (delta.score.max(0), delta.wins.max(0))
            } else {
                (delta.score, delta.wins)
            };

            sqlx::query(MERGE_SQL)
                .bind(tournament_id)
                .bind(period.as_str())
                .bind(index)
                .bind(initial_score)
                .bind(initial_wins)
                .bind(clamp_to_zero)
                .bind(delta.score)
                .bind(delta.wins)
                .execute(&mut *tx)
                .await
                .map_err(fail)?;
        }
        tx.commit().await.map_err(fail)?;

        debug!(tournament_id = %tournament_id, "Bucket merged in database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_bucket(
        &self,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<Option<AggregateBucket>, StatsError> {
        let rows = sqlx::query(
            "SELECT period_key, participant_index, score, wins FROM period_buckets
             WHERE tournament_id = $1 AND period_key = $2 ORDER BY participant_index",
        )
        .bind(tournament_id)
        .bind(period.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, tournament_id = %tournament_id, "Failed to fetch bucket");
            StatsError::StoreUnavailable(e.to_string())
        })?;

        Ok(Self::rows_to_buckets(rows).remove(period))
    }

    #[instrument(skip(self))]
    async fn buckets_for(
        &self,
        tournament_id: &str,
    ) -> Result<BTreeMap<PeriodKey, AggregateBucket>, StatsError> {
        let rows = sqlx::query(
            "SELECT period_key, participant_index, score, wins FROM period_buckets
             WHERE tournament_id = $1 ORDER BY period_key, participant_index",
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, tournament_id = %tournament_id, "Failed to fetch buckets");
            StatsError::StoreUnavailable(e.to_string())
        })?;

        Ok(Self::rows_to_buckets(rows))
    }
}
