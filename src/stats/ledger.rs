use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{PeriodKey, StatsError};

/// Claims (event, tournament, period) merges so a redelivered mutation does
/// not double-count.
///
/// `try_claim` must be an atomic insert-if-absent: of any number of concurrent
/// callers with the same triple, exactly one gets `true`. A claim whose merge
/// fails is released so the redelivery can apply it.
#[async_trait]
pub trait EventLedger: Send + Sync {
    async fn try_claim(
        &self,
        event_id: Uuid,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<bool, StatsError>;

    async fn release(
        &self,
        event_id: Uuid,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<(), StatsError>;
}

type LedgerEntry = (Uuid, String, PeriodKey);

#[derive(Debug, Default)]
pub struct InMemoryEventLedger {
    applied: Arc<RwLock<HashSet<LedgerEntry>>>,
}

impl InMemoryEventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.applied.read().await.len()
    }
}

#[async_trait]
impl EventLedger for InMemoryEventLedger {
    async fn try_claim(
        &self,
        event_id: Uuid,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<bool, StatsError> {
        Ok(self
            .applied
            .write()
            .await
            .insert((event_id, tournament_id.to_string(), period.clone())))
    }

    async fn release(
        &self,
        event_id: Uuid,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<(), StatsError> {
        self.applied
            .write()
            .await
            .remove(&(event_id, tournament_id.to_string(), period.clone()));
        Ok(())
    }
}

pub const LEDGER_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS applied_mutations (
    event_id UUID NOT NULL,
    tournament_id TEXT NOT NULL,
    period_key TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (event_id, tournament_id, period_key)
)";

pub struct PostgresEventLedger {
    pool: PgPool,
}

impl PostgresEventLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StatsError> {
        sqlx::query(LEDGER_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StatsError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl EventLedger for PostgresEventLedger {
    #[instrument(skip(self))]
    async fn try_claim(
        &self,
        event_id: Uuid,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<bool, StatsError> {
        let result = sqlx::query(
            "INSERT INTO applied_mutations (event_id, tournament_id, period_key) VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .bind(tournament_id)
        .bind(period.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, %event_id, "Failed to claim mutation in ledger");
            StatsError::StoreUnavailable(e.to_string())
        })?;

        let claimed = result.rows_affected() == 1;
        debug!(%event_id, tournament_id = %tournament_id, claimed, "Ledger claim attempted");
        Ok(claimed)
    }

    #[instrument(skip(self))]
    async fn release(
        &self,
        event_id: Uuid,
        tournament_id: &str,
        period: &PeriodKey,
    ) -> Result<(), StatsError> {
        sqlx::query(
            "DELETE FROM applied_mutations WHERE event_id = $1 AND tournament_id = $2 AND period_key = $3",
        )
        .bind(event_id)
        .bind(tournament_id)
        .bind(period.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, %event_id, "Failed to release ledger claim");
            StatsError::StoreUnavailable(e.to_string())
        })?;
        Ok(())
    }
}
