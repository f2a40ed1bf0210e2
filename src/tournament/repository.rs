use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::models::{Participant, Tournament};
use crate::stats::StatsError;

/// Read-only access to tournament metadata
#[async_trait]
pub trait TournamentLookup: Send + Sync {
    async fn get(&self, tournament_id: &str) -> Result<Option<Tournament>, StatsError>;
}

/// In-memory tournament store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryTournamentRepository {
    tournaments: Arc<RwLock<HashMap<String, Tournament>>>,
}

impl InMemoryTournamentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tournaments(tournaments: Vec<Tournament>) -> Self {
        let map = tournaments
            .into_iter()
            .map(|tournament| (tournament.id.clone(), tournament))
            .collect();
        Self {
            tournaments: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, tournament: Tournament) {
        self.tournaments
            .write()
            .await
            .insert(tournament.id.clone(), tournament);
    }
}

#[async_trait]
impl TournamentLookup for InMemoryTournamentRepository {
    #[instrument(skip(self))]
    async fn get(&self, tournament_id: &str) -> Result<Option<Tournament>, StatsError> {
        let tournament = self.tournaments.read().await.get(tournament_id).cloned();
        if tournament.is_none() {
            debug!(tournament_id = %tournament_id, "Tournament not found in memory");
        }
        Ok(tournament)
    }
}

pub const TOURNAMENT_SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS tournaments (id TEXT PRIMARY KEY)",
    "CREATE TABLE IF NOT EXISTS tournament_participants (
        tournament_id TEXT NOT NULL REFERENCES tournaments(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        name TEXT NOT NULL,
        stable_id TEXT,
        PRIMARY KEY (tournament_id, position)
    )",
];

/// PostgreSQL-backed tournament lookup
pub struct PostgresTournamentRepository {
    pool: PgPool,
}

impl PostgresTournamentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StatsError> {
        for statement in TOURNAMENT_SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StatsError::StoreUnavailable(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl TournamentLookup for PostgresTournamentRepository {
    #[instrument(skip(self))]
    async fn get(&self, tournament_id: &str) -> Result<Option<Tournament>, StatsError> {
        let exists = sqlx::query("SELECT id FROM tournaments WHERE id = $1")
            .bind(tournament_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, tournament_id = %tournament_id, "Failed to fetch tournament");
                StatsError::StoreUnavailable(e.to_string())
            })?;

        if exists.is_none() {
            debug!(tournament_id = %tournament_id, "Tournament not found in database");
            return Ok(None);
        }

        let rows = sqlx::query(
            "SELECT name, stable_id FROM tournament_participants WHERE tournament_id = $1 ORDER BY position",
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, tournament_id = %tournament_id, "Failed to fetch participants");
            StatsError::StoreUnavailable(e.to_string())
        })?;

        let participants = rows
            .into_iter()
            .map(|row| Participant {
                name: row.get("name"),
                id: row.get("stable_id"),
            })
            .collect::<Vec<_>>();

        debug!(
            tournament_id = %tournament_id,
            participant_count = participants.len(),
            "Tournament loaded from database"
        );
        Ok(Some(Tournament::new(tournament_id, participants)))
    }
}
