use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Game mutation carries no tournament id")]
    MissingTournamentId,

    #[error("Tournament not found: {0}")]
    TournamentNotFound(String),

    #[error("Participant {key} not found in tournament {tournament_id}")]
    ParticipantNotFound { tournament_id: String, key: String },

    #[error("Concurrent write on bucket {tournament_id}/{period}")]
    StoreConflict { tournament_id: String, period: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl StatsError {
    /// Whether the merge should be retried against a freshly read bucket
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatsError::StoreConflict { .. })
    }

    /// Existence-level errors turn the whole mutation into a clean no-op
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            StatsError::MissingTournamentId | StatsError::TournamentNotFound(_)
        )
    }

    pub fn conflict(tournament_id: &str, period: impl ToString) -> Self {
        StatsError::StoreConflict {
            tournament_id: tournament_id.to_string(),
            period: period.to_string(),
        }
    }
}

/// Maps a sqlx failure onto the store taxonomy.
///
/// Serialization failures and deadlocks are reported as conflicts so the
/// merger retries them; everything else is fatal for the current mutation.
pub(crate) fn classify_sqlx(err: sqlx::Error, tournament_id: &str, period: &str) -> StatsError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            if code == "40001" || code == "40P01" {
                return StatsError::conflict(tournament_id, period);
            }
        }
    }
    StatsError::StoreUnavailable(err.to_string())
}
