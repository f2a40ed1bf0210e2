use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, instrument};

use super::{
    types::{BucketResponse, TournamentBucketsResponse},
    MutationOutcome, PeriodKey,
};
use crate::game::GameMutation;
use crate::shared::{AppError, AppState};

/// HTTP handler receiving game mutations from the trigger mechanism
///
/// POST /mutations
/// Store conflicts and outages map to 409/503 so the sender redelivers
#[instrument(name = "post_mutation", skip(state, mutation), fields(game_id = %mutation.game_id))]
pub async fn post_mutation(
    State(state): State<AppState>,
    Json(mutation): Json<GameMutation>,
) -> Result<Json<MutationOutcome>, AppError> {
    let outcome = state.stats_service.process_mutation(&mutation).await?;
    Ok(Json(outcome))
}

/// HTTP handler listing all buckets of a tournament
///
/// GET /tournaments/:tournament_id/buckets
#[instrument(name = "list_buckets", skip(state))]
pub async fn list_buckets(
    State(state): State<AppState>,
    Path(tournament_id): Path<String>,
) -> Result<Json<TournamentBucketsResponse>, AppError> {
    let buckets = state.stats_service.buckets_for(&tournament_id).await?;
    info!(bucket_count = buckets.len(), "Buckets listed");

    Ok(Json(TournamentBucketsResponse {
        tournament_id,
        period_keyer: state.stats_service.period_keyer().name().to_string(),
        buckets,
    }))
}

/// HTTP handler for one bucket
///
/// GET /tournaments/:tournament_id/buckets/:period
#[instrument(name = "get_bucket", skip(state))]
pub async fn get_bucket(
    State(state): State<AppState>,
    Path((tournament_id, period)): Path<(String, String)>,
) -> Result<Json<BucketResponse>, AppError> {
    let period = PeriodKey::new(period);
    let bucket = state
        .stats_service
        .get_bucket(&tournament_id, &period)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("No bucket for {} in {}", tournament_id, period))
        })?;

    Ok(Json(BucketResponse::new(tournament_id, period, bucket)))
}
