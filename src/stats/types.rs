use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AggregateBucket, PeriodKey};

/// Response for a single bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketResponse {
    pub tournament_id: String,
    pub period: PeriodKey,
    pub scores: BTreeMap<usize, i64>,
    pub wins: BTreeMap<usize, i64>,
}

impl BucketResponse {
    pub fn new(tournament_id: String, period: PeriodKey, bucket: AggregateBucket) -> Self {
        Self {
            tournament_id,
            period,
            scores: bucket.scores,
            wins: bucket.wins,
        }
    }
}

/// Response listing every bucket of one tournament, ordered by period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentBucketsResponse {
    pub tournament_id: String,
    pub period_keyer: String,
    pub buckets: BTreeMap<PeriodKey, AggregateBucket>,
}
