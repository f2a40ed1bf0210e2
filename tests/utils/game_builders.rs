use chrono::{DateTime, Utc};
use serde_json::Value;

use tournament_tally::{GameRecord, ParticipantKey};

// ============================================================================
// Game Record Utilities
// ============================================================================

pub fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("test timestamps are RFC 3339")
        .with_timezone(&Utc)
}

pub struct GameBuilder {
    record: GameRecord,
}

impl GameBuilder {
    pub fn new(game_id: &str) -> Self {
        Self {
            record: GameRecord::new(game_id, "tournament-1", at("2024-03-01T10:00:00Z")),
        }
    }

    pub fn in_tournament(mut self, tournament_id: &str) -> Self {
        self.record.tournament_id = Some(tournament_id.to_string());
        self
    }

    pub fn at(mut self, raw: &str) -> Self {
        self.record.date_time = at(raw);
        self
    }

    pub fn score(mut self, key: impl Into<ParticipantKey>, score: impl Into<Value>) -> Self {
        self.record.scores.insert(key.into(), score.into());
        self
    }

    pub fn winner(mut self, key: impl Into<ParticipantKey>) -> Self {
        self.record.winner_key = Some(key.into());
        self
    }

    pub fn build(self) -> GameRecord {
        self.record
    }
}
