// Library crate for the tournament tally service
// This file exposes the public API for the binary and integration tests

pub mod app;
pub mod config;
pub mod game;
pub mod shared;
pub mod stats;
pub mod tournament;

// Re-export commonly used types for easier access in tests
pub use app::router;
pub use config::Config;
pub use game::{GameMutation, GameRecord};
pub use shared::{AppError, AppState};
pub use stats::{AggregateBucket, BucketStore, MutationOutcome, PeriodKey, StatsError, StatsService};
pub use tournament::{Participant, ParticipantKey, Tournament, TournamentLookup};
