pub mod models;

pub use models::{parse_score, GameMutation, GameRecord, MutationKind};
