mod indexer;
pub mod models;
pub mod repository;

pub use indexer::{ParticipantIndexer, ParticipantResolution};
pub use models::{Participant, ParticipantKey, Tournament};
pub use repository::{InMemoryTournamentRepository, PostgresTournamentRepository, TournamentLookup};
