use std::str::FromStr;

use super::models::{ParticipantKey, Tournament};
use crate::stats::StatsError;

/// Deployment-wide rule for turning a participant key into a bucket index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticipantResolution {
    /// The key already is the position in `participants`
    #[default]
    Positional,
    /// The key is matched against participant names
    ByName,
    /// The key is matched against stable participant ids
    ByStableId,
}

impl FromStr for ParticipantResolution {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positional" | "index" => Ok(Self::Positional),
            "name" | "by-name" => Ok(Self::ByName),
            "stable-id" | "id" => Ok(Self::ByStableId),
            other => Err(format!("unknown participant resolution '{}'", other)),
        }
    }
}

/// Resolves participant keys to stable indices within a tournament
#[derive(Debug, Clone, Copy, Default)]
pub struct ParticipantIndexer {
    resolution: ParticipantResolution,
}

impl ParticipantIndexer {
    pub fn new(resolution: ParticipantResolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> ParticipantResolution {
        self.resolution
    }

    pub fn index_of(
        &self,
        tournament: &Tournament,
        key: &ParticipantKey,
    ) -> Result<usize, StatsError> {
        let found = match self.resolution {
            ParticipantResolution::Positional => {
                let position = match key {
                    ParticipantKey::Index(index) => Some(*index),
                    ParticipantKey::Label(label) => label.trim().parse::<usize>().ok(),
                };
                position.filter(|index| *index < tournament.participants.len())
            }
            ParticipantResolution::ByName => {
                let label = key.to_string();
                tournament
                    .participants
                    .iter()
                    .position(|participant| participant.name == label)
            }
            ParticipantResolution::ByStableId => {
                let label = key.to_string();
                tournament
                    .participants
                    .iter()
                    .position(|participant| participant.id.as_deref() == Some(label.as_str()))
            }
        };

        found.ok_or_else(|| StatsError::ParticipantNotFound {
            tournament_id: tournament.id.clone(),
            key: key.to_string(),
        })
    }
}
