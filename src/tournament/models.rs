use serde::{Deserialize, Serialize};
use std::fmt;

/// Tournament metadata, read-only to the aggregation path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: String,
    pub participants: Vec<Participant>,
}

impl Tournament {
    pub fn new(id: impl Into<String>, participants: Vec<Participant>) -> Self {
        Self {
            id: id.into(),
            participants,
        }
    }

    /// Builds a tournament whose participants only carry display names
    pub fn with_names(id: impl Into<String>, names: &[&str]) -> Self {
        Self::new(id, names.iter().map(|name| Participant::named(*name)).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    /// Stable synthetic id assigned when the tournament was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Participant {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }

    pub fn with_id(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Some(id.into()),
        }
    }
}

/// How a game refers to a participant.
///
/// JSON numbers become `Index`; strings (names, stable ids, or decimal map keys
/// such as `"0"`) become `Label`. Which interpretation applies is decided by the
/// deployment's `ParticipantResolution`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParticipantKey {
    Index(usize),
    Label(String),
}

impl fmt::Display for ParticipantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantKey::Index(index) => write!(f, "{}", index),
            ParticipantKey::Label(label) => f.write_str(label),
        }
    }
}

impl From<usize> for ParticipantKey {
    fn from(index: usize) -> Self {
        ParticipantKey::Index(index)
    }
}

impl From<&str> for ParticipantKey {
    fn from(label: &str) -> Self {
        ParticipantKey::Label(label.to_string())
    }
}
