use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::tournament::ParticipantKey;

/// Snapshot of a game document as delivered by the mutation trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tournament_id: Option<String>,
    pub date_time: DateTime<Utc>,
    /// Raw score per participant key; values are parsed leniently
    #[serde(default, deserialize_with = "scores_from_map_or_list")]
    pub scores: BTreeMap<ParticipantKey, Value>,
    #[serde(default, alias = "winnerIndex")]
    pub winner_key: Option<ParticipantKey>,
}

impl GameRecord {
    pub fn new(
        id: impl Into<String>,
        tournament_id: impl Into<String>,
        date_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            tournament_id: Some(tournament_id.into()),
            date_time,
            scores: BTreeMap::new(),
            winner_key: None,
        }
    }

    pub fn with_score(mut self, key: impl Into<ParticipantKey>, score: impl Into<Value>) -> Self {
        self.scores.insert(key.into(), score.into());
        self
    }

    pub fn with_winner(mut self, key: impl Into<ParticipantKey>) -> Self {
        self.winner_key = Some(key.into());
        self
    }
}

/// Scores arrive either as an object keyed by participant or as a positional list
fn scores_from_map_or_list<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<ParticipantKey, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ScoresRepr {
        Map(BTreeMap<ParticipantKey, Value>),
        List(Vec<Value>),
    }

    Ok(match Option::<ScoresRepr>::deserialize(deserializer)? {
        Some(ScoresRepr::Map(map)) => map,
        Some(ScoresRepr::List(list)) => list
            .into_iter()
            .enumerate()
            .map(|(index, value)| (ParticipantKey::Index(index), value))
            .collect(),
        None => BTreeMap::new(),
    })
}

/// Parses a raw score value, `None` when it is not a number in any form.
///
/// Numbers truncate toward zero. Strings contribute their leading integer:
/// `"12abc"` is 12, `"3.5"` is 3, `"1e3"` is 1. Out-of-range values saturate.
pub fn parse_score(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().map(|_| i64::MAX))
            .or_else(|| number.as_f64().map(|f| f.trunc() as i64)),
        Value::String(text) => leading_integer(text),
        _ => None,
    }
}

/// Optional sign followed by at least one decimal digit, after leading whitespace
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut value: i64 = 0;
    let mut seen_digit = false;
    for digit in digits.bytes().map_while(|b| (b as char).to_digit(10)) {
        seen_digit = true;
        let digit = i64::from(digit);
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    seen_digit.then_some(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
    Empty,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Created => "created",
            MutationKind::Updated => "updated",
            MutationKind::Deleted => "deleted",
            MutationKind::Empty => "empty",
        }
    }
}

/// Inbound create/update/delete notification for one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMutation {
    /// Delivery id; redeliveries of the same mutation carry the same id
    #[serde(default)]
    pub event_id: Option<Uuid>,
    pub game_id: String,
    #[serde(default)]
    pub tournament_id: Option<String>,
    #[serde(default)]
    pub previous_snapshot: Option<GameRecord>,
    #[serde(default)]
    pub new_snapshot: Option<GameRecord>,
}

impl GameMutation {
    pub fn created(game: GameRecord) -> Self {
        Self::from_snapshots(None, Some(game))
    }

    pub fn updated(previous: GameRecord, current: GameRecord) -> Self {
        Self::from_snapshots(Some(previous), Some(current))
    }

    pub fn deleted(previous: GameRecord) -> Self {
        Self::from_snapshots(Some(previous), None)
    }

    fn from_snapshots(previous: Option<GameRecord>, current: Option<GameRecord>) -> Self {
        let game_id = current
            .as_ref()
            .or(previous.as_ref())
            .map(|game| game.id.clone())
            .unwrap_or_default();
        Self {
            event_id: None,
            game_id,
            tournament_id: None,
            previous_snapshot: previous,
            new_snapshot: current,
        }
    }

    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn kind(&self) -> MutationKind {
        match (&self.previous_snapshot, &self.new_snapshot) {
            (None, Some(_)) => MutationKind::Created,
            (Some(_), Some(_)) => MutationKind::Updated,
            (Some(_), None) => MutationKind::Deleted,
            (None, None) => MutationKind::Empty,
        }
    }

    /// Explicit tournament id, else the new snapshot's, else the previous one's
    pub fn tournament_id(&self) -> Option<&str> {
        self.tournament_id
            .as_deref()
            .or_else(|| {
                self.new_snapshot
                    .as_ref()
                    .and_then(|game| game.tournament_id.as_deref())
            })
            .or_else(|| {
                self.previous_snapshot
                    .as_ref()
                    .and_then(|game| game.tournament_id.as_deref())
            })
            .filter(|id| !id.is_empty())
    }

    /// Both snapshots name a tournament and they differ
    pub fn is_reassignment(&self) -> bool {
        if self.tournament_id.is_some() {
            return false;
        }
        match (&self.previous_snapshot, &self.new_snapshot) {
            (Some(previous), Some(current)) => match (&previous.tournament_id, &current.tournament_id) {
                (Some(old), Some(new)) => old != new,
                _ => false,
            },
            _ => false,
        }
    }
}
