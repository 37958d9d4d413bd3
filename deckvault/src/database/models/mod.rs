//! Typed records.
//!
//! Each model serializes to the camelCase record layout its collection
//! stores, so the façade can validate and stamp it like any other record.

pub mod collection;
pub mod deck;
pub mod favorite;
pub mod user;

pub use collection::{CardCondition, CollectionEntry};
pub use deck::{Board, Deck, DeckCard};
pub use favorite::Favorite;
pub use user::UserProfile;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::schema::{EntityKind, Record};

/// A model stored in one of the named collections.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;

    fn to_record(&self) -> Result<Record, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "{} must serialize to an object, got {other}",
                Self::KIND
            ))),
        }
    }

    fn from_record(record: Record) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(record))
    }
}
