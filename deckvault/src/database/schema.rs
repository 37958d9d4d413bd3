//! Static record schemas.
//!
//! Every collection has exactly one [`EntitySchema`] describing its table,
//! key shape, secondary lookups and required fields. Records are checked
//! against it before any I/O.

use serde_json::{Map, Value};
use thiserror::Error;

/// A stored record: a JSON object of named fields.
pub type Record = Map<String, Value>;

pub const FIELD_ID: &str = "id";
pub const FIELD_USER_ID: &str = "userId";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// Named record collections.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Users,
    Collections,
    Decks,
    Favorites,
}

impl EntityKind {
    pub fn schema(self) -> &'static EntitySchema {
        match self {
            Self::Users => &USERS,
            Self::Collections => &COLLECTIONS,
            Self::Decks => &DECKS,
            Self::Favorites => &FAVORITES,
        }
    }
}

/// Partition key plus optional sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyShape {
    pub partition: &'static str,
    pub sort: Option<&'static str>,
}

impl KeyShape {
    pub fn fields(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.partition).chain(self.sort)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields().any(|f| f == field)
    }

    /// Single `id` key, generated on create when absent.
    pub fn is_generated_id(&self) -> bool {
        self.partition == FIELD_ID && self.sort.is_none()
    }
}

/// A field that can be queried by equality besides the partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub field: &'static str,
    /// Secondary index serving the lookup, if the backend needs one.
    pub index: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub default_table: &'static str,
    pub key: KeyShape,
    pub lookups: &'static [Lookup],
    pub required: &'static [&'static str],
    /// Field naming the owning user.
    pub owner_field: &'static str,
}

static USERS: EntitySchema = EntitySchema {
    kind: EntityKind::Users,
    default_table: "mtg-users",
    key: KeyShape {
        partition: FIELD_ID,
        sort: None,
    },
    lookups: &[Lookup {
        field: "email",
        index: Some("email-index"),
    }],
    required: &[FIELD_ID, "email"],
    owner_field: FIELD_ID,
};

static COLLECTIONS: EntitySchema = EntitySchema {
    kind: EntityKind::Collections,
    default_table: "mtg-collections",
    key: KeyShape {
        partition: FIELD_USER_ID,
        sort: Some("cardId"),
    },
    lookups: &[],
    required: &[FIELD_USER_ID, "cardId", "quantity"],
    owner_field: FIELD_USER_ID,
};

static DECKS: EntitySchema = EntitySchema {
    kind: EntityKind::Decks,
    default_table: "mtg-decks",
    key: KeyShape {
        partition: FIELD_ID,
        sort: None,
    },
    lookups: &[Lookup {
        field: FIELD_USER_ID,
        index: Some("userId-index"),
    }],
    required: &[FIELD_ID, FIELD_USER_ID, "name"],
    owner_field: FIELD_USER_ID,
};

static FAVORITES: EntitySchema = EntitySchema {
    kind: EntityKind::Favorites,
    default_table: "mtg-favorites",
    key: KeyShape {
        partition: FIELD_USER_ID,
        sort: Some("cardId"),
    },
    lookups: &[],
    required: &[FIELD_USER_ID, "cardId"],
    owner_field: FIELD_USER_ID,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("{kind}: record must be a JSON object")]
    NotAnObject { kind: EntityKind },

    #[error("{kind}: missing required field '{field}'")]
    MissingField { kind: EntityKind, field: String },

    #[error("{kind}: invalid key field '{field}': {reason}")]
    InvalidKey {
        kind: EntityKind,
        field: String,
        reason: String,
    },

    #[error("{kind}: unexpected key field '{field}'")]
    UnexpectedKeyField { kind: EntityKind, field: String },

    #[error("{kind}: '{field}' is not a queryable key")]
    UnknownLookup { kind: EntityKind, field: String },

    #[error("{kind}: update contains no changes")]
    EmptyUpdate { kind: EntityKind },
}

/// One component of a record key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPart {
    pub name: String,
    pub value: Value,
}

impl KeyPart {
    /// Canonical text form, used by backends that store keys as strings.
    pub fn as_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A validated primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordKey {
    pub partition: KeyPart,
    pub sort: Option<KeyPart>,
}

impl RecordKey {
    pub fn parts(&self) -> impl Iterator<Item = &KeyPart> {
        std::iter::once(&self.partition).chain(self.sort.as_ref())
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for part in self.parts() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}={}", part.name, part.as_text())?;
            first = false;
        }
        Ok(())
    }
}

pub(crate) fn check_key_value(kind: EntityKind, field: &str, value: &Value) -> Result<(), SchemaError> {
    let reason = match value {
        Value::String(s) if s.trim().is_empty() => "must not be empty",
        Value::String(_) | Value::Number(_) => return Ok(()),
        _ => "must be a string or number",
    };
    Err(SchemaError::InvalidKey {
        kind,
        field: field.to_string(),
        reason: reason.to_string(),
    })
}

impl EntitySchema {
    /// Accept a JSON value as a record of this collection.
    pub fn record_from(&self, value: Value) -> Result<Record, SchemaError> {
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(SchemaError::NotAnObject { kind: self.kind }),
        }
    }

    /// Extract and validate the key from a full record.
    pub fn key_of(&self, record: &Record) -> Result<RecordKey, SchemaError> {
        let part = |field: &'static str| -> Result<KeyPart, SchemaError> {
            let value = record.get(field).ok_or_else(|| SchemaError::MissingField {
                kind: self.kind,
                field: field.to_string(),
            })?;
            check_key_value(self.kind, field, value)?;
            Ok(KeyPart {
                name: field.to_string(),
                value: value.clone(),
            })
        };

        Ok(RecordKey {
            partition: part(self.key.partition)?,
            sort: self.key.sort.map(part).transpose()?,
        })
    }

    /// Validate a caller-supplied key: exactly the key fields, nothing else.
    pub fn key_from(&self, key: &Record) -> Result<RecordKey, SchemaError> {
        if let Some(extra) = key.keys().find(|field| !self.key.contains(field)) {
            return Err(SchemaError::UnexpectedKeyField {
                kind: self.kind,
                field: extra.clone(),
            });
        }
        self.key_of(key)
    }

    /// Check that every required field is present and non-null, and that the key is valid.
    pub fn validate(&self, record: &Record) -> Result<RecordKey, SchemaError> {
        for field in self.required {
            if record.get(*field).is_none_or(Value::is_null) {
                return Err(SchemaError::MissingField {
                    kind: self.kind,
                    field: (*field).to_string(),
                });
            }
        }
        self.key_of(record)
    }

    /// Resolve a query key: the partition key, or a declared lookup.
    ///
    /// Returns the index to query, `None` for the table's own partition key.
    pub fn lookup_index(&self, field: &str) -> Result<Option<&'static str>, SchemaError> {
        if field == self.key.partition {
            return Ok(None);
        }
        self.lookups
            .iter()
            .find(|lookup| lookup.field == field)
            .map(|lookup| lookup.index)
            .ok_or_else(|| SchemaError::UnknownLookup {
                kind: self.kind,
                field: field.to_string(),
            })
    }

    /// Fields an update must never touch.
    pub fn is_immutable(&self, field: &str) -> bool {
        field == FIELD_ID || field == FIELD_CREATED_AT || self.key.contains(field)
    }
}

/// Table name per collection, overridable through configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub users: String,
    pub collections: String,
    pub decks: String,
    pub favorites: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            users: USERS.default_table.to_string(),
            collections: COLLECTIONS.default_table.to_string(),
            decks: DECKS.default_table.to_string(),
            favorites: FAVORITES.default_table.to_string(),
        }
    }
}

impl TableNames {
    pub fn get(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Users => &self.users,
            EntityKind::Collections => &self.collections,
            EntityKind::Decks => &self.decks,
            EntityKind::Favorites => &self.favorites,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, &str)> {
        use strum::IntoEnumIterator;
        EntityKind::iter().map(move |kind| (kind, self.get(kind)))
    }
}
