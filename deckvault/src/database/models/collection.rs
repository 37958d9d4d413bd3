//! Owned card quantities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;
use crate::database::schema::EntityKind;

/// Physical condition of owned copies.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CardCondition {
    Mint,
    #[default]
    NearMint,
    LightlyPlayed,
    ModeratelyPlayed,
    HeavilyPlayed,
    Damaged,
}

/// One card in a user's collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    pub user_id: String,
    pub card_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub foil_quantity: u32,
    #[serde(default)]
    pub condition: CardCondition,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_language() -> String {
    "en".to_string()
}

impl CollectionEntry {
    pub fn new(user_id: impl Into<String>, card_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            user_id: user_id.into(),
            card_id: card_id.into(),
            quantity,
            foil_quantity: 0,
            condition: CardCondition::default(),
            language: default_language(),
            card_name: None,
            set_code: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Regular plus foil copies.
    pub fn total_copies(&self) -> u32 {
        self.quantity.saturating_add(self.foil_quantity)
    }
}

impl Entity for CollectionEntry {
    const KIND: EntityKind = EntityKind::Collections;
}
