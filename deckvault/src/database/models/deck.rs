//! Deck model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;
use crate::database::schema::EntityKind;

/// Which part of the deck a card belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Board {
    #[default]
    Main,
    Sideboard,
    Commander,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckCard {
    pub card_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub board: Board,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub cards: Vec<DeckCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Deck {
    /// New deck with no id; one is assigned on create.
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            name: name.into(),
            format: None,
            description: None,
            cards: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Add copies of a card, merging with an existing entry on the same board.
    pub fn add_card(&mut self, card_id: impl Into<String>, quantity: u32, board: Board) {
        let card_id = card_id.into();
        match self
            .cards
            .iter_mut()
            .find(|card| card.card_id == card_id && card.board == board)
        {
            Some(card) => card.quantity = card.quantity.saturating_add(quantity),
            None => self.cards.push(DeckCard {
                card_id,
                quantity,
                board,
            }),
        }
    }

    /// Number of cards on `board`.
    pub fn card_count(&self, board: Board) -> u32 {
        self.cards
            .iter()
            .filter(|card| card.board == board)
            .fold(0u32, |acc, card| acc.saturating_add(card.quantity))
    }
}

impl Entity for Deck {
    const KIND: EntityKind = EntityKind::Decks;
}
