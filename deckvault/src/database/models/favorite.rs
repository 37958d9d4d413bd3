//! Favourite card model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;
use crate::database::schema::EntityKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub user_id: String,
    pub card_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Favorite {
    pub fn new(user_id: impl Into<String>, card_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            card_id: card_id.into(),
            card_name: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for Favorite {
    const KIND: EntityKind = EntityKind::Favorites;
}
