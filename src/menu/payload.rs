use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::recipes::Recipe;

pub const MEAL_SCHEMA_VERSION: u16 = 1;

fn current_schema() -> u16 {
    MEAL_SCHEMA_VERSION
}

/// One day-slot node as stored in the tree store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPayload {
    #[serde(default = "current_schema")]
    pub v: u16,
    pub main: String,
    #[serde(default)]
    pub main_ingredients: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub url_image: String,
    #[serde(default)]
    pub id_image: i32,
    #[serde(default)]
    pub is_vegetarian: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_ingredients: Option<String>,
}

/// Day-slot key ("0", "1", ...) to payload, ready to merge into the tree store.
pub type WeekPatch = BTreeMap<String, MealPayload>;

impl MealPayload {
    pub fn from_recipes(server_id: u64, main: &Recipe, side: Option<&Recipe>) -> Self {
        Self {
            v: MEAL_SCHEMA_VERSION,
            main: main.title.clone(),
            main_ingredients: main.ingredients.clone(),
            link: Some(main.link.clone()).filter(|l| !l.is_empty()),
            url_image: main.url_image.clone(),
            id_image: main.id_image,
            is_vegetarian: main.is_vegetarian,
            server_id: Some(server_id),
            side: side.map(|s| s.title.clone()),
            side_ingredients: side.map(|s| s.ingredients.clone()),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.v <= MEAL_SCHEMA_VERSION
    }
}
