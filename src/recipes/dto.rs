use std::fmt;

use serde::{Deserialize, Serialize};

/// Images bundled with the clients; `idImage` indexes into this list.
pub const IMAGE_SET: &[&str] = &[
    "hamburger",
    "salad",
    "burrito",
    "spaghetti",
    "focaccia",
    "lasagna",
    "meat",
    "pizza",
    "pasta",
    "gnocchi",
    "poke",
    "vellutata",
    "bread",
    "chicken",
    "meatballs",
    "trofie",
    "couscous",
    "caprese",
    "hummus",
    "toast",
    "bruschetta",
    "lasagne_al_pesto",
];

pub fn image_name(id: i32) -> Option<&'static str> {
    usize::try_from(id).ok().and_then(|i| IMAGE_SET.get(i).copied())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Mains,
    Sides,
}

impl Collection {
    /// Remote collection name.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Mains => "recipes",
            Collection::Sides => "side-recipes",
        }
    }

    /// Path segment used by the HTTP API.
    pub fn slug(self) -> &'static str {
        match self {
            Collection::Mains => "mains",
            Collection::Sides => "sides",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ingredients: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub is_vegetarian: bool,
    #[serde(default)]
    pub need_a_side: bool,
    #[serde(default)]
    pub url_image: String,
    #[serde(default)]
    pub id_image: i32,
    #[serde(default)]
    pub seasons: Vec<u8>,
    #[serde(default)]
    pub is_side: bool,
}

impl Recipe {
    pub fn collection(&self) -> Collection {
        if self.is_side {
            Collection::Sides
        } else {
            Collection::Mains
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".into());
        }
        if self.ingredients.trim().is_empty() {
            return Err("ingredients are required".into());
        }
        if self.is_side && self.need_a_side {
            return Err("a side recipe cannot require a side".into());
        }
        if image_name(self.id_image).is_none() {
            return Err(format!("idImage {} is not a known image", self.id_image));
        }
        if let Some(s) = self.seasons.iter().find(|s| **s > 3) {
            return Err(format!("season {} is out of range", s));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDocument {
    pub id: u64,
    #[serde(flatten)]
    pub recipe: Recipe,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipeQuery {
    #[serde(default = "default_collection")]
    pub collection: Collection,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub prefix: String,
}

fn default_collection() -> Collection {
    Collection::Mains
}

fn default_limit() -> i64 {
    20
}

impl Default for RecipeQuery {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            limit: default_limit(),
            offset: 0,
            prefix: String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedRecipeResponse {
    pub collection: Collection,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct UploadImageRequest {
    pub image: serde_bytes::ByteBuf,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadedImageResponse {
    pub key: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pasta() -> Recipe {
        Recipe {
            title: "Pasta al pesto".into(),
            ingredients: "pasta, basil, pine nuts".into(),
            id_image: 8,
            ..Recipe::default()
        }
    }

    #[test]
    fn accepts_well_formed_recipe() {
        assert!(pasta().validate().is_ok());
    }

    #[test]
    fn rejects_side_that_needs_a_side() {
        let recipe = Recipe {
            is_side: true,
            need_a_side: true,
            ..pasta()
        };
        let err = recipe.validate().unwrap_err();
        assert!(err.contains("cannot require a side"));
    }

    #[test]
    fn rejects_unknown_image_and_season() {
        let bad_image = Recipe {
            id_image: IMAGE_SET.len() as i32,
            ..pasta()
        };
        assert!(bad_image.validate().is_err());

        let bad_season = Recipe {
            seasons: vec![1, 7],
            ..pasta()
        };
        assert!(bad_season.validate().is_err());
    }

    #[test]
    fn decodes_camel_case_document_with_missing_fields() {
        let recipe: Recipe = serde_json::from_value(serde_json::json!({
            "title": "Hummus",
            "needASide": true,
            "isVegetarian": true
        }))
        .unwrap();
        assert_eq!(recipe.title, "Hummus");
        assert!(recipe.need_a_side);
        assert!(recipe.is_vegetarian);
        assert!(recipe.link.is_empty());
        assert_eq!(recipe.collection(), Collection::Mains);
    }
}
