use serde::{Deserialize, Serialize};

use crate::menu::MealPayload;
use crate::recipes::image_name;

/// One cached day of the week, as the clients render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: usize,
    pub main: String,
    pub main_ingredients: String,
    pub link: String,
    pub is_vegetarian: bool,
    pub side: Option<String>,
    pub side_ingredients: Option<String>,
    pub url_image: String,
    pub id_image: i32,
    pub server_id: Option<u64>,
}

pub fn search_link(title: &str) -> String {
    format!("https://www.google.com/search?q={}", urlencoding::encode(title))
}

impl Meal {
    /// Row for slot `id`; a missing link becomes a search for the main dish.
    pub fn from_payload(id: usize, p: MealPayload) -> Self {
        let link = match p.link {
            Some(link) if !link.is_empty() => link,
            _ => search_link(&p.main),
        };
        Self {
            id,
            main: p.main,
            main_ingredients: p.main_ingredients,
            link,
            is_vegetarian: p.is_vegetarian,
            side: p.side,
            side_ingredients: p.side_ingredients,
            url_image: p.url_image,
            id_image: p.id_image,
            server_id: p.server_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MealPerDate {
    pub meal: Meal,
    pub date: String,
    pub image: Option<&'static str>,
}

impl MealPerDate {
    pub fn zip(meals: Vec<Meal>, labels: Vec<String>) -> Vec<MealPerDate> {
        meals
            .into_iter()
            .zip(labels)
            .map(|(meal, date)| MealPerDate {
                image: image_name(meal.id_image),
                meal,
                date,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekPhase {
    #[default]
    Default,
    Initialized,
    Empty,
    Refreshing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeekState {
    pub phase: WeekPhase,
    pub generating: bool,
    pub error: bool,
    /// Whether the last tree write went through.
    pub written: bool,
}

#[derive(Debug, Serialize)]
pub struct WeekView {
    pub state: WeekState,
    pub actual_date: String,
    pub days: Vec<MealPerDate>,
}

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub slots: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MealChoice {
    Auto,
    Explicit { meal: MealPayload },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(main: &str, link: Option<&str>) -> MealPayload {
        serde_json::from_value(serde_json::json!({
            "main": main,
            "link": link,
            "idImage": 3,
            "serverId": 12
        }))
        .unwrap()
    }

    #[test]
    fn backfills_missing_link_with_search() {
        let meal = Meal::from_payload(2, payload("Pasta e fagioli", None));
        assert_eq!(
            meal.link,
            "https://www.google.com/search?q=Pasta%20e%20fagioli"
        );
        assert_eq!(meal.id, 2);
        assert_eq!(meal.server_id, Some(12));
    }

    #[test]
    fn backfills_empty_link_too() {
        let meal = Meal::from_payload(0, payload("Poke", Some("")));
        assert_eq!(meal.link, search_link("Poke"));
    }

    #[test]
    fn keeps_existing_link() {
        let meal = Meal::from_payload(0, payload("Poke", Some("https://example.org/poke")));
        assert_eq!(meal.link, "https://example.org/poke");
    }

    #[test]
    fn zip_pairs_meals_with_labels_and_images() {
        let meals = vec![Meal::from_payload(0, payload("A", None))];
        let days = MealPerDate::zip(meals, vec!["Monday 20 October".into(), "Tuesday 21 October".into()]);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, "Monday 20 October");
        assert_eq!(days[0].image, Some("spaghetti"));
    }

    #[test]
    fn meal_choice_is_tagged_by_mode() {
        let auto: MealChoice = serde_json::from_str(r#"{"mode":"auto"}"#).unwrap();
        assert!(matches!(auto, MealChoice::Auto));
        let explicit: MealChoice =
            serde_json::from_str(r#"{"mode":"explicit","meal":{"main":"Toast"}}"#).unwrap();
        assert!(matches!(explicit, MealChoice::Explicit { meal } if meal.main == "Toast"));
    }
}
