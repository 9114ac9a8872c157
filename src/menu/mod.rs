mod generator;
mod payload;

pub use generator::MenuGenerator;
pub use payload::{MealPayload, WeekPatch, MEAL_SCHEMA_VERSION};
