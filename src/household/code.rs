use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::error::PlannerError;

/// Partition key for one household's week in the tree store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HouseholdCode(String);

pub(crate) fn is_valid_code(code: &str) -> bool {
    lazy_static! {
        static ref CODE_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{4,32}$").unwrap();
    }
    CODE_RE.is_match(code)
}

impl HouseholdCode {
    pub fn parse(raw: &str) -> Result<Self, PlannerError> {
        let code = raw.trim();
        if !is_valid_code(code) {
            return Err(PlannerError::InvalidHouseholdCode);
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tree path `{module}/{code}`.
    pub fn path(&self, module: &str) -> String {
        format!("{}/{}", module, self.0)
    }
}

impl fmt::Display for HouseholdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_codes() {
        assert!(HouseholdCode::parse("ABC1").is_ok());
        assert_eq!(HouseholdCode::parse("  xyz_9-a ").unwrap().as_str(), "xyz_9-a");
    }

    #[test]
    fn rejects_path_breaking_or_short_codes() {
        let long = "x".repeat(33);
        for bad in ["", "abc", "ab/cd", "a b c d", "../..", long.as_str()] {
            assert!(
                matches!(HouseholdCode::parse(bad), Err(PlannerError::InvalidHouseholdCode)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn builds_tree_path() {
        let code = HouseholdCode::parse("XYZ9").unwrap();
        assert_eq!(code.path("recipe_of_the_week"), "recipe_of_the_week/XYZ9");
    }
}
