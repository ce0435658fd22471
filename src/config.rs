//! Gameplay constants and the trivia category catalog.

use std::env;
use std::time::Duration;

use crate::model::Difficulty;

/// Environment variable overriding the Open Trivia Database base URL.
pub const OPENTDB_URL_ENV: &str = "QUIZ_RALLY_OPENTDB_URL";

const DEFAULT_OPENTDB_URL: &str = "https://opentdb.com";

/// Questions fetched per upstream request.
pub const PREFETCH_BATCH: u8 = 6;

/// How long results stay on screen before the next round opens.
pub const REVEAL_DELAY: Duration = Duration::from_secs(5);

/// Shared pre-game countdown, in seconds, shown before the first round only.
pub const PREROUND_COUNTDOWN_SECS: u32 = 3;

/// Questions per game when the host does not choose a count.
pub const DEFAULT_QUESTION_COUNT: u32 = 10;

/// Open Trivia Database base URL, honoring [`OPENTDB_URL_ENV`].
pub fn opentdb_url() -> String {
    env::var(OPENTDB_URL_ENV).unwrap_or_else(|_| DEFAULT_OPENTDB_URL.to_string())
}

/// Per-round answering budget in seconds.
pub fn time_budget_secs(difficulty: Difficulty) -> u32 {
    match difficulty {
        Difficulty::Easy => 20,
        Difficulty::Medium => 15,
        Difficulty::Hard => 10,
    }
}

/// One entry of the trivia category catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    /// Upstream category identifier.
    pub id: u32,
    /// Human-readable name shown in lobbies.
    pub name: &'static str,
}

/// Categories a host can pick from, with their upstream identifiers.
pub const CATEGORIES: &[Category] = &[
    Category { id: 9, name: "General Knowledge" },
    Category { id: 17, name: "Science & Nature" },
    Category { id: 21, name: "Sports" },
    Category { id: 23, name: "History" },
    Category { id: 22, name: "Geography" },
    Category { id: 11, name: "Entertainment" },
    Category { id: 19, name: "Math" },
];

/// Look up the display name of a catalog category.
pub fn category_name(id: u32) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|category| category.id == id)
        .map(|category| category.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budgets_follow_difficulty() {
        assert_eq!(time_budget_secs(Difficulty::Easy), 20);
        assert_eq!(time_budget_secs(Difficulty::Medium), 15);
        assert_eq!(time_budget_secs(Difficulty::Hard), 10);
    }

    #[test]
    fn unknown_difficulty_strings_get_the_easy_budget() {
        let parsed: Difficulty = serde_json::from_str("\"nightmare\"").unwrap();
        assert_eq!(time_budget_secs(parsed), 20);
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(category_name(22), Some("Geography"));
        assert_eq!(category_name(1), None);
    }
}
