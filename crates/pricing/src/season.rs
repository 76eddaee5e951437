//! Season derivation from a travel date.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Pricing season.
///
/// ```text
///  Jan 1 ── Jan 2 ──────── Apr 30 │ May 1 ──────── Oct 31 │ Nov 1 ──── Dec 22 │ Dec 23 ── Dec 31
///  high  │        low             │        high           │       low         │      high
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Low,
    High,
}

impl Season {
    /// Returns the season name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Low => "low",
            Season::High => "high",
        }
    }
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derives the season for a travel date.
///
/// High season is May 1 to Oct 31 inclusive, plus the holiday window
/// Dec 23 to Jan 1 inclusive, which wraps the year boundary. Every other
/// date is low season.
pub fn resolve_season(date: NaiveDate) -> Season {
    let (month, day) = (date.month(), date.day());

    let holiday_window = (month == 12 && day >= 23) || (month == 1 && day == 1);
    let summer = (5..=10).contains(&month);

    if holiday_window || summer {
        Season::High
    } else {
        Season::Low
    }
}

/// Returns true if the date falls in high season.
pub fn is_high_season(date: NaiveDate) -> bool {
    resolve_season(date) == Season::High
}
