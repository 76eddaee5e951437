//! Pricing tier reference data and resolved prices.

use common::Money;
use serde::{Deserialize, Serialize};

use crate::season::Season;

/// A pricing rule scoped to a season and a party-size range.
///
/// Immutable reference data owned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTier {
    pub season: Season,

    /// Display label, e.g. `"couple"` or `"group"`.
    pub tier: String,

    #[serde(alias = "minPeople")]
    pub min_people: u32,

    /// `None` means unbounded.
    #[serde(default, alias = "maxPeople")]
    pub max_people: Option<u32>,

    #[serde(alias = "priceEur")]
    pub price: Money,

    #[serde(default, alias = "pricePerPerson")]
    pub price_per_person: bool,
}

impl PricingTier {
    /// Creates a flat-price tier.
    pub fn flat(
        season: Season,
        tier: impl Into<String>,
        min_people: u32,
        max_people: Option<u32>,
        price: Money,
    ) -> Self {
        Self {
            season,
            tier: tier.into(),
            min_people,
            max_people,
            price,
            price_per_person: false,
        }
    }

    /// Creates a per-person tier.
    pub fn per_person(
        season: Season,
        tier: impl Into<String>,
        min_people: u32,
        max_people: Option<u32>,
        price: Money,
    ) -> Self {
        Self {
            price_per_person: true,
            ..Self::flat(season, tier, min_people, max_people, price)
        }
    }

    /// Returns true if the party size falls inside `[min_people, max_people]`.
    pub fn accepts(&self, party_size: u32) -> bool {
        party_size >= self.min_people && self.max_people.is_none_or(|max| party_size <= max)
    }
}

/// A resolved price for a party on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub season: Season,
    pub tier: String,
    /// The matched tier's price as listed.
    pub unit_price: Money,
    pub per_person: bool,
    pub total: Money,
}

/// Lowest and highest tier price in a set of tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: Money,
    pub max: Money,
}
