//! Price resolution over a tier catalog.

use chrono::NaiveDate;
use common::Money;
use serde::{Deserialize, Serialize};

use crate::error::{PricingError, Result};
use crate::season::{Season, resolve_season};
use crate::tier::{Price, PriceRange, PricingTier};

/// Outcome of resolving a price.
///
/// `NoMatch` is a legitimate business answer ("no price for this
/// combination"), not a fault and not a zero price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PriceResolution {
    Priced(Price),
    NoMatch { season: Season },
}

impl PriceResolution {
    /// Returns the resolved price, if any.
    pub fn price(&self) -> Option<&Price> {
        match self {
            PriceResolution::Priced(price) => Some(price),
            PriceResolution::NoMatch { .. } => None,
        }
    }

    /// Returns the season the resolution was made in.
    pub fn season(&self) -> Season {
        match self {
            PriceResolution::Priced(price) => price.season,
            PriceResolution::NoMatch { season } => *season,
        }
    }
}

/// Resolves the price for a party on a travel date.
///
/// Tiers are filtered to the date's season and the first tier whose
/// party-size range contains `party_size` wins.
///
/// # Preconditions
///
/// `tiers` must already be sorted by ascending `min_people` within each
/// season. The resolver does not re-sort; with overlapping ranges the
/// caller's order decides which tier applies.
///
/// # Errors
///
/// [`PricingError::TotalOverflow`] if a per-person total cannot be
/// represented.
pub fn resolve_price(
    tiers: &[PricingTier],
    party_size: u32,
    travel_date: NaiveDate,
) -> Result<PriceResolution> {
    let season = resolve_season(travel_date);

    let Some(tier) = tiers
        .iter()
        .filter(|tier| tier.season == season)
        .find(|tier| tier.accepts(party_size))
    else {
        return Ok(PriceResolution::NoMatch { season });
    };

    let total = if tier.price_per_person {
        tier.price
            .multiply(party_size)
            .ok_or_else(|| PricingError::TotalOverflow {
                tier: tier.tier.clone(),
                unit_price: tier.price,
                party_size,
            })?
    } else {
        tier.price
    };

    Ok(PriceResolution::Priced(Price {
        season,
        tier: tier.tier.clone(),
        unit_price: tier.price,
        per_person: tier.price_per_person,
        total,
    }))
}

/// Returns the lowest and highest listed tier price across all seasons.
pub fn price_range(tiers: &[PricingTier]) -> Option<PriceRange> {
    range_of(tiers.iter())
}

/// Returns the lowest and highest listed tier price within one season.
pub fn price_range_for_season(tiers: &[PricingTier], season: Season) -> Option<PriceRange> {
    range_of(tiers.iter().filter(|tier| tier.season == season))
}

fn range_of<'a>(tiers: impl Iterator<Item = &'a PricingTier>) -> Option<PriceRange> {
    tiers.fold(None, |range, tier| {
        Some(match range {
            None => PriceRange {
                min: tier.price,
                max: tier.price,
            },
            Some(PriceRange { min, max }) => PriceRange {
                min: min.min(tier.price),
                max: max.max(tier.price),
            },
        })
    })
}

/// Splits a total price across the party. `None` for an empty party.
pub fn per_person_price(total: Money, party_size: u32) -> Option<Money> {
    total.divide(party_size)
}
