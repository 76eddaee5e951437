//! Price resolution for reservation quotes.
//!
//! A catalog of [`PricingTier`]s is scoped by [`Season`] and party size.
//! [`resolve_price`] picks the first tier matching the travel date's season
//! and the party size, and is a pure function of its inputs.

pub mod error;
pub mod resolver;
pub mod season;
pub mod tier;

pub use error::{PricingError, Result};
pub use resolver::{
    PriceResolution, per_person_price, price_range, price_range_for_season, resolve_price,
};
pub use season::{Season, is_high_season, resolve_season};
pub use tier::{Price, PriceRange, PricingTier};
