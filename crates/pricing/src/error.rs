use common::Money;
use thiserror::Error;

/// Errors that can occur while resolving a price.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// A per-person tier price times the party size does not fit in a decimal.
    #[error("Total for tier '{tier}' overflows: {unit_price} x {party_size}")]
    TotalOverflow {
        tier: String,
        unit_price: Money,
        party_size: u32,
    },
}

/// Result type for pricing operations.
pub type Result<T> = std::result::Result<T, PricingError>;
