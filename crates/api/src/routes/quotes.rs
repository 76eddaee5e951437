//! Price quote endpoint.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use chrono::NaiveDate;
use common::Money;
use pricing::{
    PriceRange, PriceResolution, PricingTier, per_person_price, price_range_for_season,
    resolve_price,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    /// Catalog tiers, sorted by ascending `min_people` within each season.
    pub tiers: Vec<PricingTier>,
    #[serde(alias = "partySize")]
    pub party_size: u32,
    #[serde(alias = "travelDate")]
    pub travel_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub resolution: PriceResolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_person_price: Option<Money>,
    /// Cheapest and dearest tier in the travel date's season.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_range: Option<PriceRange>,
}

/// POST /quotes — resolves the price for a party on a travel date.
///
/// A missing tier is answered with `"status": "no_match"`, never with a
/// zero price.
pub async fn create(
    payload: Result<Json<QuoteRequest>, JsonRejection>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if request.party_size == 0 {
        return Err(ApiError::BadRequest(
            "party_size must be at least 1".to_string(),
        ));
    }

    let resolution = resolve_price(&request.tiers, request.party_size, request.travel_date)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let per_person_price = resolution
        .price()
        .and_then(|price| per_person_price(price.total, request.party_size));
    let season_range = price_range_for_season(&request.tiers, resolution.season());

    let result = match resolution {
        PriceResolution::Priced(_) => "priced",
        PriceResolution::NoMatch { .. } => "no_match",
    };
    metrics::counter!("price_quotes_total", "result" => result).increment(1);
    tracing::debug!(
        party_size = request.party_size,
        travel_date = %request.travel_date,
        result,
        "price quote resolved"
    );

    Ok(Json(QuoteResponse {
        resolution,
        per_person_price,
        season_range,
    }))
}
