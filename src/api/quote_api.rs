//! 报价缓存 API（如 USDT/CNY 汇率）

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::response::{success_response, ApiResult},
    app_state::AppState,
    error::AppError,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetQuoteRequest {
    #[schema(value_type = String)]
    pub value: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteResponse {
    pub symbol: String,
    #[schema(value_type = String)]
    pub value: Decimal,
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

#[utoipa::path(
    get,
    path = "/api/tron/quotes/{symbol}",
    params(("symbol" = String, Path, description = "Quote key, e.g. USDT-CNY")),
    responses(
        (status = 200, description = "Cached quote", body = QuoteResponse),
        (status = 404, description = "Missing or expired")
    )
)]
pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<QuoteResponse> {
    let symbol = normalize(&symbol);
    let value = state
        .quote_cache
        .get(&symbol)
        .ok_or_else(|| AppError::not_found(format!("no fresh quote for {}", symbol)))?;
    success_response(QuoteResponse { symbol, value })
}

#[utoipa::path(
    put,
    path = "/api/tron/quotes/{symbol}",
    params(("symbol" = String, Path, description = "Quote key, e.g. USDT-CNY")),
    request_body = SetQuoteRequest,
    responses((status = 200, description = "Stored", body = QuoteResponse))
)]
pub async fn set_quote(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Json(req): Json<SetQuoteRequest>,
) -> ApiResult<QuoteResponse> {
    if req.value <= Decimal::ZERO {
        return Err(AppError::bad_request("quote must be positive"));
    }
    let symbol = normalize(&symbol);
    state.quote_cache.set(symbol.clone(), req.value);
    success_response(QuoteResponse {
        symbol,
        value: req.value,
    })
}
