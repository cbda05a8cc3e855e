use std::sync::Arc;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use utoipa::OpenApi;

use crate::{
    api::{
        handlers::{healthz, openapi_json},
        middleware::trace_id_middleware,
    },
    app_state::AppState,
};

pub mod handlers;
pub mod ledger_api;
pub mod middleware;
pub mod quote_api;
pub mod response; // 统一响应格式
pub mod wallet_api;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::healthz,
        wallet_api::create_wallet,
        wallet_api::derive_wallet,
        wallet_api::get_wallet,
        wallet_api::get_balance,
        wallet_api::get_balance_by_address,
        wallet_api::get_trx_balance,
        wallet_api::get_fee_quote,
        wallet_api::create_withdrawal,
        wallet_api::list_transactions,
        wallet_api::get_transaction_status,
        ledger_api::create_virtual_transfer,
        ledger_api::settle_virtual_transfers,
        quote_api::get_quote,
        quote_api::set_quote,
    ),
    components(
        schemas(
            handlers::Healthz,
            wallet_api::CreateWalletRequest,
            wallet_api::WalletResponse,
            wallet_api::DeriveWalletRequest,
            wallet_api::DeriveWalletResponse,
            wallet_api::BalanceResponse,
            wallet_api::TrxBalanceResponse,
            wallet_api::FeeQuoteResponse,
            wallet_api::WithdrawRequest,
            wallet_api::WithdrawResponse,
            wallet_api::TransactionRecordResponse,
            wallet_api::TxStatusResponse,
            ledger_api::CreateVirtualTransferRequest,
            ledger_api::VirtualTransferResponse,
            ledger_api::SettleRequest,
            ledger_api::SettleResponse,
            quote_api::SetQuoteRequest,
            quote_api::QuoteResponse,
        )
    ),
    tags((name = "tron", description = "TRON USDT custodial wallet"))
)]
pub struct ApiDoc;

pub fn routes(state: Arc<AppState>) -> Router {
    let tron_routes = Router::new()
        .route("/wallets", post(wallet_api::create_wallet))
        .route("/wallets/derive", post(wallet_api::derive_wallet))
        .route("/wallets/:id", get(wallet_api::get_wallet))
        .route("/wallets/:id/balance", get(wallet_api::get_balance))
        .route(
            "/balances/:address",
            get(wallet_api::get_balance_by_address),
        )
        .route("/wallets/:id/trx-balance", get(wallet_api::get_trx_balance))
        .route("/wallets/:id/fee-quote", get(wallet_api::get_fee_quote))
        .route(
            "/wallets/:id/withdrawals",
            post(wallet_api::create_withdrawal),
        )
        .route(
            "/wallets/:id/transactions",
            get(wallet_api::list_transactions),
        )
        .route(
            "/wallets/:id/virtual-transfers",
            post(ledger_api::create_virtual_transfer),
        )
        .route(
            "/virtual-transfers/settle",
            post(ledger_api::settle_virtual_transfers),
        )
        .route(
            "/transactions/:txid",
            get(wallet_api::get_transaction_status),
        )
        .route(
            "/quotes/:symbol",
            get(quote_api::get_quote).put(quote_api::set_quote),
        );

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/openapi.json", get(openapi_json))
        .nest("/api/tron", tron_routes)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(from_fn(trace_id_middleware))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
