//! TRON 钱包 API
//! 托管钱包创建、余额、手续费报价、USDT 提现与交易状态

use std::{str::FromStr, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    api::{
        middleware::TraceId,
        response::{success_response, traced, ApiResult},
    },
    app_state::AppState,
    domain::{
        address::TronAddress,
        amount::TokenAmount,
        transaction::TxStatus,
        wallet::{TransactionRecord, Wallet},
    },
    error::{AppError, TronError},
    service::wallet_service::{BalanceReport, FeeQuote, TransferReceipt},
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 请求/响应模型
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    pub owner_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Base58 地址
    pub address: String,
    pub created_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(w: Wallet) -> Self {
        Self {
            id: w.id,
            owner_id: w.owner_id,
            address: w.address.to_base58(),
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeriveWalletRequest {
    /// 64 位 hex 私钥
    pub private_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeriveWalletResponse {
    pub address: String,
    pub address_hex: String,
    pub public_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub wallet_id: Uuid,
    pub address: String,
    #[schema(value_type = String)]
    pub real_balance: Decimal,
    #[schema(value_type = String)]
    pub pending_total: Decimal,
    #[schema(value_type = String)]
    pub available_balance: Decimal,
}

impl From<BalanceReport> for BalanceResponse {
    fn from(r: BalanceReport) -> Self {
        Self {
            wallet_id: r.wallet_id,
            address: r.address.to_base58(),
            real_balance: r.real_balance,
            pending_total: r.pending_total,
            available_balance: r.available_balance,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrxBalanceResponse {
    pub address: String,
    pub balance_sun: u64,
    #[schema(value_type = String)]
    pub balance_trx: Decimal,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BalanceQuery {
    /// TRC20 合约地址，缺省为配置的 USDT 合约
    pub contract: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeeQuoteQuery {
    /// USDT 数量（十进制字符串）
    pub amount: String,
    /// 收款地址，缺省时用钱包自身地址模拟
    pub to: Option<String>,
    /// TRC20 合约地址，缺省为配置的 USDT 合约
    pub contract: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeeQuoteResponse {
    pub address: String,
    #[schema(value_type = String)]
    pub current_trx: Decimal,
    #[schema(value_type = String)]
    pub required_trx: Decimal,
    #[schema(value_type = String)]
    pub current_usdt: Decimal,
    pub sufficient_trx: bool,
    pub sufficient_usdt: bool,
    #[schema(value_type = String)]
    pub missing_trx: Decimal,
    pub energy: u64,
    pub energy_from_default: bool,
}

impl From<FeeQuote> for FeeQuoteResponse {
    fn from(q: FeeQuote) -> Self {
        Self {
            address: q.address.to_base58(),
            current_trx: q.current_trx,
            required_trx: q.required_trx,
            current_usdt: q.current_usdt,
            sufficient_trx: q.sufficient_trx,
            sufficient_usdt: q.sufficient_usdt,
            missing_trx: q.missing_trx,
            energy: q.energy,
            energy_from_default: q.energy_from_default,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    pub to_address: String,
    /// USDT 数量（十进制字符串，最多 6 位小数）
    pub amount: String,
    /// TRX 不足时由赞助账户补足
    #[serde(default)]
    pub auto_topup: bool,
    /// TRC20 合约地址，缺省为配置的 USDT 合约
    #[serde(default)]
    pub contract: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawResponse {
    pub txid: String,
    pub from: String,
    pub state: String,
    #[schema(value_type = Option<String>)]
    pub fee_limit_trx: Option<Decimal>,
}

impl From<TransferReceipt> for WithdrawResponse {
    fn from(r: TransferReceipt) -> Self {
        let state = serde_json::to_value(r.state)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            txid: r.txid,
            from: r.from.to_base58(),
            state,
            fee_limit_trx: r.fee_limit.map(|f| f.to_trx()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionRecordResponse {
    pub id: Uuid,
    pub to_address: String,
    pub token_symbol: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub tx_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionRecordResponse {
    fn from(r: TransactionRecord) -> Self {
        Self {
            id: r.id,
            to_address: r.to_address.to_base58(),
            token_symbol: r.asset.to_string(),
            amount: TokenAmount::from_micros(r.amount).to_decimal(),
            tx_hash: r.tx_hash,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TxStatusQuery {
    /// 等待终态的最长秒数，0 表示只查一次
    #[serde(default)]
    pub wait_secs: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TxStatusResponse {
    pub txid: String,
    pub status: String,
    pub reason: Option<String>,
}

impl TxStatusResponse {
    fn new(txid: String, status: TxStatus) -> Self {
        let (status, reason) = match status {
            TxStatus::NotFound => ("not_found", None),
            TxStatus::Pending => ("pending", None),
            TxStatus::Confirmed => ("confirmed", None),
            TxStatus::Failed(reason) => ("failed", Some(reason)),
        };
        Self {
            txid,
            status: status.to_string(),
            reason,
        }
    }
}

const MAX_STATUS_WAIT_SECS: u64 = 60;

fn parse_contract(contract: Option<&str>) -> Result<Option<TronAddress>, TronError> {
    contract.map(TronAddress::from_str).transpose()
}

pub(crate) fn parse_amount(text: &str) -> Result<TokenAmount, TronError> {
    let value = Decimal::from_str(text.trim())
        .map_err(|e| TronError::InvalidAmount(format!("{}: {}", text, e)))?;
    TokenAmount::from_decimal(value)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/tron/wallets
///
/// 为用户创建托管钱包（已存在则返回现有钱包）
#[utoipa::path(
    post,
    path = "/api/tron/wallets",
    request_body = CreateWalletRequest,
    responses((status = 200, description = "Wallet", body = WalletResponse))
)]
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Json(req): Json<CreateWalletRequest>,
) -> ApiResult<WalletResponse> {
    let wallet = state
        .wallet_service
        .create_wallet(req.owner_id)
        .await
        .map_err(traced(&trace_id))?;
    success_response(wallet.into())
}

/// POST /api/tron/wallets/derive
///
/// 私钥推导地址（不落库）
#[utoipa::path(
    post,
    path = "/api/tron/wallets/derive",
    request_body = DeriveWalletRequest,
    responses((status = 200, description = "Derived address", body = DeriveWalletResponse))
)]
pub async fn derive_wallet(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Json(req): Json<DeriveWalletRequest>,
) -> ApiResult<DeriveWalletResponse> {
    let derived = state
        .wallet_service
        .derive_wallet(&req.private_key)
        .map_err(traced(&trace_id))?;
    success_response(DeriveWalletResponse {
        address: derived.address_text(),
        address_hex: derived.address_hex(),
        public_key: derived.public_key_hex(),
    })
}

#[utoipa::path(
    get,
    path = "/api/tron/wallets/{id}",
    params(("id" = Uuid, Path, description = "Wallet ID")),
    responses((status = 200, description = "Wallet", body = WalletResponse))
)]
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<Uuid>,
) -> ApiResult<WalletResponse> {
    let wallet = state
        .wallet_service
        .get_wallet(id)
        .await
        .map_err(traced(&trace_id))?;
    success_response(wallet.into())
}

/// GET /api/tron/wallets/{id}/balance
///
/// 链上 USDT、待结算合计与可用余额
#[utoipa::path(
    get,
    path = "/api/tron/wallets/{id}/balance",
    params(("id" = Uuid, Path, description = "Wallet ID"), BalanceQuery),
    responses((status = 200, description = "Token balance", body = BalanceResponse))
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<Uuid>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult<BalanceResponse> {
    let contract = parse_contract(query.contract.as_deref()).map_err(traced(&trace_id))?;
    let report = state
        .wallet_service
        .check_balance(id, contract.as_ref())
        .await
        .map_err(traced(&trace_id))?;
    success_response(report.into())
}

/// GET /api/tron/balances/{address}
///
/// 按地址查询托管钱包余额
#[utoipa::path(
    get,
    path = "/api/tron/balances/{address}",
    params(("address" = String, Path, description = "Base58 wallet address"), BalanceQuery),
    responses((status = 200, description = "Token balance", body = BalanceResponse))
)]
pub async fn get_balance_by_address(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult<BalanceResponse> {
    let address = TronAddress::from_str(&address).map_err(traced(&trace_id))?;
    let contract = parse_contract(query.contract.as_deref()).map_err(traced(&trace_id))?;
    let report = state
        .wallet_service
        .check_balance_by_address(&address, contract.as_ref())
        .await
        .map_err(traced(&trace_id))?;
    success_response(report.into())
}

#[utoipa::path(
    get,
    path = "/api/tron/wallets/{id}/trx-balance",
    params(("id" = Uuid, Path, description = "Wallet ID")),
    responses((status = 200, description = "TRX balance", body = TrxBalanceResponse))
)]
pub async fn get_trx_balance(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<Uuid>,
) -> ApiResult<TrxBalanceResponse> {
    let service = &state.wallet_service;
    let wallet = service.get_wallet(id).await.map_err(traced(&trace_id))?;
    let balance = service
        .native_balance(&wallet.address)
        .await
        .map_err(traced(&trace_id))?;
    success_response(TrxBalanceResponse {
        address: wallet.address.to_base58(),
        balance_sun: balance.as_sun(),
        balance_trx: balance.to_trx(),
    })
}

/// GET /api/tron/wallets/{id}/fee-quote
///
/// 发起一笔 USDT 提现需要多少 TRX
#[utoipa::path(
    get,
    path = "/api/tron/wallets/{id}/fee-quote",
    params(("id" = Uuid, Path, description = "Wallet ID"), FeeQuoteQuery),
    responses((status = 200, description = "Fee quote", body = FeeQuoteResponse))
)]
pub async fn get_fee_quote(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<Uuid>,
    Query(query): Query<FeeQuoteQuery>,
) -> ApiResult<FeeQuoteResponse> {
    let amount = parse_amount(&query.amount).map_err(traced(&trace_id))?;
    let to = query
        .to
        .as_deref()
        .map(TronAddress::from_str)
        .transpose()
        .map_err(traced(&trace_id))?;
    let contract = parse_contract(query.contract.as_deref()).map_err(traced(&trace_id))?;

    let service = &state.wallet_service;
    let wallet = service.get_wallet(id).await.map_err(traced(&trace_id))?;
    let quote = service
        .estimate_required_fee(&wallet.address, to.as_ref(), amount, contract.as_ref())
        .await
        .map_err(traced(&trace_id))?;
    success_response(quote.into())
}

/// POST /api/tron/wallets/{id}/withdrawals
///
/// USDT 提现：预检 -> 估算 -> 签名 -> 广播
#[utoipa::path(
    post,
    path = "/api/tron/wallets/{id}/withdrawals",
    params(("id" = Uuid, Path, description = "Wallet ID")),
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Broadcast accepted", body = WithdrawResponse),
        (status = 422, description = "Insufficient spendable token balance or TRX"),
        (status = 502, description = "Gateway rejected or unreachable"),
        (status = 504, description = "Deadline exceeded before broadcast")
    )
)]
pub async fn create_withdrawal(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<Uuid>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<WithdrawResponse> {
    let to = TronAddress::from_str(&req.to_address).map_err(traced(&trace_id))?;
    let amount = parse_amount(&req.amount).map_err(traced(&trace_id))?;
    let contract = parse_contract(req.contract.as_deref()).map_err(traced(&trace_id))?;

    let sponsor = if req.auto_topup {
        let key = state.gas_sponsor.as_deref().ok_or_else(|| {
            AppError::bad_request("auto_topup requested but no gas sponsor is configured")
                .with_trace_id(trace_id.0.clone())
        })?;
        Some(key)
    } else {
        None
    };

    let receipt = state
        .wallet_service
        .withdraw_from_wallet(id, &to, amount, contract.as_ref(), sponsor)
        .await
        .map_err(traced(&trace_id))?;
    success_response(receipt.into())
}

#[utoipa::path(
    get,
    path = "/api/tron/wallets/{id}/transactions",
    params(("id" = Uuid, Path, description = "Wallet ID")),
    responses((status = 200, description = "Withdrawal history", body = [TransactionRecordResponse]))
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<TransactionRecordResponse>> {
    let records = state
        .wallet_service
        .list_transactions(id)
        .await
        .map_err(traced(&trace_id))?;
    success_response(records.into_iter().map(Into::into).collect())
}

/// GET /api/tron/transactions/{txid}
///
/// 查询交易状态；`wait_secs` > 0 时轮询直到终态
#[utoipa::path(
    get,
    path = "/api/tron/transactions/{txid}",
    params(("txid" = String, Path, description = "Transaction ID"), TxStatusQuery),
    responses((status = 200, description = "Transaction status", body = TxStatusResponse))
)]
pub async fn get_transaction_status(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Path(txid): Path<String>,
    Query(query): Query<TxStatusQuery>,
) -> ApiResult<TxStatusResponse> {
    let service = &state.wallet_service;
    let status = if query.wait_secs == 0 {
        service.transaction_status(&txid).await
    } else {
        let wait = Duration::from_secs(query.wait_secs.min(MAX_STATUS_WAIT_SECS));
        service.wait_for_confirmation(&txid, wait).await
    }
    .map_err(traced(&trace_id))?;
    success_response(TxStatusResponse::new(txid, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1.5").unwrap().micros(), 1_500_000);
        assert_eq!(parse_amount(" 3 ").unwrap().micros(), 3_000_000);
        assert!(matches!(parse_amount("abc"), Err(TronError::InvalidAmount(_))));
        assert!(parse_amount("0.0000001").is_err());
        assert!(parse_amount("-1").is_err());
    }

    #[test]
    fn test_tx_status_response() {
        let resp = TxStatusResponse::new("t".into(), TxStatus::Failed("REVERT".into()));
        assert_eq!(resp.status, "failed");
        assert_eq!(resp.reason.as_deref(), Some("REVERT"));
        assert_eq!(TxStatusResponse::new("t".into(), TxStatus::Pending).status, "pending");
    }
}
