//! 账本 API：临时扣款与结算

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        middleware::TraceId,
        response::{success_response, traced, ApiResult},
        wallet_api::parse_amount,
    },
    app_state::AppState,
    domain::wallet::VirtualTransfer,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateVirtualTransferRequest {
    /// USDT 数量（十进制字符串）
    pub amount: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VirtualTransferResponse {
    pub id: Uuid,
    pub wallet_id: Uuid,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<VirtualTransfer> for VirtualTransferResponse {
    fn from(vt: VirtualTransfer) -> Self {
        Self {
            id: vt.id,
            wallet_id: vt.wallet_id,
            amount: vt.amount.to_decimal(),
            status: vt.status.as_str().to_string(),
            created_at: vt.created_at,
            processed_at: vt.processed_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SettleRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SettleResponse {
    /// 本次由 pending 变为 processed 的条数
    pub settled: u64,
}

/// POST /api/tron/wallets/{id}/virtual-transfers
///
/// 记录临时扣款；超出可用余额返回 409
#[utoipa::path(
    post,
    path = "/api/tron/wallets/{id}/virtual-transfers",
    params(("id" = Uuid, Path, description = "Wallet ID")),
    request_body = CreateVirtualTransferRequest,
    responses(
        (status = 200, description = "Debit recorded", body = VirtualTransferResponse),
        (status = 409, description = "Exceeds spendable balance")
    )
)]
pub async fn create_virtual_transfer(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateVirtualTransferRequest>,
) -> ApiResult<VirtualTransferResponse> {
    let amount = parse_amount(&req.amount).map_err(traced(&trace_id))?;
    let vt = state
        .wallet_service
        .record_provisional_debit(id, amount)
        .await
        .map_err(traced(&trace_id))?;
    success_response(vt.into())
}

#[utoipa::path(
    post,
    path = "/api/tron/virtual-transfers/settle",
    request_body = SettleRequest,
    responses((status = 200, description = "Settled", body = SettleResponse))
)]
pub async fn settle_virtual_transfers(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    Json(req): Json<SettleRequest>,
) -> ApiResult<SettleResponse> {
    let settled = state
        .wallet_service
        .settle(&req.ids)
        .await
        .map_err(traced(&trace_id))?;
    success_response(SettleResponse { settled })
}
