//! 错误类型
//!
//! - `TronError`：交易引擎的领域错误（地址/密钥/ABI/网关/账本）
//! - `AppError`：HTTP 层错误，统一输出 `{ code, message, trace_id }`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::amount::Asset;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 领域错误
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 错误分类，决定是否重试以及映射到哪个 HTTP 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 输入非法，永不重试
    InvalidInput,
    InsufficientFunds,
    /// 网络/超时，已重试后仍失败
    Transport,
    /// 网关明确拒绝（带错误码）
    Rejected,
    Conflict,
    NotFound,
    Timeout,
    Internal,
}

#[derive(Debug, Error)]
pub enum TronError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid address prefix: expected 0x41, got 0x{0:02x}")]
    InvalidAddressPrefix(u8),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient {asset} balance: have {have}, need {need}")]
    InsufficientFunds {
        asset: Asset,
        have: Decimal,
        need: Decimal,
    },

    #[error("energy estimation unavailable: {0}")]
    EstimationUnavailable(String),

    #[error("gateway transport error: {0}")]
    GatewayTransport(String),

    #[error("gateway rejected request: {code}: {message}")]
    GatewayRejected { code: String, message: String },

    #[error("gateway returned an empty result")]
    EmptyResult,

    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),

    #[error("transaction build failed: {0}")]
    BuildFailed(String),

    #[error("signing failed: {0}")]
    SignFailed(String),

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("ledger conflict: spendable {have}, requested {need}")]
    LedgerConflict { have: Decimal, need: Decimal },

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),
}

impl TronError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_)
            | Self::InvalidAddressPrefix(_)
            | Self::InvalidPrivateKey(_)
            | Self::InvalidArgument(_)
            | Self::InvalidAmount(_) => ErrorKind::InvalidInput,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::EstimationUnavailable(_)
            | Self::GatewayTransport(_)
            | Self::BroadcastFailed(_)
            | Self::BuildFailed(_) => ErrorKind::Transport,
            Self::GatewayRejected { .. } | Self::EmptyResult | Self::MalformedResponse(_) => {
                ErrorKind::Rejected
            }
            Self::LedgerConflict { .. } => ErrorKind::Conflict,
            Self::WalletNotFound(_) => ErrorKind::NotFound,
            Self::DeadlineExceeded(_) => ErrorKind::Timeout,
            Self::SignFailed(_) | Self::Repository(_) => ErrorKind::Internal,
        }
    }

    /// 仅传输层错误值得重试；带错误码的拒绝是终态
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayTransport(_))
    }

    pub(crate) fn repository(err: anyhow::Error) -> Self {
        Self::Repository(format!("{:#}", err))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP 错误
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub enum AppErrorCode {
    BadRequest,
    NotFound,
    Timeout,
    Internal,

    // 业务错误码
    WalletNotFound,
    InsufficientBalance,
    InvalidAddress,
    InvalidAmount,
    InvalidPrivateKey,
    GasEstimationFailed,
    GatewayRejected,
    RpcError,
    LedgerConflict,
    DatabaseError,
}

impl AppErrorCode {
    fn as_str(&self) -> &'static str {
        match self {
            AppErrorCode::BadRequest => "bad_request",
            AppErrorCode::NotFound => "not_found",
            AppErrorCode::Timeout => "timeout",
            AppErrorCode::Internal => "internal",
            AppErrorCode::WalletNotFound => "wallet_not_found",
            AppErrorCode::InsufficientBalance => "insufficient_balance",
            AppErrorCode::InvalidAddress => "invalid_address",
            AppErrorCode::InvalidAmount => "invalid_amount",
            AppErrorCode::InvalidPrivateKey => "invalid_private_key",
            AppErrorCode::GasEstimationFailed => "gas_estimation_failed",
            AppErrorCode::GatewayRejected => "gateway_rejected",
            AppErrorCode::RpcError => "rpc_error",
            AppErrorCode::LedgerConflict => "ledger_conflict",
            AppErrorCode::DatabaseError => "database_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
    pub status: StatusCode,
    pub trace_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    trace_id: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.as_str(),
            message: &self.message,
            trace_id: self.trace_id.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    fn new(code: AppErrorCode, status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            status,
            trace_id: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::BadRequest, StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::NotFound, StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            AppErrorCode::Internal,
            StatusCode::INTERNAL_SERVER_ERROR,
            msg,
        )
    }

    /// 设置追踪ID
    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

impl From<TronError> for AppError {
    fn from(err: TronError) -> Self {
        let message = err.to_string();
        let (code, status) = match &err {
            TronError::InvalidAddress(_) | TronError::InvalidAddressPrefix(_) => {
                (AppErrorCode::InvalidAddress, StatusCode::BAD_REQUEST)
            }
            TronError::InvalidPrivateKey(_) => {
                (AppErrorCode::InvalidPrivateKey, StatusCode::BAD_REQUEST)
            }
            TronError::InvalidAmount(_) => (AppErrorCode::InvalidAmount, StatusCode::BAD_REQUEST),
            TronError::InvalidArgument(_) => (AppErrorCode::BadRequest, StatusCode::BAD_REQUEST),
            TronError::InsufficientFunds { .. } => (
                AppErrorCode::InsufficientBalance,
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            TronError::EstimationUnavailable(_) => {
                (AppErrorCode::GasEstimationFailed, StatusCode::BAD_GATEWAY)
            }
            TronError::GatewayRejected { .. } => {
                (AppErrorCode::GatewayRejected, StatusCode::BAD_GATEWAY)
            }
            TronError::GatewayTransport(_)
            | TronError::EmptyResult
            | TronError::MalformedResponse(_)
            | TronError::BuildFailed(_)
            | TronError::BroadcastFailed(_) => (AppErrorCode::RpcError, StatusCode::BAD_GATEWAY),
            TronError::LedgerConflict { .. } => (AppErrorCode::LedgerConflict, StatusCode::CONFLICT),
            TronError::WalletNotFound(_) => (AppErrorCode::WalletNotFound, StatusCode::NOT_FOUND),
            TronError::DeadlineExceeded(_) => (AppErrorCode::Timeout, StatusCode::GATEWAY_TIMEOUT),
            TronError::Repository(_) => (
                AppErrorCode::DatabaseError,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            TronError::SignFailed(_) => (AppErrorCode::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        };
        Self::new(code, status, message)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{}", err))
    }
}
