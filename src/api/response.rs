//! 统一 API 响应格式
//!
//! 成功：{ code: 0, message, data }；错误格式见 `AppError`

use axum::Json;
use serde::Serialize;

use crate::{api::middleware::TraceId, error::AppError, error::TronError};

/// 统一成功响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// 辅助函数：将数据包装为统一响应格式
pub fn success_response<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// 领域错误转 HTTP 错误并带上 trace_id
pub fn traced(trace_id: &TraceId) -> impl Fn(TronError) -> AppError + '_ {
    move |err| {
        if err.kind() == crate::error::ErrorKind::Internal {
            tracing::error!(trace_id = %trace_id.0, error = %err, "request failed");
        }
        AppError::from(err).with_trace_id(trace_id.0.clone())
    }
}
