use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::{
    api::{
        response::{success_response, ApiResult},
        ApiDoc,
    },
    app_state::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct Healthz {
    pub status: String,
    /// 未配置数据库时为 None
    pub db_ok: Option<bool>,
    pub gateway_endpoints: usize,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "OK", body = Healthz))
)]
pub async fn healthz(State(st): State<Arc<AppState>>) -> ApiResult<Healthz> {
    let db_ok = match &st.pool {
        Some(pool) => Some(crate::infrastructure::db::health_check(pool).await.is_ok()),
        None => None,
    };
    let status = if db_ok == Some(false) {
        "degraded".into()
    } else {
        "ok".into()
    };
    let version = format!(
        "{}+{}",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_HASH").unwrap_or("dev")
    );
    success_response(Healthz {
        status,
        db_ok,
        gateway_endpoints: st.config.tron.endpoints.len(),
        version,
    })
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
