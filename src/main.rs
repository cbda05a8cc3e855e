//! trongate 主入口
//! TRON USDT 托管钱包后端

use std::sync::Arc;

use anyhow::{Context, Result};
use trongate::{api, app_state::AppState, config::Config, infrastructure};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 环境变量与配置
    dotenvy::dotenv().ok();
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;
    config.validate()?;

    // 2. 日志
    infrastructure::logging::init_logging(&config.logging)?;
    tracing::info!(
        endpoints = config.tron.endpoints.len(),
        usdt_contract = %config.tron.usdt_contract,
        gas_sponsor = config.tron.gas_sponsor_key.is_some(),
        "starting trongate"
    );

    // 3. 数据库（可选）
    let pool = infrastructure::db::init_pool(&config.database).await?;

    // 4. 应用状态与路由
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(pool, config.clone()).context("build app state")?);
    let app = api::routes(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.server.bind_addr))?;
    tracing::info!("listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("shutdown signal received");
}
