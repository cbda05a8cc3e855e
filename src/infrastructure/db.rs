//! SQLx Postgres 连接池初始化与健康检查
//!
//! 用法：
//! let pool = init_pool(&config.database).await?;

use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::DatabaseConfig;

pub type PgPool = sqlx::Pool<sqlx::Postgres>;

/// 初始化连接池并执行迁移（可通过 SKIP_MIGRATIONS 关闭）
pub async fn init_pool(config: &DatabaseConfig) -> Result<Option<PgPool>> {
    let Some(url) = config.url.as_deref() else {
        return Ok(None);
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(300))
        .test_before_acquire(true)
        .connect(url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to Postgres: {}", e);
            e
        })
        .context("connect database")?;

    health_check(&pool).await.context("database health check")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
        tracing::info!("Database migrations completed");
    } else {
        tracing::info!("Database migrations skipped");
    }

    Ok(Some(pool))
}

/// 健康检查
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    let _: (chrono::DateTime<chrono::Utc>,) = sqlx::query_as("SELECT CURRENT_TIMESTAMP")
        .fetch_one(pool)
        .await?;
    Ok(())
}
