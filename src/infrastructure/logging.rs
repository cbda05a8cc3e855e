//! 日志系统配置模块
//! 支持 JSON 结构化日志与文本日志，级别由 RUST_LOG 或配置决定

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// 日志级别过滤器：RUST_LOG 优先，其次配置
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "trongate={level},tower_http={level},sqlx=warn",
            level = config.level
        ))
    })
}

/// 初始化日志系统
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = build_filter(config);

    let result = if config.format == "json" {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_config() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
        };
        let filter = build_filter(&config);
        if std::env::var("RUST_LOG").is_err() {
            assert!(filter.to_string().contains("trongate=debug"));
        }
    }
}
