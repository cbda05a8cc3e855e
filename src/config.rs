//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{domain::amount::Sun, service::retry::RetryPolicy};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tron: TronConfig,
    #[serde(default)]
    pub fee: FeeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// 数据库配置。未设置 url 时使用内存仓储
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// TRON 网关配置
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TronConfig {
    /// 按优先级排列；第一个为主网关，余额查询依次降级
    pub endpoints: Vec<String>,
    pub api_key: Option<String>,
    /// USDT TRC20 合约地址
    pub usdt_contract: String,
    /// 手续费赞助账户私钥（hex），用于提现前补足 TRX
    #[serde(skip_serializing)]
    pub gas_sponsor_key: Option<String>,
}

/// 手续费估算配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// 每单位能量价格（SUN）
    pub energy_price_sun: u64,
    /// 估算不可用时的默认能量
    pub default_energy: u64,
    /// 缓冲系数，基点（12000 = 1.2x）
    pub buffer_bps: u32,
    pub min_fee_limit_sun: u64,
    pub max_fee_limit_sun: u64,
    pub approve_fee_limit_sun: u64,
}

/// 按调用类别区分的重试策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub read: RetryPolicy,
    pub broadcast: RetryPolicy,
}

/// 账本与提现流程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// 可用余额展示精度
    pub display_decimals: u32,
    pub withdraw_deadline_secs: u64,
    pub topup_settle_delay_secs: u64,
    pub status_poll_interval_secs: u64,
    pub quote_cache_ttl_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8088".into()),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            max_connections: env_or("DB_MAX_CONNS", 16),
            acquire_timeout_secs: env_or("DB_ACQ_TIMEOUT_SECS", 5),
            run_migrations: std::env::var("SKIP_MIGRATIONS").is_err(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl std::fmt::Debug for TronConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TronConfig")
            .field("endpoints", &self.endpoints)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("usdt_contract", &self.usdt_contract)
            .field("gas_sponsor_key", &self.gas_sponsor_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for TronConfig {
    fn default() -> Self {
        let endpoints = std::env::var("TRON_GATEWAY_URLS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().trim_end_matches('/').to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec!["https://api.trongrid.io".to_string()]);
        Self {
            endpoints,
            api_key: std::env::var("TRON_PRO_API_KEY").ok().filter(|s| !s.is_empty()),
            gas_sponsor_key: std::env::var("TRON_GAS_SPONSOR_KEY").ok().filter(|s| !s.is_empty()),
            usdt_contract: std::env::var("USDT_CONTRACT")
                .unwrap_or_else(|_| "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into()),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            energy_price_sun: env_or("FEE_ENERGY_PRICE_SUN", 420),
            default_energy: env_or("FEE_DEFAULT_ENERGY", 30_000),
            buffer_bps: env_or("FEE_BUFFER_BPS", 12_000),
            min_fee_limit_sun: env_or("FEE_MIN_LIMIT_SUN", Sun::from_trx(2).as_sun()),
            max_fee_limit_sun: env_or("FEE_MAX_LIMIT_SUN", Sun::from_trx(5).as_sun()),
            approve_fee_limit_sun: env_or("FEE_APPROVE_LIMIT_SUN", Sun::from_trx(2).as_sun()),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            read: RetryPolicy {
                max_attempts: env_or("RETRY_READ_ATTEMPTS", 5),
                delay_ms: env_or("RETRY_READ_DELAY_MS", 1_000),
                linear_backoff: false,
                timeout_ms: env_or("RETRY_READ_TIMEOUT_MS", 10_000),
            },
            broadcast: RetryPolicy {
                max_attempts: env_or("RETRY_BROADCAST_ATTEMPTS", 5),
                delay_ms: env_or("RETRY_BROADCAST_DELAY_MS", 3_000),
                linear_backoff: true,
                timeout_ms: env_or("RETRY_BROADCAST_TIMEOUT_MS", 30_000),
            },
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            display_decimals: env_or("LEDGER_DISPLAY_DECIMALS", 4),
            withdraw_deadline_secs: env_or("WITHDRAW_DEADLINE_SECS", 300),
            topup_settle_delay_secs: env_or("TOPUP_SETTLE_DELAY_SECS", 10),
            status_poll_interval_secs: env_or("STATUS_POLL_INTERVAL_SECS", 3),
            quote_cache_ttl_secs: env_or("QUOTE_CACHE_TTL_SECS", 600),
        }
    }
}

impl FeeConfig {
    pub fn min_fee_limit(&self) -> Sun {
        Sun::new(self.min_fee_limit_sun)
    }

    pub fn max_fee_limit(&self) -> Sun {
        Sun::new(self.max_fee_limit_sun)
    }
}

impl LedgerConfig {
    pub fn withdraw_deadline(&self) -> Duration {
        Duration::from_secs(self.withdraw_deadline_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            tron: TronConfig::default(),
            fee: FeeConfig::default(),
            retry: RetryConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self::default())
    }

    /// 从配置文件加载配置。文件中写出的字段生效，
    /// 缺省的段落和段内缺省的字段回落到环境变量（各段 `Default`）
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 配置文件存在时按字段合并：文件里写出的值覆盖环境变量，其余取环境变量；
    /// 文件不存在时只用环境变量
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) if path.as_ref().exists() => Self::from_file(path),
            _ => Self::from_env(),
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.database.url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                anyhow::bail!("DATABASE_URL must start with postgres:// or postgresql://");
            }
        }

        if self.tron.endpoints.is_empty() {
            anyhow::bail!("at least one TRON gateway endpoint is required");
        }
        for url in &self.tron.endpoints {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("TRON gateway endpoint must be http(s): {}", url);
            }
        }
        crate::domain::TronAddress::from_base58(&self.tron.usdt_contract)
            .with_context(|| format!("invalid USDT contract: {}", self.tron.usdt_contract))?;

        if let Some(key) = &self.tron.gas_sponsor_key {
            crate::domain::PrivateKey::from_hex(key).context("invalid TRON_GAS_SPONSOR_KEY")?;
        }

        if self.fee.min_fee_limit_sun > self.fee.max_fee_limit_sun {
            anyhow::bail!("fee.min_fee_limit_sun must not exceed fee.max_fee_limit_sun");
        }
        if self.fee.buffer_bps < 10_000 {
            anyhow::bail!("fee.buffer_bps must be >= 10000 (1.0x)");
        }
        if self.retry.read.max_attempts == 0 || self.retry.broadcast.max_attempts == 0 {
            anyhow::bail!("retry max_attempts must be >= 1");
        }
        if self.ledger.display_decimals > crate::domain::amount::DECIMALS {
            anyhow::bail!("ledger.display_decimals must be <= 6");
        }

        // 验证日志级别
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        // 验证日志格式
        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}
