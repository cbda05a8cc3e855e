use std::sync::Arc;

use crate::{
    config::Config,
    domain::keys::PrivateKey,
    error::TronError,
    infrastructure::{db::PgPool, quote_cache::QuoteCache},
    repository::{MemoryWalletRepository, PgWalletRepository, WalletRepository},
    service::{gateway::TronGateway, wallet_service::WalletService},
};

/// 应用状态
/// 包含所有共享资源
#[derive(Clone)]
pub struct AppState {
    /// 未配置数据库时为 None（使用内存仓储）
    pub pool: Option<PgPool>,
    pub wallet_service: Arc<WalletService>,
    pub quote_cache: Arc<QuoteCache>,
    pub gas_sponsor: Option<Arc<PrivateKey>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// 按配置组装：有连接池用 Postgres 仓储，否则用内存仓储
    pub fn new(pool: Option<PgPool>, config: Arc<Config>) -> Result<Self, TronError> {
        let gateway = Arc::new(TronGateway::from_config(&config.tron, config.retry.clone())?);
        let repo: Arc<dyn WalletRepository> = match &pool {
            Some(pool) => Arc::new(PgWalletRepository::new(pool.clone())),
            None => {
                tracing::warn!("DATABASE_URL not set, wallets are kept in memory only");
                Arc::new(MemoryWalletRepository::new())
            }
        };
        Self::with_parts(pool, repo, gateway, config)
    }

    /// 注入仓储与网关（测试用假传输层）
    pub fn with_parts(
        pool: Option<PgPool>,
        repo: Arc<dyn WalletRepository>,
        gateway: Arc<TronGateway>,
        config: Arc<Config>,
    ) -> Result<Self, TronError> {
        let wallet_service = Arc::new(WalletService::new(repo, gateway, &config)?);
        let quote_cache = Arc::new(QuoteCache::with_system_clock(chrono::Duration::seconds(
            config.ledger.quote_cache_ttl_secs as i64,
        )));
        let gas_sponsor = config
            .tron
            .gas_sponsor_key
            .as_deref()
            .map(PrivateKey::from_hex)
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            pool,
            wallet_service,
            quote_cache,
            gas_sponsor,
            config,
        })
    }
}
