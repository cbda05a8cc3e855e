//! 测试辅助模块
//! 脚本化的网关传输层：按路径（或函数签名、端点）预置响应并记录调用

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use trongate::{
    config::{Config, RetryConfig},
    domain::{derive_address, PrivateKey, TronAddress},
    error::TronError,
    repository::MemoryWalletRepository,
    service::{
        gateway::{GatewayTransport, TronGateway},
        retry::RetryPolicy,
        wallet_service::WalletService,
    },
};

pub const PRIMARY: &str = "http://primary.test";
pub const SECONDARY: &str = "http://secondary.test";

/// 私钥 1 与其地址
pub const GOLDEN_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";
pub const GOLDEN_ADDRESS: &str = "TMVQGm1qAQYVdetCeGRRkTWYYrLXuHK2HC";
pub const GOLDEN_ADDRESS_HEX: &str = "417e5f4552091a69125d5dfcb7b8c2659029395bdf";
pub const RECIPIENT_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000002";
pub const SPONSOR_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000003";

pub fn key(hex: &str) -> PrivateKey {
    PrivateKey::from_hex(hex).unwrap()
}

pub fn address_of(hex: &str) -> TronAddress {
    derive_address(&key(hex)).unwrap().address
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 脚本化传输层
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Transport(String),
    /// 延迟后返回
    Slow(Duration, Value),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub base: String,
    pub path: String,
    pub body: Value,
}

impl Call {
    pub fn function(&self) -> Option<&str> {
        self.body.get("function_selector").and_then(Value::as_str)
    }
}

/// 路由键优先级：`base|path` > `path#函数名` > `path`。
/// 队列只剩最后一个响应时重复返回它
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, key: impl Into<String>, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(key.into())
            .or_default()
            .push_back(reply);
    }

    pub fn on(&self, path: &str, body: Value) {
        self.push(path, Reply::Json(body));
    }

    /// 按合约函数名区分同一路径（如 balanceOf 与 transfer 都走 triggerconstantcontract）
    pub fn on_fn(&self, path: &str, function: &str, body: Value) {
        self.push(format!("{}#{}", path, function), Reply::Json(body));
    }

    pub fn on_endpoint(&self, base: &str, path: &str, reply: Reply) {
        self.push(format!("{}|{}", base, path), reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    pub fn count_fn(&self, path: &str, function: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.path == path && c.function().is_some_and(|f| f.starts_with(function)))
            .count()
    }

    fn next_reply(&self, base: &str, path: &str, body: &Value) -> Option<Reply> {
        let function = body
            .get("function_selector")
            .and_then(Value::as_str)
            .map(|s| s.split('(').next().unwrap_or(s).to_string());
        let mut keys = vec![format!("{}|{}", base, path)];
        if let Some(f) = function {
            keys.push(format!("{}#{}", path, f));
        }
        keys.push(path.to_string());

        let mut routes = self.routes.lock().unwrap();
        for key in keys {
            if let Some(queue) = routes.get_mut(&key) {
                if queue.len() > 1 {
                    return queue.pop_front();
                }
                if let Some(last) = queue.front() {
                    return Some(last.clone());
                }
            }
        }
        None
    }
}

#[async_trait]
impl GatewayTransport for ScriptedTransport {
    async fn post(
        &self,
        base: &str,
        path: &str,
        body: &Value,
        _timeout: Duration,
    ) -> Result<String, TronError> {
        self.calls.lock().unwrap().push(Call {
            base: base.to_string(),
            path: path.to_string(),
            body: body.clone(),
        });
        match self.next_reply(base, path, body) {
            Some(Reply::Json(v)) => Ok(v.to_string()),
            Some(Reply::Transport(msg)) => Err(TronError::GatewayTransport(msg)),
            Some(Reply::Slow(delay, v)) => {
                tokio::time::sleep(delay).await;
                Ok(v.to_string())
            }
            None => Err(TronError::GatewayTransport(format!(
                "no scripted reply for {}{}",
                base, path
            ))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 响应构造
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn word(value: u64) -> String {
    format!("{:064x}", value)
}

pub fn balance_reply(micros: u64) -> Value {
    json!({ "result": { "result": true }, "constant_result": [word(micros)] })
}

pub fn energy_reply(energy: u64) -> Value {
    json!({ "result": { "result": true }, "energy_used": energy, "constant_result": [word(1)] })
}

pub fn account_reply(sun: u64) -> Value {
    json!({ "address": GOLDEN_ADDRESS_HEX, "balance": sun })
}

pub fn txid_for(seed: &str) -> String {
    hex::encode(Sha256::digest(seed.as_bytes()))
}

/// txID = SHA256(raw_data_hex 字节)
pub fn unsigned_tx(seed: &str) -> Value {
    json!({
        "txID": txid_for(seed),
        "raw_data": { "ref_block_bytes": "0a0b", "contract": [] },
        "raw_data_hex": hex::encode(seed.as_bytes()),
    })
}

pub fn trigger_reply(seed: &str) -> Value {
    json!({ "result": { "result": true }, "transaction": unsigned_tx(seed) })
}

pub fn broadcast_ok(txid: &str) -> Value {
    json!({ "result": true, "txid": txid })
}

pub fn broadcast_error(code: &str, message: &str) -> Value {
    json!({ "result": false, "code": code, "message": hex::encode(message) })
}

pub fn tx_info(txid: &str, contract_ret: Option<&str>) -> Value {
    match contract_ret {
        Some(ret) => json!({ "txID": txid, "ret": [{ "contractRet": ret }] }),
        None => json!({ "txID": txid }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 组装
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.tron.endpoints = vec![PRIMARY.to_string(), SECONDARY.to_string()];
    config.tron.usdt_contract = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".to_string();
    config.tron.gas_sponsor_key = None;
    config.retry = RetryConfig {
        read: RetryPolicy::immediate(5),
        broadcast: RetryPolicy::immediate(5),
    };
    config.fee.energy_price_sun = 420;
    config.fee.default_energy = 30_000;
    config.fee.buffer_bps = 12_000;
    config.fee.min_fee_limit_sun = 2_000_000;
    config.fee.max_fee_limit_sun = 5_000_000;
    config.fee.approve_fee_limit_sun = 2_000_000;
    config.ledger.display_decimals = 4;
    config.ledger.withdraw_deadline_secs = 30;
    config.ledger.topup_settle_delay_secs = 0;
    config.ledger.status_poll_interval_secs = 0;
    config
}

pub fn gateway(transport: Arc<ScriptedTransport>, config: &Config) -> Arc<TronGateway> {
    Arc::new(TronGateway::new(
        transport,
        config.tron.endpoints.clone(),
        config.retry.clone(),
    ))
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub repo: Arc<MemoryWalletRepository>,
    pub gateway: Arc<TronGateway>,
    pub service: Arc<WalletService>,
    pub config: Config,
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: Config) -> Harness {
    let transport = ScriptedTransport::new();
    let repo = Arc::new(MemoryWalletRepository::new());
    let gateway = gateway(transport.clone(), &config);
    let service = Arc::new(WalletService::new(repo.clone(), gateway.clone(), &config).unwrap());
    Harness {
        transport,
        repo,
        gateway,
        service,
        config,
    }
}
