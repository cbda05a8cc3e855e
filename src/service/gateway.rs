//! TRON HTTP 网关客户端（TronGrid 兼容）
//!
//! 所有出站调用都经过这里：按调用类别套用重试策略，对响应做分类
//! （传输失败 / 明确拒绝 / 结构异常），余额查询支持多端点降级。
//! 传输层抽象为 `GatewayTransport`，便于测试替换。

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    config::{RetryConfig, TronConfig},
    domain::{
        abi::ContractCall,
        address::TronAddress,
        amount::Sun,
        transaction::{SignedTransaction, UnsignedTransaction},
    },
    error::TronError,
    service::retry::{with_retry, RetryPolicy},
};

pub const PATH_TRIGGER_CONSTANT: &str = "/wallet/triggerconstantcontract";
pub const PATH_TRIGGER_SMART: &str = "/wallet/triggersmartcontract";
pub const PATH_CREATE_TRANSACTION: &str = "/wallet/createtransaction";
pub const PATH_BROADCAST: &str = "/wallet/broadcasttransaction";
pub const PATH_GET_ACCOUNT: &str = "/wallet/getaccount";
pub const PATH_GET_TRANSACTION: &str = "/wallet/gettransactionbyid";

/// 重复广播的错误码；同一份签名字节已被接受
const DUP_TRANSACTION: &str = "DUP_TRANSACTION_ERROR";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 传输层
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// POST JSON 到 `base + path`，2xx 时返回响应体文本。
    /// 连接失败、超时、非 2xx 一律返回 `GatewayTransport`
    async fn post(
        &self,
        base: &str,
        path: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<String, TronError>;
}

/// reqwest 实现，带 `TRON-PRO-API-KEY` 头
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(api_key: Option<String>) -> Result<Self, TronError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TronError::GatewayTransport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn post(
        &self,
        base: &str,
        path: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<String, TronError> {
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        let mut req = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            req = req.header("TRON-PRO-API-KEY", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TronError::GatewayTransport(format!("{}: {}", path, e)))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| TronError::GatewayTransport(format!("{}: {}", path, e)))?;
        if !status.is_success() {
            return Err(TronError::GatewayTransport(format!(
                "{} returned HTTP {}: {}",
                path,
                status,
                text.chars().take(200).collect::<String>()
            )));
        }
        Ok(text)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 请求/响应结构
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
pub struct TriggerContractRequest<'a> {
    pub owner_address: String,
    pub contract_address: String,
    pub function_selector: &'a str,
    pub parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_limit: Option<u64>,
    pub call_value: u64,
    pub visible: bool,
}

impl<'a> TriggerContractRequest<'a> {
    fn new(
        owner: &TronAddress,
        contract: &TronAddress,
        call: &'a ContractCall,
        fee_limit: Option<Sun>,
    ) -> Self {
        Self {
            owner_address: owner.to_hex(),
            contract_address: contract.to_hex(),
            function_selector: call.function,
            parameter: call.parameter_hex(),
            fee_limit: fee_limit.map(Sun::as_sun),
            call_value: 0,
            visible: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTransactionRequest {
    pub owner_address: String,
    pub to_address: String,
    pub amount: u64,
    pub visible: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountRequest {
    pub address: String,
    pub visible: bool,
}

#[derive(Debug, Serialize)]
pub struct TransactionByIdRequest<'a> {
    pub value: &'a str,
    pub visible: bool,
}

/// `result` 字段：成功时 `{"result":true}`，失败时带 code/message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallResult {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl CallResult {
    fn check(&self) -> Result<(), TronError> {
        match self.code.as_deref() {
            Some(code) if !code.is_empty() && code != "SUCCESS" => {
                Err(TronError::GatewayRejected {
                    code: code.to_string(),
                    message: decode_message(self.message.as_deref()),
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConstantRet {
    #[serde(default)]
    pub ret: Option<String>,
    #[serde(default)]
    pub energy_usage: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConstantTransaction {
    #[serde(default)]
    pub ret: Vec<ConstantRet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConstantContractResponse {
    #[serde(default)]
    pub result: Option<CallResult>,
    #[serde(default)]
    pub energy_used: Option<u64>,
    #[serde(default)]
    pub constant_result: Vec<String>,
    #[serde(default)]
    pub transaction: Option<ConstantTransaction>,
}

impl ConstantContractResponse {
    /// 模拟执行是否回滚
    pub fn reverted(&self) -> bool {
        self.transaction
            .as_ref()
            .and_then(|t| t.ret.first())
            .and_then(|r| r.ret.as_deref())
            .map(|r| r.eq_ignore_ascii_case("FAILED") || r.eq_ignore_ascii_case("REVERT"))
            .unwrap_or(false)
    }

    /// 顶层 `energy_used`，否则 `transaction.ret[0].energy_usage`；0 视为无效
    pub fn energy(&self) -> Option<u64> {
        self.energy_used
            .filter(|e| *e > 0)
            .or_else(|| {
                self.transaction
                    .as_ref()
                    .and_then(|t| t.ret.first())
                    .and_then(|r| r.energy_usage)
            })
            .filter(|e| *e > 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerSmartContractResponse {
    #[serde(default)]
    pub result: Option<CallResult>,
    #[serde(default)]
    pub transaction: Option<UnsignedTransaction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BroadcastResponse {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountResponse {
    #[serde(default)]
    pub address: Option<String>,
    /// 账户不存在时网关返回 `{}`，余额按 0
    #[serde(default)]
    pub balance: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractResult {
    #[serde(rename = "contractRet", default)]
    pub contract_ret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionByIdResponse {
    #[serde(rename = "txID", default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub ret: Vec<ContractResult>,
}

/// 广播被接受后的回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastReceipt {
    pub txid: String,
}

/// 网关的 message 常是十六进制编码的 ASCII，能解就解
pub fn decode_message(message: Option<&str>) -> String {
    let Some(msg) = message else {
        return String::new();
    };
    hex::decode(msg)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|s| !s.is_empty() && s.chars().all(|c| !c.is_control() || c.is_whitespace()))
        .unwrap_or_else(|| msg.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 网关客户端
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct TronGateway {
    transport: Arc<dyn GatewayTransport>,
    endpoints: Vec<String>,
    policies: RetryConfig,
}

impl TronGateway {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        endpoints: Vec<String>,
        policies: RetryConfig,
    ) -> Self {
        Self {
            transport,
            endpoints,
            policies,
        }
    }

    pub fn from_config(tron: &TronConfig, policies: RetryConfig) -> Result<Self, TronError> {
        let transport = Arc::new(HttpTransport::new(tron.api_key.clone())?);
        Ok(Self::new(transport, tron.endpoints.clone(), policies))
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn read_policy(&self) -> &RetryPolicy {
        &self.policies.read
    }

    fn primary(&self) -> Result<&str, TronError> {
        self.endpoints
            .first()
            .map(String::as_str)
            .ok_or_else(|| TronError::GatewayTransport("no gateway endpoint configured".into()))
    }

    /// 带重试的 POST；只重试传输层，解码失败直接返回 `MalformedResponse`
    async fn call<Req, Resp>(
        &self,
        base: &str,
        path: &str,
        request: &Req,
        policy: &RetryPolicy,
    ) -> Result<Resp, TronError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_value(request)
            .map_err(|e| TronError::InvalidArgument(format!("{}: {}", path, e)))?;
        let text = with_retry(policy, path, |_| {
            self.transport.post(base, path, &body, policy.timeout())
        })
        .await?;
        serde_json::from_str(&text)
            .map_err(|e| TronError::MalformedResponse(format!("{}: {}", path, e)))
    }

    /// 常量调用（不上链），走主端点，用于能量估算
    pub async fn trigger_constant_contract(
        &self,
        owner: &TronAddress,
        contract: &TronAddress,
        call: &ContractCall,
    ) -> Result<ConstantContractResponse, TronError> {
        self.trigger_constant_contract_at(self.primary()?, owner, contract, call)
            .await
    }

    /// 在指定端点做常量调用，余额读取按端点顺序降级时使用
    pub async fn trigger_constant_contract_at(
        &self,
        base: &str,
        owner: &TronAddress,
        contract: &TronAddress,
        call: &ContractCall,
    ) -> Result<ConstantContractResponse, TronError> {
        let req = TriggerContractRequest::new(owner, contract, call, None);
        let resp: ConstantContractResponse = self
            .call(base, PATH_TRIGGER_CONSTANT, &req, &self.policies.read)
            .await?;
        if let Some(result) = &resp.result {
            result.check()?;
        }
        Ok(resp)
    }

    /// 构造合约调用交易（未签名）
    pub async fn trigger_smart_contract(
        &self,
        owner: &TronAddress,
        contract: &TronAddress,
        call: &ContractCall,
        fee_limit: Sun,
    ) -> Result<UnsignedTransaction, TronError> {
        let req = TriggerContractRequest::new(owner, contract, call, Some(fee_limit));
        let resp: TriggerSmartContractResponse = self
            .call(self.primary()?, PATH_TRIGGER_SMART, &req, &self.policies.read)
            .await?;
        if let Some(result) = &resp.result {
            result.check()?;
        }
        resp.transaction
            .ok_or_else(|| TronError::MalformedResponse("triggersmartcontract: missing transaction".into()))
    }

    /// 构造 TRX 原生转账（未签名）
    pub async fn create_transaction(
        &self,
        owner: &TronAddress,
        to: &TronAddress,
        amount: Sun,
    ) -> Result<UnsignedTransaction, TronError> {
        let req = CreateTransactionRequest {
            owner_address: owner.to_hex(),
            to_address: to.to_hex(),
            amount: amount.as_sun(),
            visible: false,
        };
        let value: serde_json::Value = self
            .call(self.primary()?, PATH_CREATE_TRANSACTION, &req, &self.policies.read)
            .await?;
        if let Some(err) = value.get("Error").and_then(|v| v.as_str()) {
            return Err(TronError::GatewayRejected {
                code: "CREATE_TRANSACTION_ERROR".into(),
                message: err.to_string(),
            });
        }
        serde_json::from_value(value)
            .map_err(|e| TronError::MalformedResponse(format!("createtransaction: {}", e)))
    }

    /// 广播已签名交易。传输失败按广播策略重试后返回 `BroadcastFailed`；
    /// 带错误码的响应立即返回 `GatewayRejected`
    pub async fn broadcast_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<BroadcastReceipt, TronError> {
        let resp: BroadcastResponse = self
            .call(self.primary()?, PATH_BROADCAST, signed, &self.policies.broadcast)
            .await
            .map_err(|e| match e {
                TronError::GatewayTransport(msg) => TronError::BroadcastFailed(msg),
                other => other,
            })?;

        match resp.code.as_deref() {
            Some(DUP_TRANSACTION) => {
                tracing::warn!(txid = %signed.tx_id(), "transaction already accepted by gateway");
                Ok(BroadcastReceipt {
                    txid: signed.tx_id().to_string(),
                })
            }
            Some(code) if !code.is_empty() && code != "SUCCESS" => Err(TronError::GatewayRejected {
                code: code.to_string(),
                message: decode_message(resp.message.as_deref()),
            }),
            _ => {
                let txid = resp
                    .txid
                    .filter(|t| !t.is_empty())
                    .or_else(|| resp.result.then(|| signed.tx_id().to_string()))
                    .ok_or_else(|| {
                        TronError::MalformedResponse("broadcast: no txid and no error code".into())
                    })?;
                Ok(BroadcastReceipt { txid })
            }
        }
    }

    /// 在指定端点查询账户
    pub async fn get_account(
        &self,
        base: &str,
        address: &TronAddress,
    ) -> Result<AccountResponse, TronError> {
        let req = AccountRequest {
            address: address.to_hex(),
            visible: false,
        };
        self.call(base, PATH_GET_ACCOUNT, &req, &self.policies.read)
            .await
    }

    /// 查询交易，未找到时返回 None
    pub async fn get_transaction_by_id(
        &self,
        txid: &str,
    ) -> Result<Option<TransactionByIdResponse>, TronError> {
        let req = TransactionByIdRequest {
            value: txid,
            visible: true,
        };
        let resp: TransactionByIdResponse = self
            .call(self.primary()?, PATH_GET_TRANSACTION, &req, &self.policies.read)
            .await?;
        Ok(resp.tx_id.is_some().then_some(resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_message() {
        // "balance is not sufficient"
        let hex_msg = hex::encode("balance is not sufficient");
        assert_eq!(decode_message(Some(&hex_msg)), "balance is not sufficient");
        assert_eq!(decode_message(Some("plain text")), "plain text");
        assert_eq!(decode_message(None), "");
    }

    #[test]
    fn test_constant_energy_extraction() {
        let top: ConstantContractResponse =
            serde_json::from_str(r#"{"energy_used": 14650, "constant_result": []}"#).unwrap();
        assert_eq!(top.energy(), Some(14650));

        let nested: ConstantContractResponse = serde_json::from_str(
            r#"{"transaction": {"ret": [{"energy_usage": 31895}], "txID": "x"}}"#,
        )
        .unwrap();
        assert_eq!(nested.energy(), Some(31895));

        let zero: ConstantContractResponse =
            serde_json::from_str(r#"{"energy_used": 0}"#).unwrap();
        assert_eq!(zero.energy(), None);

        let reverted: ConstantContractResponse = serde_json::from_str(
            r#"{"energy_used": 900, "transaction": {"ret": [{"ret": "FAILED"}]}}"#,
        )
        .unwrap();
        assert!(reverted.reverted());
    }

    #[test]
    fn test_trigger_request_shape() {
        let owner = TronAddress::from_hex("417e5f4552091a69125d5dfcb7b8c2659029395bdf").unwrap();
        let contract =
            TronAddress::from_base58("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t").unwrap();
        let call = crate::domain::abi::balance_of_call(&owner);
        let req = TriggerContractRequest::new(&owner, &contract, &call, Some(Sun::from_trx(5)));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["owner_address"], "417e5f4552091a69125d5dfcb7b8c2659029395bdf");
        assert_eq!(v["contract_address"], "41a614f803b6fd780986a42c78ec9c7f77e6ded13c");
        assert_eq!(v["function_selector"], "balanceOf(address)");
        assert_eq!(v["fee_limit"], 5_000_000);
        assert_eq!(v["call_value"], 0);
        assert_eq!(v["visible"], false);
    }

    #[test]
    fn test_gateway_from_config_builds_client() {
        let tron = TronConfig::default();
        let gateway = TronGateway::from_config(&tron, RetryConfig::default()).unwrap();
        assert_eq!(gateway.endpoints(), tron.endpoints.as_slice());
        assert!(HttpTransport::new(Some("key".into())).is_ok());
    }

    #[test]
    fn test_call_result_classification() {
        let ok = CallResult {
            result: true,
            ..Default::default()
        };
        assert!(ok.check().is_ok());
        let rejected = CallResult {
            result: false,
            code: Some("CONTRACT_VALIDATE_ERROR".into()),
            message: Some(hex::encode("Contract validate error")),
        };
        match rejected.check() {
            Err(TronError::GatewayRejected { code, message }) => {
                assert_eq!(code, "CONTRACT_VALIDATE_ERROR");
                assert_eq!(message, "Contract validate error");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
