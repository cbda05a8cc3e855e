//! 交易信封与状态

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TronError;

/// 网关返回的未签名交易。`raw_data` 原样透传，不做解释
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,
    pub raw_data: serde_json::Value,
    pub raw_data_hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

impl UnsignedTransaction {
    pub fn raw_bytes(&self) -> Result<Vec<u8>, TronError> {
        hex::decode(&self.raw_data_hex)
            .map_err(|e| TronError::MalformedResponse(format!("raw_data_hex: {}", e)))
    }

    /// SHA256(raw_data)，即交易 ID
    pub fn hash(&self) -> Result<[u8; 32], TronError> {
        Ok(Sha256::digest(self.raw_bytes()?).into())
    }
}

/// 已签名交易，重试时重复提交同一份字节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub transaction: UnsignedTransaction,
    /// 每个签名 65 字节 r‖s‖v 的十六进制
    pub signature: Vec<String>,
}

impl SignedTransaction {
    pub fn tx_id(&self) -> &str {
        &self.transaction.tx_id
    }
}

/// 单笔交易在引擎内的生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Built,
    Signed,
    Broadcast,
    Confirmed,
    Failed,
}

/// 链上查询得到的交易状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TxStatus {
    NotFound,
    Pending,
    Confirmed,
    Failed(String),
}

impl TxStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed(_))
    }
}
