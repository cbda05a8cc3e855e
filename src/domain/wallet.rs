// 钱包与账本领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    address::TronAddress,
    amount::{Asset, TokenAmount},
    keys::PrivateKey,
};

/// 托管钱包（每个用户一个）
#[derive(Debug, Clone)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub address: TronAddress,
    pub private_key: PrivateKey,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWallet {
    pub owner_id: Uuid,
    pub address: TronAddress,
    pub private_key: PrivateKey,
}

/// 虚拟划转状态：只能 pending -> processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualTransferStatus {
    Pending,
    Processed,
}

impl VirtualTransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processed" => Some(Self::Processed),
            _ => None,
        }
    }
}

/// 链上结算前记下的临时扣款
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualTransfer {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount: TokenAmount,
    pub status: VirtualTransferStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// 提现记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub to_address: TronAddress,
    pub asset: Asset,
    /// 最小单位
    pub amount: u64,
    pub tx_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// 余额快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub wallet_id: Uuid,
    pub asset: Asset,
    pub amount: TokenAmount,
    pub updated_at: DateTime<Utc>,
}
