// 钱包 / 余额 / 提现记录 / 虚拟划转 数据访问 Repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    domain::{
        address::TronAddress,
        amount::{Asset, TokenAmount},
        keys::PrivateKey,
        wallet::{
            BalanceSnapshot, NewWallet, TransactionRecord, VirtualTransfer, VirtualTransferStatus,
            Wallet,
        },
    },
    infrastructure::db::PgPool,
};

// ============ Repository Trait ============

#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// 创建钱包；同一 owner 已存在时返回错误
    async fn create_wallet(&self, wallet: NewWallet) -> Result<Wallet>;

    async fn get_wallet_by_id(&self, wallet_id: Uuid) -> Result<Option<Wallet>>;

    async fn get_wallet_by_address(&self, address: &TronAddress) -> Result<Option<Wallet>>;

    async fn get_wallet_by_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>>;

    /// 写入提现记录
    async fn record_transaction(&self, record: TransactionRecord) -> Result<()>;

    async fn list_transactions(&self, wallet_id: Uuid) -> Result<Vec<TransactionRecord>>;

    /// 钱包下所有 pending 状态的虚拟划转
    async fn get_pending_virtual_transfers(&self, wallet_id: Uuid) -> Result<Vec<VirtualTransfer>>;

    /// 条件写入：仅当 Σpending + amount <= ceiling 时插入，否则返回 None。
    /// 求和与插入在同一事务内完成
    async fn insert_virtual_transfer_within(
        &self,
        wallet_id: Uuid,
        amount: TokenAmount,
        ceiling: TokenAmount,
    ) -> Result<Option<VirtualTransfer>>;

    /// pending -> processed，返回实际迁移的条数；已处理的 id 不受影响
    async fn mark_processed(&self, ids: &[Uuid]) -> Result<u64>;

    async fn update_balance(&self, wallet_id: Uuid, asset: Asset, amount: TokenAmount) -> Result<()>;

    async fn get_balance(&self, wallet_id: Uuid, asset: Asset) -> Result<Option<BalanceSnapshot>>;
}

// ============ PostgreSQL 实现 ============

pub struct PgWalletRepository {
    pool: PgPool,
}

impl PgWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type WalletRow = (Uuid, Uuid, String, String, DateTime<Utc>);
type VirtualTransferRow = (Uuid, Uuid, i64, String, DateTime<Utc>, Option<DateTime<Utc>>);
type TransactionRow = (Uuid, Uuid, String, String, i64, String, String, DateTime<Utc>);

const WALLET_COLUMNS: &str = "id, owner_id, address, private_key, created_at";
const VT_COLUMNS: &str = "id, wallet_id, amount_micros, status, created_at, processed_at";

fn wallet_from_row(row: WalletRow) -> Result<Wallet> {
    let (id, owner_id, address, private_key, created_at) = row;
    Ok(Wallet {
        id,
        owner_id,
        address: TronAddress::from_base58(&address)
            .with_context(|| format!("wallet {} has invalid address", id))?,
        private_key: PrivateKey::from_hex(&private_key)
            .with_context(|| format!("wallet {} has invalid private key", id))?,
        created_at,
    })
}

fn virtual_transfer_from_row(row: VirtualTransferRow) -> Result<VirtualTransfer> {
    let (id, wallet_id, amount, status, created_at, processed_at) = row;
    Ok(VirtualTransfer {
        id,
        wallet_id,
        amount: TokenAmount::from_micros(
            u64::try_from(amount).with_context(|| format!("negative amount on {}", id))?,
        ),
        status: VirtualTransferStatus::parse(&status)
            .with_context(|| format!("unknown virtual transfer status {}", status))?,
        created_at,
        processed_at,
    })
}

fn asset_symbol(asset: Asset) -> &'static str {
    match asset {
        Asset::Trx => "TRX",
        Asset::Usdt => "USDT",
    }
}

fn parse_asset(symbol: &str) -> Result<Asset> {
    match symbol {
        "TRX" => Ok(Asset::Trx),
        "USDT" => Ok(Asset::Usdt),
        other => anyhow::bail!("unknown token symbol {}", other),
    }
}

fn to_i64(micros: u64) -> Result<i64> {
    i64::try_from(micros).context("amount exceeds BIGINT range")
}

#[async_trait]
impl WalletRepository for PgWalletRepository {
    async fn create_wallet(&self, wallet: NewWallet) -> Result<Wallet> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "INSERT INTO wallets (id, owner_id, address, private_key, created_at)
             VALUES ($1, $2, $3, $4, NOW())
             RETURNING {}",
            WALLET_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(wallet.owner_id)
        .bind(wallet.address.to_base58())
        .bind(wallet.private_key.to_hex().as_str())
        .fetch_one(&self.pool)
        .await
        .context("insert wallet")?;
        wallet_from_row(row)
    }

    async fn get_wallet_by_id(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE id = $1",
            WALLET_COLUMNS
        ))
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(wallet_from_row).transpose()
    }

    async fn get_wallet_by_address(&self, address: &TronAddress) -> Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE address = $1",
            WALLET_COLUMNS
        ))
        .bind(address.to_base58())
        .fetch_optional(&self.pool)
        .await?;
        row.map(wallet_from_row).transpose()
    }

    async fn get_wallet_by_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE owner_id = $1",
            WALLET_COLUMNS
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(wallet_from_row).transpose()
    }

    async fn record_transaction(&self, record: TransactionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO transactions
                (id, wallet_id, to_address, token_symbol, amount_micros, tx_hash, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(record.wallet_id)
        .bind(record.to_address.to_base58())
        .bind(asset_symbol(record.asset))
        .bind(to_i64(record.amount)?)
        .bind(&record.tx_hash)
        .bind(&record.status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("insert transaction record")?;
        Ok(())
    }

    async fn list_transactions(&self, wallet_id: Uuid) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, wallet_id, to_address, token_symbol, amount_micros, tx_hash, status, created_at
             FROM transactions WHERE wallet_id = $1 ORDER BY created_at DESC",
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(id, wallet_id, to_address, symbol, amount, tx_hash, status, created_at)|
                 -> Result<TransactionRecord> {
                    Ok(TransactionRecord {
                        id,
                        wallet_id,
                        to_address: TronAddress::from_base58(&to_address)?,
                        asset: parse_asset(&symbol)?,
                        amount: u64::try_from(amount)?,
                        tx_hash,
                        status,
                        created_at,
                    })
                },
            )
            .collect()
    }

    async fn get_pending_virtual_transfers(&self, wallet_id: Uuid) -> Result<Vec<VirtualTransfer>> {
        let rows = sqlx::query_as::<_, VirtualTransferRow>(&format!(
            "SELECT {} FROM virtual_transfers
             WHERE wallet_id = $1 AND status = 'pending'
             ORDER BY created_at",
            VT_COLUMNS
        ))
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(virtual_transfer_from_row).collect()
    }

    async fn insert_virtual_transfer_within(
        &self,
        wallet_id: Uuid,
        amount: TokenAmount,
        ceiling: TokenAmount,
    ) -> Result<Option<VirtualTransfer>> {
        let mut tx = self.pool.begin().await?;

        // 锁住钱包行，串行化同一钱包的并发扣款
        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM wallets WHERE id = $1 FOR UPDATE")
                .bind(wallet_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            anyhow::bail!("wallet {} not found", wallet_id);
        }

        let (pending,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount_micros), 0)::BIGINT FROM virtual_transfers
             WHERE wallet_id = $1 AND status = 'pending'",
        )
        .bind(wallet_id)
        .fetch_one(&mut *tx)
        .await?;

        let pending = u64::try_from(pending).context("negative pending sum")?;
        let within = pending
            .checked_add(amount.micros())
            .map(|total| total <= ceiling.micros())
            .unwrap_or(false);
        if !within {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, VirtualTransferRow>(&format!(
            "INSERT INTO virtual_transfers (id, wallet_id, amount_micros, status, created_at)
             VALUES ($1, $2, $3, 'pending', NOW())
             RETURNING {}",
            VT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(wallet_id)
        .bind(to_i64(amount.micros())?)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        virtual_transfer_from_row(row).map(Some)
    }

    async fn mark_processed(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE virtual_transfers SET status = 'processed', processed_at = NOW()
             WHERE id = ANY($1) AND status = 'pending'",
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_balance(&self, wallet_id: Uuid, asset: Asset, amount: TokenAmount) -> Result<()> {
        sqlx::query(
            "INSERT INTO balances (wallet_id, token_symbol, amount, updated_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (wallet_id, token_symbol)
             DO UPDATE SET amount = EXCLUDED.amount, updated_at = NOW()",
        )
        .bind(wallet_id)
        .bind(asset_symbol(asset))
        .bind(amount.to_decimal())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_balance(&self, wallet_id: Uuid, asset: Asset) -> Result<Option<BalanceSnapshot>> {
        let row: Option<(Decimal, DateTime<Utc>)> = sqlx::query_as(
            "SELECT amount, updated_at FROM balances WHERE wallet_id = $1 AND token_symbol = $2",
        )
        .bind(wallet_id)
        .bind(asset_symbol(asset))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(amount, updated_at)| -> Result<BalanceSnapshot> {
            Ok(BalanceSnapshot {
                wallet_id,
                asset,
                amount: TokenAmount::from_decimal(amount)?,
                updated_at,
            })
        })
        .transpose()
    }
}
