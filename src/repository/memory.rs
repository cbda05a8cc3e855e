// 内存 Repository：测试与无数据库运行时使用

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    domain::{
        address::TronAddress,
        amount::{Asset, TokenAmount},
        wallet::{
            BalanceSnapshot, NewWallet, TransactionRecord, VirtualTransfer, VirtualTransferStatus,
            Wallet,
        },
    },
    repository::wallet_repository::WalletRepository,
};

#[derive(Default)]
struct Tables {
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<TransactionRecord>,
    virtual_transfers: Vec<VirtualTransfer>,
    balances: HashMap<(Uuid, Asset), BalanceSnapshot>,
}

#[derive(Default)]
pub struct MemoryWalletRepository {
    tables: RwLock<Tables>,
}

impl MemoryWalletRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletRepository for MemoryWalletRepository {
    async fn create_wallet(&self, wallet: NewWallet) -> Result<Wallet> {
        let mut tables = self.tables.write().await;
        if tables.wallets.values().any(|w| w.owner_id == wallet.owner_id) {
            anyhow::bail!("owner {} already has a wallet", wallet.owner_id);
        }
        if tables.wallets.values().any(|w| w.address == wallet.address) {
            anyhow::bail!("address {} already registered", wallet.address);
        }
        let created = Wallet {
            id: Uuid::new_v4(),
            owner_id: wallet.owner_id,
            address: wallet.address,
            private_key: wallet.private_key,
            created_at: Utc::now(),
        };
        tables.wallets.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_wallet_by_id(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        Ok(self.tables.read().await.wallets.get(&wallet_id).cloned())
    }

    async fn get_wallet_by_address(&self, address: &TronAddress) -> Result<Option<Wallet>> {
        let tables = self.tables.read().await;
        Ok(tables.wallets.values().find(|w| &w.address == address).cloned())
    }

    async fn get_wallet_by_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>> {
        let tables = self.tables.read().await;
        Ok(tables.wallets.values().find(|w| w.owner_id == owner_id).cloned())
    }

    async fn record_transaction(&self, record: TransactionRecord) -> Result<()> {
        self.tables.write().await.transactions.push(record);
        Ok(())
    }

    async fn list_transactions(&self, wallet_id: Uuid) -> Result<Vec<TransactionRecord>> {
        let tables = self.tables.read().await;
        let mut out: Vec<_> = tables
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn get_pending_virtual_transfers(&self, wallet_id: Uuid) -> Result<Vec<VirtualTransfer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .virtual_transfers
            .iter()
            .filter(|v| v.wallet_id == wallet_id && v.status == VirtualTransferStatus::Pending)
            .cloned()
            .collect())
    }

    async fn insert_virtual_transfer_within(
        &self,
        wallet_id: Uuid,
        amount: TokenAmount,
        ceiling: TokenAmount,
    ) -> Result<Option<VirtualTransfer>> {
        // 写锁覆盖求和与插入
        let mut tables = self.tables.write().await;
        if !tables.wallets.contains_key(&wallet_id) {
            anyhow::bail!("wallet {} not found", wallet_id);
        }
        let pending: TokenAmount = tables
            .virtual_transfers
            .iter()
            .filter(|v| v.wallet_id == wallet_id && v.status == VirtualTransferStatus::Pending)
            .map(|v| v.amount)
            .sum();
        match pending.checked_add(amount) {
            Some(total) if total <= ceiling => {}
            _ => return Ok(None),
        }

        let transfer = VirtualTransfer {
            id: Uuid::new_v4(),
            wallet_id,
            amount,
            status: VirtualTransferStatus::Pending,
            created_at: Utc::now(),
            processed_at: None,
        };
        tables.virtual_transfers.push(transfer.clone());
        Ok(Some(transfer))
    }

    async fn mark_processed(&self, ids: &[Uuid]) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut changed = 0;
        for vt in tables
            .virtual_transfers
            .iter_mut()
            .filter(|v| ids.contains(&v.id) && v.status == VirtualTransferStatus::Pending)
        {
            vt.status = VirtualTransferStatus::Processed;
            vt.processed_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn update_balance(&self, wallet_id: Uuid, asset: Asset, amount: TokenAmount) -> Result<()> {
        self.tables.write().await.balances.insert(
            (wallet_id, asset),
            BalanceSnapshot {
                wallet_id,
                asset,
                amount,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_balance(&self, wallet_id: Uuid, asset: Asset) -> Result<Option<BalanceSnapshot>> {
        Ok(self.tables.read().await.balances.get(&(wallet_id, asset)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::{derive_address, PrivateKey};

    async fn seeded() -> (MemoryWalletRepository, Uuid) {
        let repo = MemoryWalletRepository::new();
        let key = PrivateKey::generate();
        let address = derive_address(&key).unwrap().address;
        let wallet = repo
            .create_wallet(NewWallet {
                owner_id: Uuid::new_v4(),
                address,
                private_key: key,
            })
            .await
            .unwrap();
        (repo, wallet.id)
    }

    #[tokio::test]
    async fn test_conditional_insert_respects_ceiling() {
        let (repo, id) = seeded().await;
        let ceiling = TokenAmount::from_micros(10_000_000);

        let first = repo
            .insert_virtual_transfer_within(id, TokenAmount::from_micros(6_000_000), ceiling)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = repo
            .insert_virtual_transfer_within(id, TokenAmount::from_micros(5_000_000), ceiling)
            .await
            .unwrap();
        assert!(second.is_none());

        let third = repo
            .insert_virtual_transfer_within(id, TokenAmount::from_micros(4_000_000), ceiling)
            .await
            .unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn test_mark_processed_is_one_way() {
        let (repo, id) = seeded().await;
        let vt = repo
            .insert_virtual_transfer_within(
                id,
                TokenAmount::from_micros(1),
                TokenAmount::from_micros(10),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(repo.mark_processed(&[vt.id]).await.unwrap(), 1);
        assert_eq!(repo.mark_processed(&[vt.id]).await.unwrap(), 0);
        assert!(repo.get_pending_virtual_transfers(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_wallet_per_owner() {
        let repo = MemoryWalletRepository::new();
        let owner = Uuid::new_v4();
        for expect_ok in [true, false] {
            let key = PrivateKey::generate();
            let address = derive_address(&key).unwrap().address;
            let res = repo
                .create_wallet(NewWallet {
                    owner_id: owner,
                    address,
                    private_key: key,
                })
                .await;
            assert_eq!(res.is_ok(), expect_ok);
        }
    }
}
