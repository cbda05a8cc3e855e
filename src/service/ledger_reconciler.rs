// 账本对账：链上余额 - 未结算的虚拟扣款 = 可用余额
//
// 扣款准入两道保护：进程内按钱包加锁，仓储层条件写入（Σpending + amount <= 链上余额）。
// 托管提现也在同一把锁下比较可用余额，并在广播后登记扣款

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    domain::{
        address::TronAddress,
        amount::TokenAmount,
        wallet::{VirtualTransfer, Wallet},
    },
    error::TronError,
    infrastructure::wallet_locks::{WalletLockGuard, WalletLocks},
    repository::WalletRepository,
    service::balance_reader::BalanceReader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpendableBalance {
    pub on_chain: TokenAmount,
    pub pending: TokenAmount,
    pub spendable: TokenAmount,
}

pub struct LedgerReconciler {
    repo: Arc<dyn WalletRepository>,
    balances: Arc<BalanceReader>,
    locks: WalletLocks,
    usdt_contract: TronAddress,
    display_decimals: u32,
}

impl LedgerReconciler {
    pub fn new(
        repo: Arc<dyn WalletRepository>,
        balances: Arc<BalanceReader>,
        usdt_contract: TronAddress,
        display_decimals: u32,
    ) -> Self {
        Self {
            repo,
            balances,
            locks: WalletLocks::new(),
            usdt_contract,
            display_decimals,
        }
    }

    async fn load_wallet(&self, wallet_id: Uuid) -> Result<Wallet, TronError> {
        self.repo
            .get_wallet_by_id(wallet_id)
            .await
            .map_err(TronError::repository)?
            .ok_or_else(|| TronError::WalletNotFound(wallet_id.to_string()))
    }

    /// 钱包锁；持有期间同一钱包的扣款准入与托管提现串行执行
    pub async fn lock_wallet(&self, wallet_id: Uuid) -> WalletLockGuard {
        self.locks.acquire(wallet_id).await
    }

    /// 链上余额减去所有 pending 扣款，向下截断到展示精度
    pub async fn spendable_balance(&self, wallet_id: Uuid) -> Result<SpendableBalance, TronError> {
        let wallet = self.load_wallet(wallet_id).await?;
        self.spendable_for(&wallet, &self.usdt_contract).await
    }

    /// 指定合约的可用余额。虚拟扣款只记在默认 USDT 合约上，
    /// 其他合约的 pending 恒为 0
    pub async fn spendable_for(
        &self,
        wallet: &Wallet,
        contract: &TronAddress,
    ) -> Result<SpendableBalance, TronError> {
        let on_chain = self
            .balances
            .get_token_balance(&wallet.address, contract)
            .await?;
        let pending: TokenAmount = if self.tracks(contract) {
            self.repo
                .get_pending_virtual_transfers(wallet.id)
                .await
                .map_err(TronError::repository)?
                .into_iter()
                .map(|vt| vt.amount)
                .sum()
        } else {
            TokenAmount::ZERO
        };

        Ok(SpendableBalance {
            on_chain,
            pending,
            spendable: on_chain
                .saturating_sub(pending)
                .floor_to(self.display_decimals),
        })
    }

    /// 账本是否跟踪该合约
    pub fn tracks(&self, contract: &TronAddress) -> bool {
        *contract == self.usdt_contract
    }

    pub async fn record_provisional_debit(
        &self,
        wallet_id: Uuid,
        amount: TokenAmount,
    ) -> Result<VirtualTransfer, TronError> {
        if amount.is_zero() {
            return Err(TronError::InvalidAmount("debit amount must be positive".into()));
        }

        let _guard = self.lock_wallet(wallet_id).await;
        let balance = self.spendable_balance(wallet_id).await?;
        self.record_debit_locked(wallet_id, amount, &balance).await
    }

    /// 调用方已持有钱包锁并读过余额时登记扣款
    pub async fn record_debit_locked(
        &self,
        wallet_id: Uuid,
        amount: TokenAmount,
        balance: &SpendableBalance,
    ) -> Result<VirtualTransfer, TronError> {
        if amount > balance.spendable {
            tracing::warn!(
                wallet_id = %wallet_id,
                spendable = %balance.spendable,
                requested = %amount,
                "provisional debit rejected"
            );
            return Err(TronError::LedgerConflict {
                have: balance.spendable.to_decimal(),
                need: amount.to_decimal(),
            });
        }

        let inserted = self
            .repo
            .insert_virtual_transfer_within(wallet_id, amount, balance.on_chain)
            .await
            .map_err(TronError::repository)?;

        match inserted {
            Some(vt) => {
                tracing::info!(
                    wallet_id = %wallet_id,
                    virtual_transfer_id = %vt.id,
                    amount = %amount,
                    "provisional debit recorded"
                );
                Ok(vt)
            }
            // 另一个实例抢先写入
            None => Err(TronError::LedgerConflict {
                have: balance.spendable.to_decimal(),
                need: amount.to_decimal(),
            }),
        }
    }

    /// 结算：pending -> processed，不可逆
    pub async fn settle(&self, ids: &[Uuid]) -> Result<u64, TronError> {
        let settled = self
            .repo
            .mark_processed(ids)
            .await
            .map_err(TronError::repository)?;
        tracing::info!(requested = ids.len(), settled, "virtual transfers settled");
        Ok(settled)
    }
}
