//! 钱包服务：对外暴露的全部操作
//!
//! 提现流程：派生地址 -> USDT 余额预检 -> 能量估算 -> TRX 余额对比手续费上限
//! -> 构造 -> 签名 -> 广播。广播前的阶段受调用方截止时间约束；
//! 签好的交易交给独立任务广播，调用方取消不会中断广播。
//! 合约参数缺省时使用配置的 USDT 合约。
//! 托管钱包提现在钱包锁内对比可用余额（扣除 pending），广播后登记扣款。

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::{sleep, timeout, Instant};
use uuid::Uuid;

use crate::{
    config::Config,
    domain::{
        address::TronAddress,
        amount::{Asset, Sun, TokenAmount},
        keys::{derive_address, DerivedKey, PrivateKey},
        transaction::{SignedTransaction, TxState, TxStatus},
        wallet::{NewWallet, TransactionRecord, VirtualTransfer, Wallet},
    },
    error::TronError,
    infrastructure::log_redact::{redact_address, redact_hex_string},
    repository::WalletRepository,
    service::{
        balance_reader::BalanceReader,
        fee_estimator::{FeeEstimate, FeeEstimator},
        gateway::TronGateway,
        ledger_reconciler::{LedgerReconciler, SpendableBalance},
        transaction_builder::{sign_transaction, TransactionBuilder},
    },
};

/// 提现流程参数
#[derive(Debug, Clone)]
pub struct WithdrawSettings {
    pub deadline: Duration,
    pub topup_settle_delay: Duration,
    pub status_poll_interval: Duration,
    pub approve_fee_limit: Sun,
}

impl WithdrawSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            deadline: config.ledger.withdraw_deadline(),
            topup_settle_delay: Duration::from_secs(config.ledger.topup_settle_delay_secs),
            status_poll_interval: Duration::from_secs(config.ledger.status_poll_interval_secs),
            approve_fee_limit: Sun::new(config.fee.approve_fee_limit_sun),
        }
    }
}

/// 广播结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub txid: String,
    pub from: TronAddress,
    pub state: TxState,
    pub fee_limit: Option<Sun>,
}

/// 余额报告
#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    pub wallet_id: Uuid,
    pub address: TronAddress,
    pub real_balance: Decimal,
    pub pending_total: Decimal,
    pub available_balance: Decimal,
}

/// 手续费报价
#[derive(Debug, Clone, Serialize)]
pub struct FeeQuote {
    pub address: TronAddress,
    pub current_trx: Decimal,
    pub required_trx: Decimal,
    pub current_usdt: Decimal,
    pub sufficient_trx: bool,
    pub sufficient_usdt: bool,
    pub missing_trx: Decimal,
    pub energy: u64,
    pub energy_from_default: bool,
}

struct PreparedTransfer {
    from: TronAddress,
    signed: SignedTransaction,
    estimate: FeeEstimate,
}

pub struct WalletService {
    repo: Arc<dyn WalletRepository>,
    gateway: Arc<TronGateway>,
    balances: Arc<BalanceReader>,
    fees: FeeEstimator,
    builder: TransactionBuilder,
    ledger: LedgerReconciler,
    usdt_contract: TronAddress,
    display_decimals: u32,
    settings: WithdrawSettings,
}

impl WalletService {
    pub fn new(
        repo: Arc<dyn WalletRepository>,
        gateway: Arc<TronGateway>,
        config: &Config,
    ) -> Result<Self, TronError> {
        let usdt_contract = TronAddress::from_base58(&config.tron.usdt_contract)?;
        let balances = Arc::new(BalanceReader::new(gateway.clone()));
        Ok(Self {
            fees: FeeEstimator::new(gateway.clone(), config.fee.clone()),
            builder: TransactionBuilder::new(gateway.clone()),
            ledger: LedgerReconciler::new(
                repo.clone(),
                balances.clone(),
                usdt_contract,
                config.ledger.display_decimals,
            ),
            repo,
            gateway,
            balances,
            usdt_contract,
            display_decimals: config.ledger.display_decimals,
            settings: WithdrawSettings::from_config(config),
        })
    }

    pub fn settings(&self) -> &WithdrawSettings {
        &self.settings
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 钱包
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 私钥 -> 地址（纯计算）
    pub fn derive_wallet(&self, private_key_hex: &str) -> Result<DerivedKey, TronError> {
        derive_address(&PrivateKey::from_hex(private_key_hex)?)
    }

    /// 为用户生成托管钱包；已有钱包时直接返回
    pub async fn create_wallet(&self, owner_id: Uuid) -> Result<Wallet, TronError> {
        if let Some(existing) = self
            .repo
            .get_wallet_by_owner(owner_id)
            .await
            .map_err(TronError::repository)?
        {
            return Ok(existing);
        }

        let private_key = PrivateKey::generate();
        let derived = derive_address(&private_key)?;
        let wallet = self
            .repo
            .create_wallet(NewWallet {
                owner_id,
                address: derived.address,
                private_key,
            })
            .await
            .map_err(TronError::repository)?;

        tracing::info!(
            wallet_id = %wallet.id,
            owner_id = %owner_id,
            address = %redact_address(&wallet.address.to_base58()),
            "wallet created"
        );
        Ok(wallet)
    }

    pub async fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet, TronError> {
        self.repo
            .get_wallet_by_id(wallet_id)
            .await
            .map_err(TronError::repository)?
            .ok_or_else(|| TronError::WalletNotFound(wallet_id.to_string()))
    }

    pub async fn find_wallet_by_address(
        &self,
        address: &TronAddress,
    ) -> Result<Option<Wallet>, TronError> {
        self.repo
            .get_wallet_by_address(address)
            .await
            .map_err(TronError::repository)
    }

    pub async fn list_transactions(
        &self,
        wallet_id: Uuid,
    ) -> Result<Vec<TransactionRecord>, TronError> {
        self.repo
            .list_transactions(wallet_id)
            .await
            .map_err(TronError::repository)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 余额与账本
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn contract_or_default(&self, contract: Option<&TronAddress>) -> TronAddress {
        contract.copied().unwrap_or(self.usdt_contract)
    }

    pub async fn token_balance(
        &self,
        address: &TronAddress,
        contract: Option<&TronAddress>,
    ) -> Result<TokenAmount, TronError> {
        self.balances
            .get_token_balance(address, &self.contract_or_default(contract))
            .await
    }

    pub async fn native_balance(&self, address: &TronAddress) -> Result<Sun, TronError> {
        self.balances.get_native_balance(address).await
    }

    /// 链上余额 / 待结算 / 可用。默认 USDT 合约时把链上余额写入余额快照
    pub async fn check_balance(
        &self,
        wallet_id: Uuid,
        contract: Option<&TronAddress>,
    ) -> Result<BalanceReport, TronError> {
        let wallet = self.get_wallet(wallet_id).await?;
        self.report_balance(wallet, contract).await
    }

    /// 按地址查询托管钱包余额
    pub async fn check_balance_by_address(
        &self,
        address: &TronAddress,
        contract: Option<&TronAddress>,
    ) -> Result<BalanceReport, TronError> {
        let wallet = self
            .find_wallet_by_address(address)
            .await?
            .ok_or_else(|| TronError::WalletNotFound(address.to_base58()))?;
        self.report_balance(wallet, contract).await
    }

    async fn report_balance(
        &self,
        wallet: Wallet,
        contract: Option<&TronAddress>,
    ) -> Result<BalanceReport, TronError> {
        let contract = self.contract_or_default(contract);
        let balance = self.ledger.spendable_for(&wallet, &contract).await?;
        if self.ledger.tracks(&contract) {
            self.repo
                .update_balance(wallet.id, Asset::Usdt, balance.on_chain)
                .await
                .map_err(TronError::repository)?;
        }

        Ok(BalanceReport {
            wallet_id: wallet.id,
            address: wallet.address,
            real_balance: balance.on_chain.to_decimal(),
            pending_total: balance.pending.to_decimal(),
            available_balance: balance.spendable.to_decimal().round_dp(self.display_decimals),
        })
    }

    pub async fn spendable_balance(&self, wallet_id: Uuid) -> Result<SpendableBalance, TronError> {
        self.ledger.spendable_balance(wallet_id).await
    }

    pub async fn record_provisional_debit(
        &self,
        wallet_id: Uuid,
        amount: TokenAmount,
    ) -> Result<VirtualTransfer, TronError> {
        self.ledger.record_provisional_debit(wallet_id, amount).await
    }

    pub async fn settle(&self, ids: &[Uuid]) -> Result<u64, TronError> {
        self.ledger.settle(ids).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 手续费
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 发起一笔 USDT 转账所需 TRX 与当前余额对比
    pub async fn estimate_required_fee(
        &self,
        owner: &TronAddress,
        to: Option<&TronAddress>,
        amount: TokenAmount,
        contract: Option<&TronAddress>,
    ) -> Result<FeeQuote, TronError> {
        let to = to.unwrap_or(owner);
        let contract = self.contract_or_default(contract);
        let current_usdt = self.balances.get_token_balance(owner, &contract).await?;
        let estimate = self
            .fees
            .estimate_transfer(owner, &contract, to, amount)
            .await?;
        let current_trx = self.native_balance(owner).await?;

        Ok(FeeQuote {
            address: *owner,
            current_trx: current_trx.to_trx(),
            required_trx: estimate.fee_limit.to_trx(),
            current_usdt: current_usdt.to_decimal(),
            sufficient_trx: current_trx >= estimate.fee_limit,
            sufficient_usdt: current_usdt >= amount,
            missing_trx: estimate.fee_limit.saturating_sub(current_trx).to_trx(),
            energy: estimate.energy,
            energy_from_default: estimate.used_default,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 提现
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// TRC20 提现。`deadline` 只约束广播前的阶段，缺省用配置值
    pub async fn withdraw(
        &self,
        key: &PrivateKey,
        to: &TronAddress,
        amount: TokenAmount,
        contract: Option<&TronAddress>,
        deadline: Option<Duration>,
    ) -> Result<TransferReceipt, TronError> {
        if amount.is_zero() {
            return Err(TronError::InvalidAmount("withdrawal amount must be positive".into()));
        }
        let deadline = deadline.unwrap_or(self.settings.deadline);
        let contract = self.contract_or_default(contract);

        let prepared = timeout(deadline, self.prepare_withdrawal(key, to, amount, &contract))
            .await
            .map_err(|_| TronError::DeadlineExceeded("withdrawal preparation"))??;

        tracing::info!(
            from = %redact_address(&prepared.from.to_base58()),
            to = %redact_address(&to.to_base58()),
            amount = %amount,
            fee_limit_sun = prepared.estimate.fee_limit.as_sun(),
            txid = %redact_hex_string(prepared.signed.tx_id(), 8),
            "withdrawal signed, broadcasting"
        );

        let receipt = self.spawn_broadcast(prepared.signed).await?;
        Ok(TransferReceipt {
            txid: receipt,
            from: prepared.from,
            state: TxState::Broadcast,
            fee_limit: Some(prepared.estimate.fee_limit),
        })
    }

    /// 使用托管钱包的私钥提现，并写入提现记录。
    /// 钱包锁从可用余额检查一直持有到广播完成和扣款登记
    pub async fn withdraw_from_wallet(
        &self,
        wallet_id: Uuid,
        to: &TronAddress,
        amount: TokenAmount,
        contract: Option<&TronAddress>,
        gas_sponsor: Option<&PrivateKey>,
    ) -> Result<TransferReceipt, TronError> {
        if amount.is_zero() {
            return Err(TronError::InvalidAmount("withdrawal amount must be positive".into()));
        }
        let wallet = self.get_wallet(wallet_id).await?;
        let contract = self.contract_or_default(contract);

        let _guard = self.ledger.lock_wallet(wallet_id).await;
        let balance = self.ledger.spendable_for(&wallet, &contract).await?;
        if amount > balance.spendable {
            tracing::warn!(
                wallet_id = %wallet_id,
                spendable = %balance.spendable,
                pending = %balance.pending,
                requested = %amount,
                "withdrawal exceeds spendable balance"
            );
            return Err(TronError::InsufficientFunds {
                asset: Asset::Usdt,
                have: balance.spendable.to_decimal(),
                need: amount.to_decimal(),
            });
        }

        let receipt = match gas_sponsor {
            Some(sponsor) => {
                self.withdraw_with_gas_topup(
                    &wallet.private_key,
                    to,
                    amount,
                    Some(&contract),
                    Some(sponsor),
                    None,
                )
                .await?
            }
            None => {
                self.withdraw(&wallet.private_key, to, amount, Some(&contract), None)
                    .await?
            }
        };

        // 链上余额在确认前不变，扣款留在 pending 直到结算
        if self.ledger.tracks(&contract) {
            if let Err(e) = self
                .ledger
                .record_debit_locked(wallet_id, amount, &balance)
                .await
            {
                tracing::error!(wallet_id = %wallet_id, txid = %receipt.txid, error = %e, "failed to record withdrawal debit");
            }
        }

        let record = TransactionRecord {
            id: Uuid::new_v4(),
            wallet_id,
            to_address: *to,
            asset: Asset::Usdt,
            amount: amount.micros(),
            tx_hash: receipt.txid.clone(),
            status: "broadcast".to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.repo.record_transaction(record).await {
            // 交易已上链，记录失败不能让调用方重试提现
            tracing::error!(wallet_id = %wallet_id, txid = %receipt.txid, error = %e, "failed to record withdrawal");
        }
        Ok(receipt)
    }

    async fn prepare_withdrawal(
        &self,
        key: &PrivateKey,
        to: &TronAddress,
        amount: TokenAmount,
        contract: &TronAddress,
    ) -> Result<PreparedTransfer, TronError> {
        let from = derive_address(key)?.address;

        let usdt = self.balances.get_token_balance(&from, contract).await?;
        if usdt < amount {
            return Err(TronError::InsufficientFunds {
                asset: Asset::Usdt,
                have: usdt.to_decimal(),
                need: amount.to_decimal(),
            });
        }

        let estimate = self
            .fees
            .estimate_transfer(&from, contract, to, amount)
            .await?;

        let trx = self.native_balance(&from).await?;
        if trx < estimate.fee_limit {
            return Err(TronError::InsufficientFunds {
                asset: Asset::Trx,
                have: trx.to_trx(),
                need: estimate.fee_limit.to_trx(),
            });
        }

        let unsigned = self
            .builder
            .build_transfer(&from, contract, to, amount, estimate.fee_limit)
            .await?;
        let signed = sign_transaction(unsigned, key)?;

        Ok(PreparedTransfer {
            from,
            signed,
            estimate,
        })
    }

    /// TRX 不足以支付手续费上限时，先由赞助账户补足（差额 + 1 TRX），
    /// 等待到账后再提现。没有赞助账户时返回 TRX 不足
    pub async fn withdraw_with_gas_topup(
        &self,
        key: &PrivateKey,
        to: &TronAddress,
        amount: TokenAmount,
        contract: Option<&TronAddress>,
        sponsor: Option<&PrivateKey>,
        deadline: Option<Duration>,
    ) -> Result<TransferReceipt, TronError> {
        let deadline = deadline.unwrap_or(self.settings.deadline);
        let contract = self.contract_or_default(contract);
        let started = Instant::now();

        timeout(deadline, self.ensure_gas(key, to, amount, &contract, sponsor))
            .await
            .map_err(|_| TronError::DeadlineExceeded("gas top-up"))??;

        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(TronError::DeadlineExceeded("gas top-up"));
        }
        self.withdraw(key, to, amount, Some(&contract), Some(remaining))
            .await
    }

    async fn ensure_gas(
        &self,
        key: &PrivateKey,
        to: &TronAddress,
        amount: TokenAmount,
        contract: &TronAddress,
        sponsor: Option<&PrivateKey>,
    ) -> Result<(), TronError> {
        let from = derive_address(key)?.address;

        let usdt = self.balances.get_token_balance(&from, contract).await?;
        if usdt < amount {
            return Err(TronError::InsufficientFunds {
                asset: Asset::Usdt,
                have: usdt.to_decimal(),
                need: amount.to_decimal(),
            });
        }

        let estimate = self
            .fees
            .estimate_transfer(&from, contract, to, amount)
            .await?;
        let have = self.native_balance(&from).await?;
        if have >= estimate.fee_limit {
            return Ok(());
        }

        let Some(sponsor) = sponsor else {
            return Err(TronError::InsufficientFunds {
                asset: Asset::Trx,
                have: have.to_trx(),
                need: estimate.fee_limit.to_trx(),
            });
        };

        let topup = estimate
            .fee_limit
            .saturating_sub(have)
            .saturating_add(Sun::from_trx(1));
        tracing::info!(
            to = %redact_address(&from.to_base58()),
            topup_sun = topup.as_sun(),
            "topping up gas from sponsor"
        );
        self.send_native(sponsor, &from, topup).await?;

        sleep(self.settings.topup_settle_delay).await;

        let after = self.native_balance(&from).await?;
        if after < estimate.fee_limit {
            return Err(TronError::InsufficientFunds {
                asset: Asset::Trx,
                have: after.to_trx(),
                need: estimate.fee_limit.to_trx(),
            });
        }
        Ok(())
    }

    /// TRC20 approve
    pub async fn approve(
        &self,
        key: &PrivateKey,
        spender: &TronAddress,
        amount: TokenAmount,
    ) -> Result<TransferReceipt, TronError> {
        let from = derive_address(key)?.address;
        let fee_limit = self.settings.approve_fee_limit;

        let trx = self.native_balance(&from).await?;
        if trx < fee_limit {
            return Err(TronError::InsufficientFunds {
                asset: Asset::Trx,
                have: trx.to_trx(),
                need: fee_limit.to_trx(),
            });
        }

        let unsigned = self
            .builder
            .build_approve(&from, &self.usdt_contract, spender, amount, fee_limit)
            .await?;
        let signed = sign_transaction(unsigned, key)?;
        let txid = self.spawn_broadcast(signed).await?;
        tracing::info!(spender = %redact_address(&spender.to_base58()), amount = %amount, "approve broadcast");

        Ok(TransferReceipt {
            txid,
            from,
            state: TxState::Broadcast,
            fee_limit: Some(fee_limit),
        })
    }

    /// TRX 原生转账
    pub async fn send_native(
        &self,
        key: &PrivateKey,
        to: &TronAddress,
        amount: Sun,
    ) -> Result<TransferReceipt, TronError> {
        if amount.is_zero() {
            return Err(TronError::InvalidAmount("TRX amount must be positive".into()));
        }
        let from = derive_address(key)?.address;

        let have = self.native_balance(&from).await?;
        if have < amount {
            return Err(TronError::InsufficientFunds {
                asset: Asset::Trx,
                have: have.to_trx(),
                need: amount.to_trx(),
            });
        }

        let unsigned = self.builder.build_native_transfer(&from, to, amount).await?;
        let signed = sign_transaction(unsigned, key)?;
        let txid = self.spawn_broadcast(signed).await?;

        Ok(TransferReceipt {
            txid,
            from,
            state: TxState::Broadcast,
            fee_limit: None,
        })
    }

    /// 广播在独立任务中执行，调用方放弃等待不会取消它
    async fn spawn_broadcast(&self, signed: SignedTransaction) -> Result<String, TronError> {
        let gateway = self.gateway.clone();
        let handle = tokio::spawn(async move { gateway.broadcast_transaction(&signed).await });
        let receipt = handle
            .await
            .map_err(|e| TronError::BroadcastFailed(format!("broadcast task aborted: {}", e)))??;
        Ok(receipt.txid)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 交易状态
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn transaction_status(&self, txid: &str) -> Result<TxStatus, TronError> {
        let Some(tx) = self.gateway.get_transaction_by_id(txid).await? else {
            return Ok(TxStatus::NotFound);
        };
        let status = match tx.ret.first().and_then(|r| r.contract_ret.as_deref()) {
            Some("SUCCESS") => TxStatus::Confirmed,
            None | Some("") => TxStatus::Pending,
            Some(other) => TxStatus::Failed(other.to_string()),
        };
        Ok(status)
    }

    /// 轮询直到终态或超时；超时返回最后一次观察到的状态
    pub async fn wait_for_confirmation(
        &self,
        txid: &str,
        max_wait: Duration,
    ) -> Result<TxStatus, TronError> {
        let started = Instant::now();
        loop {
            let status = self.transaction_status(txid).await?;
            if status.is_final() || started.elapsed() >= max_wait {
                return Ok(status);
            }
            sleep(self.settings.status_poll_interval).await;
        }
    }
}
