// 能量/手续费估算
//
// 1. 常量调用模拟 transfer，读取能量消耗
// 2. 没有可用数字（缺失、为 0、回滚、被拒绝）时用默认能量
// 3. fee = energy * 单价；乘缓冲系数；夹到 [min, max]
// 只有模拟调用在重试耗尽后仍传输失败，才返回 EstimationUnavailable

use std::sync::Arc;

use serde::Serialize;

use crate::{
    config::FeeConfig,
    domain::{
        abi::transfer_call,
        address::TronAddress,
        amount::{Sun, TokenAmount},
    },
    error::TronError,
    service::gateway::TronGateway,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeEstimate {
    pub energy: u64,
    /// 能量来自默认值而非模拟结果
    pub used_default: bool,
    pub fee: Sun,
    pub buffered_fee: Sun,
    pub fee_limit: Sun,
}

pub struct FeeEstimator {
    gateway: Arc<TronGateway>,
    config: FeeConfig,
}

impl FeeEstimator {
    pub fn new(gateway: Arc<TronGateway>, config: FeeConfig) -> Self {
        Self { gateway, config }
    }

    /// 纯计算：能量 -> 手续费上限
    pub fn fee_for_energy(&self, energy: u64, used_default: bool) -> FeeEstimate {
        let fee = Sun::new(energy.saturating_mul(self.config.energy_price_sun));
        let buffered_fee = fee.mul_bps_ceil(self.config.buffer_bps);
        let fee_limit = buffered_fee.clamp(self.config.min_fee_limit(), self.config.max_fee_limit());
        FeeEstimate {
            energy,
            used_default,
            fee,
            buffered_fee,
            fee_limit,
        }
    }

    pub async fn estimate_transfer(
        &self,
        owner: &TronAddress,
        contract: &TronAddress,
        to: &TronAddress,
        amount: TokenAmount,
    ) -> Result<FeeEstimate, TronError> {
        let call = transfer_call(to, amount);
        let simulated = match self.gateway.trigger_constant_contract(owner, contract, &call).await {
            Ok(resp) if resp.reverted() => {
                tracing::warn!(owner = %owner, "transfer simulation reverted, using default energy");
                None
            }
            Ok(resp) => resp.energy(),
            Err(TronError::GatewayTransport(msg)) => {
                return Err(TronError::EstimationUnavailable(msg));
            }
            Err(e) => {
                tracing::warn!(owner = %owner, error = %e, "energy simulation unusable, using default energy");
                None
            }
        };

        let estimate = match simulated {
            Some(energy) => self.fee_for_energy(energy, false),
            None => {
                tracing::warn!(
                    default_energy = self.config.default_energy,
                    "no energy figure from gateway, falling back to default"
                );
                self.fee_for_energy(self.config.default_energy, true)
            }
        };

        tracing::debug!(
            energy = estimate.energy,
            fee_sun = estimate.fee.as_sun(),
            fee_limit_sun = estimate.fee_limit.as_sun(),
            "fee estimated"
        );
        Ok(estimate)
    }
}
