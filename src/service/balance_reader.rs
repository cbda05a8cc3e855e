// 链上余额读取
//
// - USDT：balanceOf 常量调用，解析返回字；端点出错或返回空时换下一个
// - TRX：按端点顺序查询账户；某个端点报 0 时继续问下一个（索引延迟），
//   取第一个正数；全部报 0 则为 0，全部失败才返回错误

use std::sync::Arc;

use crate::{
    domain::{
        abi::{balance_of_call, decode_uint_word},
        address::TronAddress,
        amount::{Sun, TokenAmount},
    },
    error::TronError,
    service::gateway::TronGateway,
};

pub struct BalanceReader {
    gateway: Arc<TronGateway>,
}

impl BalanceReader {
    pub fn new(gateway: Arc<TronGateway>) -> Self {
        Self { gateway }
    }

    /// 按端点顺序读取；传输失败、空结果或结构异常时换下一个端点，
    /// 全部失败才返回最后一个错误
    pub async fn get_token_balance(
        &self,
        address: &TronAddress,
        contract: &TronAddress,
    ) -> Result<TokenAmount, TronError> {
        let call = balance_of_call(address);
        let mut last_error = None;

        for base in self.gateway.endpoints() {
            let result = self
                .gateway
                .trigger_constant_contract_at(base, address, contract, &call)
                .await
                .and_then(|resp| {
                    let word = resp
                        .constant_result
                        .first()
                        .filter(|w| !w.trim().is_empty())
                        .ok_or(TronError::EmptyResult)?;
                    decode_uint_word(word)
                });

            match result {
                Ok(micros) => return Ok(TokenAmount::from_micros(micros)),
                Err(
                    e @ (TronError::GatewayTransport(_)
                    | TronError::EmptyResult
                    | TronError::MalformedResponse(_)),
                ) => {
                    tracing::warn!(endpoint = %base, error = %e, "USDT balance source failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| TronError::GatewayTransport("no balance source configured".into())))
    }

    pub async fn get_native_balance(&self, address: &TronAddress) -> Result<Sun, TronError> {
        let endpoints = self.gateway.endpoints();
        let mut answered = false;
        let mut last_error = None;

        for (idx, base) in endpoints.iter().enumerate() {
            match self.gateway.get_account(base, address).await {
                Ok(account) if account.balance > 0 => {
                    return Ok(Sun::new(account.balance));
                }
                Ok(_) => {
                    answered = true;
                    if idx + 1 < endpoints.len() {
                        tracing::debug!(endpoint = %base, "zero TRX balance reported, checking next source");
                    }
                }
                Err(e) => {
                    tracing::warn!(endpoint = %base, error = %e, "TRX balance source failed");
                    last_error = Some(e);
                }
            }
        }

        if answered {
            Ok(Sun::ZERO)
        } else {
            Err(last_error
                .unwrap_or_else(|| TronError::GatewayTransport("no balance source configured".into())))
        }
    }
}
