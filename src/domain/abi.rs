//! TRC20 调用数据编码
//!
//! 选择器 = Keccak256(函数签名)[..4]；参数为 32 字节左补零的字。
//! 地址参数只取去掉 0x41 后的 20 字节。

use rust_decimal::Decimal;
use sha3::{Digest, Keccak256};

use crate::{
    domain::{address::TronAddress, amount::TokenAmount},
    error::TronError,
};

pub const TRANSFER_SIGNATURE: &str = "transfer(address,uint256)";
pub const APPROVE_SIGNATURE: &str = "approve(address,uint256)";
pub const BALANCE_OF_SIGNATURE: &str = "balanceOf(address)";

const WORD: usize = 32;

/// 一次合约调用：函数签名 + 参数块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub function: &'static str,
    pub args: Vec<u8>,
}

impl ContractCall {
    pub fn selector(&self) -> [u8; 4] {
        selector(self.function)
    }

    /// 网关 `parameter` 字段
    pub fn parameter_hex(&self) -> String {
        hex::encode(&self.args)
    }

    /// selector ‖ args
    pub fn data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.args.len());
        out.extend_from_slice(&self.selector());
        out.extend_from_slice(&self.args);
        out
    }
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn push_address(buf: &mut Vec<u8>, address: &TronAddress) {
    buf.extend_from_slice(&[0u8; WORD - 20]);
    buf.extend_from_slice(address.body());
}

fn push_uint(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&[0u8; WORD - 8]);
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn transfer_call(to: &TronAddress, amount: TokenAmount) -> ContractCall {
    let mut args = Vec::with_capacity(WORD * 2);
    push_address(&mut args, to);
    push_uint(&mut args, amount.micros());
    ContractCall {
        function: TRANSFER_SIGNATURE,
        args,
    }
}

pub fn approve_call(spender: &TronAddress, amount: TokenAmount) -> ContractCall {
    let mut args = Vec::with_capacity(WORD * 2);
    push_address(&mut args, spender);
    push_uint(&mut args, amount.micros());
    ContractCall {
        function: APPROVE_SIGNATURE,
        args,
    }
}

pub fn balance_of_call(owner: &TronAddress) -> ContractCall {
    let mut args = Vec::with_capacity(WORD);
    push_address(&mut args, owner);
    ContractCall {
        function: BALANCE_OF_SIGNATURE,
        args,
    }
}

fn parse_args(address: &str, amount: Decimal) -> Result<(TronAddress, TokenAmount), TronError> {
    let address = TronAddress::from_base58(address)
        .map_err(|e| TronError::InvalidArgument(e.to_string()))?;
    let amount =
        TokenAmount::from_decimal(amount).map_err(|e| TronError::InvalidArgument(e.to_string()))?;
    Ok((address, amount))
}

/// 文本地址 + 十进制金额 -> transfer 调用
pub fn encode_transfer(to: &str, amount: Decimal) -> Result<ContractCall, TronError> {
    let (to, amount) = parse_args(to, amount)?;
    Ok(transfer_call(&to, amount))
}

pub fn encode_approve(spender: &str, amount: Decimal) -> Result<ContractCall, TronError> {
    let (spender, amount) = parse_args(spender, amount)?;
    Ok(approve_call(&spender, amount))
}

pub fn encode_balance_of(owner: &str) -> Result<ContractCall, TronError> {
    let owner = TronAddress::from_base58(owner)
        .map_err(|e| TronError::InvalidArgument(e.to_string()))?;
    Ok(balance_of_call(&owner))
}

/// 解析 `constant_result` 中的 uint256 返回字。高位非零视为溢出
pub fn decode_uint_word(word_hex: &str) -> Result<u64, TronError> {
    let bytes = hex::decode(word_hex.trim())
        .map_err(|e| TronError::MalformedResponse(format!("constant_result: {}", e)))?;
    if bytes.is_empty() || bytes.len() > WORD {
        return Err(TronError::MalformedResponse(format!(
            "constant_result has {} bytes",
            bytes.len()
        )));
    }
    let split = bytes.len().saturating_sub(8);
    if bytes[..split].iter().any(|b| *b != 0) {
        return Err(TronError::MalformedResponse(
            "uint256 value exceeds u64".into(),
        ));
    }
    let mut low = [0u8; 8];
    low[8 - (bytes.len() - split)..].copy_from_slice(&bytes[split..]);
    Ok(u64::from_be_bytes(low))
}
