//! 私钥与地址派生
//!
//! 一个私钥只对应一个地址（不做 HD 派生）：
//! secp256k1 私钥 -> 未压缩公钥(去掉 0x04) -> Keccak256 -> 取后 20 字节 -> 前置 0x41

use std::fmt;

use k256::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::{domain::address::TronAddress, error::TronError};

pub const PRIVATE_KEY_LEN: usize = 32;

/// 托管私钥。Drop 时清零，Debug 不输出内容
#[derive(Clone)]
pub struct PrivateKey(Zeroizing<[u8; PRIVATE_KEY_LEN]>);

impl PrivateKey {
    /// 解析十六进制私钥，校验标量在曲线阶以内且非零
    pub fn from_hex(text: &str) -> Result<Self, TronError> {
        let trimmed = text.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if trimmed.len() != PRIVATE_KEY_LEN * 2 {
            return Err(TronError::InvalidPrivateKey(format!(
                "expected {} hex chars, got {}",
                PRIVATE_KEY_LEN * 2,
                trimmed.len()
            )));
        }
        let mut bytes = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
        hex::decode_to_slice(trimmed, bytes.as_mut())
            .map_err(|e| TronError::InvalidPrivateKey(e.to_string()))?;
        Self::from_bytes(*bytes)
    }

    pub fn from_bytes(bytes: [u8; PRIVATE_KEY_LEN]) -> Result<Self, TronError> {
        let key = Self(Zeroizing::new(bytes));
        key.signing_key()?;
        Ok(key)
    }

    /// 生成新的随机私钥
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let mut bytes = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
        bytes.copy_from_slice(&signing_key.to_bytes());
        Self(bytes)
    }

    pub fn signing_key(&self) -> Result<SigningKey, TronError> {
        SigningKey::from_slice(self.0.as_ref())
            .map_err(|_| TronError::InvalidPrivateKey("scalar out of range".into()))
    }

    /// 仅用于持久化，调用方负责不要记录日志
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0.as_ref()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// 派生结果
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub address: TronAddress,
    pub verifying_key: VerifyingKey,
}

impl DerivedKey {
    pub fn address_text(&self) -> String {
        self.address.to_base58()
    }

    pub fn address_hex(&self) -> String {
        self.address.to_hex()
    }

    /// 65 字节未压缩公钥的十六进制
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.to_encoded_point(false).as_bytes())
    }
}

/// 公钥 -> TRON 地址
pub fn address_from_verifying_key(key: &VerifyingKey) -> TronAddress {
    let point = key.to_encoded_point(false);
    // 跳过 0x04 标记字节，对 x‖y 做 Keccak256
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut body = [0u8; 20];
    body.copy_from_slice(&hash[12..]);
    TronAddress::from_body(body)
}

pub fn derive_address(key: &PrivateKey) -> Result<DerivedKey, TronError> {
    let signing_key = key.signing_key()?;
    let verifying_key = *signing_key.verifying_key();
    Ok(DerivedKey {
        address: address_from_verifying_key(&verifying_key),
        verifying_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_golden_vector_key_one() {
        let key = PrivateKey::from_hex(KEY_ONE).unwrap();
        let derived = derive_address(&key).unwrap();
        assert_eq!(derived.address_text(), "TMVQGm1qAQYVdetCeGRRkTWYYrLXuHK2HC");
        assert_eq!(
            derived.address_hex(),
            "417e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
        assert!(derived.public_key_hex().starts_with("0479be667e"));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let key = PrivateKey::generate();
        let a = derive_address(&key).unwrap();
        let b = derive_address(&PrivateKey::from_hex(&key.to_hex()).unwrap()).unwrap();
        assert_eq!(a.address, b.address);
    }

    #[test]
    fn test_rejects_invalid_keys() {
        let zero = "00".repeat(32);
        // secp256k1 曲线阶 n
        let order = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";
        let not_hex = "zz".repeat(32);
        for bad in [zero.as_str(), order, "abcd", not_hex.as_str()] {
            assert!(
                matches!(PrivateKey::from_hex(bad), Err(TronError::InvalidPrivateKey(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = PrivateKey::from_hex(KEY_ONE).unwrap();
        let out = format!("{:?}", key);
        assert!(!out.contains("0001"));
        assert!(out.contains("redacted"));
    }
}
