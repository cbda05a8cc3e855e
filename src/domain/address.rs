//! TRON 地址编解码
//!
//! - raw：21 字节，`0x41` + 20 字节哈希体
//! - text：Base58(raw ‖ SHA256(SHA256(raw))[..4])，解码后必须正好 25 字节
//! - hex：raw 的小写十六进制（网关 `visible=false` 时使用）

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::TronError;

/// 主网地址版本字节
pub const ADDRESS_PREFIX: u8 = 0x41;
pub const RAW_ADDRESS_LEN: usize = 21;
const CHECKSUM_LEN: usize = 4;
const ENCODED_LEN: usize = RAW_ADDRESS_LEN + CHECKSUM_LEN;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TronAddress([u8; RAW_ADDRESS_LEN]);

fn checksum(raw: &[u8]) -> [u8; CHECKSUM_LEN] {
    let first = Sha256::digest(raw);
    let second = Sha256::digest(first);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&second[..CHECKSUM_LEN]);
    out
}

/// raw(21) -> Base58Check 文本
pub fn encode(raw: &[u8; RAW_ADDRESS_LEN]) -> String {
    let mut buf = Vec::with_capacity(ENCODED_LEN);
    buf.extend_from_slice(raw);
    buf.extend_from_slice(&checksum(raw));
    bs58::encode(buf).into_string()
}

/// Base58Check 文本 -> raw(21)
pub fn decode(text: &str) -> Result<[u8; RAW_ADDRESS_LEN], TronError> {
    let bytes = bs58::decode(text.trim())
        .into_vec()
        .map_err(|e| TronError::InvalidAddress(format!("{}: {}", text, e)))?;
    if bytes.len() != ENCODED_LEN {
        return Err(TronError::InvalidAddress(format!(
            "{}: decoded to {} bytes, expected {}",
            text,
            bytes.len(),
            ENCODED_LEN
        )));
    }
    let (raw, sum) = bytes.split_at(RAW_ADDRESS_LEN);
    if checksum(raw) != sum {
        return Err(TronError::InvalidAddress(format!("{}: checksum mismatch", text)));
    }
    let mut out = [0u8; RAW_ADDRESS_LEN];
    out.copy_from_slice(raw);
    Ok(out)
}

impl TronAddress {
    /// 从 20 字节哈希体构造（派生路径使用，版本字节固定）
    pub fn from_body(body: [u8; 20]) -> Self {
        let mut raw = [0u8; RAW_ADDRESS_LEN];
        raw[0] = ADDRESS_PREFIX;
        raw[1..].copy_from_slice(&body);
        Self(raw)
    }

    pub fn from_raw(raw: &[u8]) -> Result<Self, TronError> {
        if raw.len() != RAW_ADDRESS_LEN {
            return Err(TronError::InvalidAddress(format!(
                "raw address must be {} bytes, got {}",
                RAW_ADDRESS_LEN,
                raw.len()
            )));
        }
        if raw[0] != ADDRESS_PREFIX {
            return Err(TronError::InvalidAddressPrefix(raw[0]));
        }
        let mut out = [0u8; RAW_ADDRESS_LEN];
        out.copy_from_slice(raw);
        Ok(Self(out))
    }

    pub fn from_base58(text: &str) -> Result<Self, TronError> {
        let raw = decode(text)?;
        Self::from_raw(&raw)
    }

    /// 接受可选的 `0x` 前缀
    pub fn from_hex(text: &str) -> Result<Self, TronError> {
        let trimmed = text.trim();
        let trimmed = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let raw = hex::decode(trimmed)
            .map_err(|e| TronError::InvalidAddress(format!("{}: {}", text, e)))?;
        Self::from_raw(&raw)
    }

    pub fn to_base58(&self) -> String {
        encode(&self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; RAW_ADDRESS_LEN] {
        &self.0
    }

    /// 去掉版本字节后的 20 字节（ABI 参数使用）
    pub fn body(&self) -> &[u8] {
        &self.0[1..]
    }
}

impl FromStr for TronAddress {
    type Err = TronError;

    /// Base58 文本或 42 位十六进制均可
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let is_hex = s.len() == RAW_ADDRESS_LEN * 2
            || (s.len() == RAW_ADDRESS_LEN * 2 + 2 && s.starts_with("0x"));
        if is_hex && s.trim_start_matches("0x").chars().all(|c| c.is_ascii_hexdigit()) {
            Self::from_hex(s)
        } else {
            Self::from_base58(s)
        }
    }
}

impl fmt::Display for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TronAddress({})", self.to_base58())
    }
}

impl Serialize for TronAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for TronAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
