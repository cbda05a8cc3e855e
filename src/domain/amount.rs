//! 定点金额
//!
//! USDT(TRC20) 与 TRX 都是 6 位小数。引擎内部一律用 `u64` 最小单位，
//! 只在 API 边界与 `Decimal` 互转，全程不出现浮点数。

use std::fmt;

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};

use crate::error::TronError;

/// 代币/TRX 小数位
pub const DECIMALS: u32 = 6;
/// 1 个单位 = 1_000_000 最小单位
pub const UNIT: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Trx,
    Usdt,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Trx => f.write_str("TRX"),
            Asset::Usdt => f.write_str("USDT"),
        }
    }
}

/// Decimal -> 最小单位。拒绝负数、超过 6 位小数以及溢出
fn decimal_to_units(value: Decimal) -> Result<u64, TronError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(TronError::InvalidAmount(format!("{} is negative", value)));
    }
    if value.normalize().scale() > DECIMALS {
        return Err(TronError::InvalidAmount(format!(
            "{} has more than {} decimal places",
            value, DECIMALS
        )));
    }
    value
        .checked_mul(Decimal::from(UNIT))
        .and_then(|v| v.to_u64())
        .ok_or_else(|| TronError::InvalidAmount(format!("{} is out of range", value)))
}

fn units_to_decimal(units: u64) -> Decimal {
    Decimal::from_i128_with_scale(units as i128, DECIMALS)
}

/// USDT 金额（micro-units）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, TronError> {
        decimal_to_units(value).map(Self)
    }

    pub const fn micros(self) -> u64 {
        self.0
    }

    pub fn to_decimal(self) -> Decimal {
        units_to_decimal(self.0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// 向下截断到 `places` 位小数（places <= 6）
    pub fn floor_to(self, places: u32) -> Self {
        let step = 10u64.pow(DECIMALS.saturating_sub(places.min(DECIMALS)));
        Self(self.0 - self.0 % step)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl std::iter::Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|a| a.0).fold(0u64, u64::saturating_add))
    }
}

/// TRX 金额，单位 SUN（1 TRX = 1_000_000 SUN）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sun(u64);

impl Sun {
    pub const ZERO: Sun = Sun(0);

    pub const fn new(sun: u64) -> Self {
        Self(sun)
    }

    pub const fn from_trx(trx: u64) -> Self {
        Self(trx * UNIT)
    }

    pub fn from_trx_decimal(value: Decimal) -> Result<Self, TronError> {
        decimal_to_units(value).map(Self)
    }

    pub const fn as_sun(self) -> u64 {
        self.0
    }

    pub fn to_trx(self) -> Decimal {
        units_to_decimal(self.0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// 乘以基点（10000 = 1.0），向上取整
    pub fn mul_bps_ceil(self, bps: u32) -> Self {
        let scaled = (self.0 as u128 * bps as u128).div_ceil(10_000);
        Self(u64::try_from(scaled).unwrap_or(u64::MAX))
    }

    pub fn clamp(self, min: Sun, max: Sun) -> Self {
        Self(self.0.clamp(min.0, max.0.max(min.0)))
    }
}

impl fmt::Display for Sun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} TRX", self.to_trx())
    }
}
