//! 已知向量：私钥派生地址、Base58Check、TRC20 调用数据

mod common;

use common::*;
use rust_decimal::Decimal;
use trongate::{
    domain::{
        abi::{encode_balance_of, encode_transfer},
        address::{decode, encode},
        derive_address, TronAddress,
    },
    error::TronError,
};

const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
const USDT_HEX: &str = "41a614f803b6fd780986a42c78ec9c7f77e6ded13c";

#[test]
fn test_private_key_one_derives_known_address() {
    let derived = derive_address(&key(GOLDEN_KEY)).unwrap();
    assert_eq!(derived.address_text(), GOLDEN_ADDRESS);
    assert_eq!(derived.address_hex(), GOLDEN_ADDRESS_HEX);
    assert_eq!(derived.public_key_hex().len(), 130);
    assert!(derived.public_key_hex().starts_with("04"));
}

#[test]
fn test_base58check_round_trip_on_contract_address() {
    let raw = decode(USDT).unwrap();
    assert_eq!(hex::encode(raw), USDT_HEX);
    assert_eq!(encode(&raw), USDT);
}

#[test]
fn test_corrupted_checksum_is_rejected() {
    let mut corrupted = USDT.to_string();
    corrupted.pop();
    corrupted.push('u');
    assert!(matches!(
        TronAddress::from_base58(&corrupted),
        Err(TronError::InvalidAddress(_))
    ));
}

#[test]
fn test_transfer_call_data() {
    let call = encode_transfer(GOLDEN_ADDRESS, Decimal::new(15, 1)).unwrap();
    let data = hex::encode(call.data());
    assert_eq!(
        data,
        format!(
            "a9059cbb{:0>64}{:0>64}",
            &GOLDEN_ADDRESS_HEX[2..],
            "16e360"
        )
    );
}

#[test]
fn test_balance_of_call_data() {
    let call = encode_balance_of(USDT).unwrap();
    assert_eq!(hex::encode(call.selector()), "70a08231");
    assert_eq!(call.parameter_hex(), format!("{:0>64}", &USDT_HEX[2..]));
}

#[test]
fn test_invalid_abi_inputs() {
    assert!(matches!(
        encode_transfer("not-an-address", Decimal::ONE),
        Err(TronError::InvalidArgument(_))
    ));
    assert!(matches!(
        encode_transfer(GOLDEN_ADDRESS, Decimal::new(-1, 0)),
        Err(TronError::InvalidArgument(_))
    ));
}
