//! USDT 提现流程测试
//! 预检、估算、构造、签名、广播各阶段的成功与失败路径

mod common;

use std::time::Duration;

use common::*;
use rust_decimal::Decimal;
use trongate::{
    domain::{Asset, SignedTransaction, Sun, TokenAmount, TxState},
    error::TronError,
    service::{
        gateway::{
            PATH_BROADCAST, PATH_GET_ACCOUNT, PATH_TRIGGER_CONSTANT, PATH_TRIGGER_SMART,
        },
        transaction_builder::verify_signature,
    },
};

fn usdt(text: &str) -> TokenAmount {
    TokenAmount::from_decimal(text.parse::<Decimal>().unwrap()).unwrap()
}

/// USDT 10，能量 5000，TRX 20
fn script_funded(h: &Harness, seed: &str) {
    h.transport
        .on_fn(PATH_TRIGGER_CONSTANT, "balanceOf", balance_reply(10_000_000));
    h.transport
        .on_fn(PATH_TRIGGER_CONSTANT, "transfer", energy_reply(5_000));
    h.transport.on(PATH_GET_ACCOUNT, account_reply(20_000_000));
    h.transport.on(PATH_TRIGGER_SMART, trigger_reply(seed));
}

#[tokio::test]
async fn test_withdraw_happy_path() {
    let h = harness();
    script_funded(&h, "withdraw-1");
    h.transport
        .on(PATH_BROADCAST, broadcast_ok(&txid_for("withdraw-1")));

    let to = address_of(RECIPIENT_KEY);
    let receipt = h
        .service
        .withdraw(&key(GOLDEN_KEY), &to, usdt("1.5"), None, None)
        .await
        .unwrap();

    assert_eq!(receipt.txid, txid_for("withdraw-1"));
    assert_eq!(receipt.from.to_base58(), GOLDEN_ADDRESS);
    assert_eq!(receipt.state, TxState::Broadcast);
    // 5000 * 420 * 1.2
    assert_eq!(receipt.fee_limit, Some(Sun::new(2_520_000)));

    let calls = h.transport.calls();
    let build = calls.iter().find(|c| c.path == PATH_TRIGGER_SMART).unwrap();
    assert_eq!(build.body["fee_limit"], 2_520_000);
    assert_eq!(build.body["function_selector"], "transfer(address,uint256)");
    assert!(build.body["parameter"]
        .as_str()
        .unwrap()
        .ends_with("16e360"));

    let broadcast = calls.iter().find(|c| c.path == PATH_BROADCAST).unwrap();
    let signed: SignedTransaction = serde_json::from_value(broadcast.body.clone()).unwrap();
    assert_eq!(signed.signature.len(), 1);
    assert_eq!(signed.signature[0].len(), 130);
    verify_signature(&signed, &address_of(GOLDEN_KEY)).unwrap();
}

#[tokio::test]
async fn test_insufficient_usdt_stops_before_build() {
    let h = harness();
    h.transport
        .on_fn(PATH_TRIGGER_CONSTANT, "balanceOf", balance_reply(1_000_000));
    h.transport.on(PATH_GET_ACCOUNT, account_reply(20_000_000));

    let err = h
        .service
        .withdraw(&key(GOLDEN_KEY), &address_of(RECIPIENT_KEY), usdt("1.5"), None, None)
        .await
        .unwrap_err();

    match err {
        TronError::InsufficientFunds { asset, have, need } => {
            assert_eq!(asset, Asset::Usdt);
            assert_eq!(have, Decimal::new(1, 0));
            assert_eq!(need, Decimal::new(15, 1));
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(h.transport.count(PATH_TRIGGER_SMART), 0);
    assert_eq!(h.transport.count(PATH_BROADCAST), 0);
}

#[tokio::test]
async fn test_insufficient_trx_against_fee_limit() {
    let h = harness();
    h.transport
        .on_fn(PATH_TRIGGER_CONSTANT, "balanceOf", balance_reply(10_000_000));
    h.transport
        .on_fn(PATH_TRIGGER_CONSTANT, "transfer", energy_reply(5_000));
    h.transport.on(PATH_GET_ACCOUNT, account_reply(1_000_000));

    let err = h
        .service
        .withdraw(&key(GOLDEN_KEY), &address_of(RECIPIENT_KEY), usdt("1"), None, None)
        .await
        .unwrap_err();

    match err {
        TronError::InsufficientFunds { asset, have, need } => {
            assert_eq!(asset, Asset::Trx);
            assert_eq!(have, Decimal::new(1, 0));
            assert_eq!(need, Decimal::new(252, 2));
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(h.transport.count(PATH_TRIGGER_SMART), 0);
}

#[tokio::test]
async fn test_estimation_transport_failure_is_terminal() {
    let h = harness();
    h.transport
        .on_fn(PATH_TRIGGER_CONSTANT, "balanceOf", balance_reply(10_000_000));
    h.transport.push(
        format!("{}#transfer", PATH_TRIGGER_CONSTANT),
        Reply::Transport("operation timed out".into()),
    );
    h.transport.on(PATH_GET_ACCOUNT, account_reply(20_000_000));

    let err = h
        .service
        .withdraw(&key(GOLDEN_KEY), &address_of(RECIPIENT_KEY), usdt("1"), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, TronError::EstimationUnavailable(_)), "{:?}", err);
    assert_eq!(h.transport.count_fn(PATH_TRIGGER_CONSTANT, "transfer"), 5);
    assert_eq!(h.transport.count(PATH_TRIGGER_SMART), 0);
    assert_eq!(h.transport.count(PATH_BROADCAST), 0);
}

#[tokio::test]
async fn test_reverted_simulation_uses_default_energy() {
    let h = harness();
    h.transport
        .on_fn(PATH_TRIGGER_CONSTANT, "balanceOf", balance_reply(10_000_000));
    h.transport.on_fn(
        PATH_TRIGGER_CONSTANT,
        "transfer",
        serde_json::json!({
            "result": { "result": true },
            "energy_used": 900,
            "transaction": { "ret": [{ "ret": "REVERT" }] }
        }),
    );
    h.transport.on(PATH_GET_ACCOUNT, account_reply(20_000_000));
    h.transport.on(PATH_TRIGGER_SMART, trigger_reply("reverted"));
    h.transport.on(PATH_BROADCAST, broadcast_ok(&txid_for("reverted")));

    let receipt = h
        .service
        .withdraw(&key(GOLDEN_KEY), &address_of(RECIPIENT_KEY), usdt("1"), None, None)
        .await
        .unwrap();

    // 30000 * 420 * 1.2 = 15.12 TRX，截到上限 5 TRX
    assert_eq!(receipt.fee_limit, Some(Sun::from_trx(5)));
}

#[tokio::test]
async fn test_broadcast_rejection_is_not_retried() {
    let h = harness();
    script_funded(&h, "rejected");
    h.transport.on(
        PATH_BROADCAST,
        broadcast_error("CONTRACT_VALIDATE_ERROR", "balance is not sufficient"),
    );

    let err = h
        .service
        .withdraw(&key(GOLDEN_KEY), &address_of(RECIPIENT_KEY), usdt("1"), None, None)
        .await
        .unwrap_err();

    match err {
        TronError::GatewayRejected { code, message } => {
            assert_eq!(code, "CONTRACT_VALIDATE_ERROR");
            assert_eq!(message, "balance is not sufficient");
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(h.transport.count(PATH_BROADCAST), 1);
}

#[tokio::test]
async fn test_duplicate_broadcast_counts_as_accepted() {
    let h = harness();
    script_funded(&h, "dup");
    h.transport
        .on(PATH_BROADCAST, broadcast_error("DUP_TRANSACTION_ERROR", "dup"));

    let receipt = h
        .service
        .withdraw(&key(GOLDEN_KEY), &address_of(RECIPIENT_KEY), usdt("1"), None, None)
        .await
        .unwrap();
    assert_eq!(receipt.txid, txid_for("dup"));
}

#[tokio::test]
async fn test_broadcast_transport_failure_exhausts_retries() {
    let h = harness();
    script_funded(&h, "flaky");
    h.transport
        .push(PATH_BROADCAST, Reply::Transport("connection reset".into()));

    let err = h
        .service
        .withdraw(&key(GOLDEN_KEY), &address_of(RECIPIENT_KEY), usdt("1"), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, TronError::BroadcastFailed(_)), "{:?}", err);
    assert_eq!(h.transport.count(PATH_BROADCAST), 5);
}

#[tokio::test]
async fn test_deadline_exceeded_before_broadcast() {
    let h = harness();
    h.transport.push(
        format!("{}#balanceOf", PATH_TRIGGER_CONSTANT),
        Reply::Slow(Duration::from_millis(500), balance_reply(10_000_000)),
    );

    let err = h
        .service
        .withdraw(
            &key(GOLDEN_KEY),
            &address_of(RECIPIENT_KEY),
            usdt("1"),
            None,
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TronError::DeadlineExceeded(_)), "{:?}", err);
    assert_eq!(h.transport.count(PATH_BROADCAST), 0);
}

#[tokio::test]
async fn test_zero_amount_rejected() {
    let h = harness();
    let err = h
        .service
        .withdraw(&key(GOLDEN_KEY), &address_of(RECIPIENT_KEY), TokenAmount::ZERO, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TronError::InvalidAmount(_)));
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_fee_quote_reports_missing_trx() {
    let h = harness();
    h.transport
        .on_fn(PATH_TRIGGER_CONSTANT, "balanceOf", balance_reply(10_000_000));
    h.transport
        .on_fn(PATH_TRIGGER_CONSTANT, "transfer", energy_reply(5_000));
    h.transport.on(PATH_GET_ACCOUNT, account_reply(1_000_000));

    let quote = h
        .service
        .estimate_required_fee(&address_of(GOLDEN_KEY), None, usdt("2"), None)
        .await
        .unwrap();

    assert_eq!(quote.required_trx, Decimal::new(252, 2));
    assert_eq!(quote.current_trx, Decimal::new(1, 0));
    assert_eq!(quote.current_usdt, Decimal::new(10, 0));
    assert!(!quote.sufficient_trx);
    assert!(quote.sufficient_usdt);
    assert_eq!(quote.missing_trx, Decimal::new(152, 2));
    assert_eq!(quote.energy, 5_000);
    assert!(!quote.energy_from_default);
}

#[tokio::test]
async fn test_approve_uses_fixed_fee_limit() {
    let h = harness();
    h.transport.on(PATH_GET_ACCOUNT, account_reply(3_000_000));
    h.transport.on(PATH_TRIGGER_SMART, trigger_reply("approve"));
    h.transport.on(PATH_BROADCAST, broadcast_ok(&txid_for("approve")));

    let receipt = h
        .service
        .approve(&key(GOLDEN_KEY), &address_of(RECIPIENT_KEY), usdt("100"))
        .await
        .unwrap();

    assert_eq!(receipt.fee_limit, Some(Sun::from_trx(2)));
    let build = h
        .transport
        .calls()
        .into_iter()
        .find(|c| c.path == PATH_TRIGGER_SMART)
        .unwrap();
    assert_eq!(build.body["function_selector"], "approve(address,uint256)");
    assert_eq!(build.body["fee_limit"], 2_000_000);
}
