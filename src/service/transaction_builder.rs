//! 交易构造与签名
//!
//! Built -> Signed：网关返回未签名交易后，校验 txID == SHA256(raw_data)，
//! 对该哈希做 secp256k1 可恢复签名（RFC6979 确定性 k，low-S），
//! 签名为 65 字节 r‖s‖v（v ∈ {0,1}），并用恢复出的公钥反推地址自检。

use std::sync::Arc;

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::{
    domain::{
        abi::{approve_call, transfer_call},
        address::TronAddress,
        amount::{Sun, TokenAmount},
        keys::{address_from_verifying_key, derive_address, PrivateKey},
        transaction::{SignedTransaction, UnsignedTransaction},
    },
    error::TronError,
    service::gateway::TronGateway,
};

pub const SIGNATURE_LEN: usize = 65;

/// 构造阶段的失败统一归为 BuildFailed，保留原因
fn build_error(err: TronError) -> TronError {
    match err {
        TronError::GatewayRejected { code, message } => {
            TronError::BuildFailed(format!("{}: {}", code, message))
        }
        TronError::GatewayTransport(msg) | TronError::MalformedResponse(msg) => {
            TronError::BuildFailed(msg)
        }
        other => other,
    }
}

pub struct TransactionBuilder {
    gateway: Arc<TronGateway>,
}

impl TransactionBuilder {
    pub fn new(gateway: Arc<TronGateway>) -> Self {
        Self { gateway }
    }

    pub async fn build_transfer(
        &self,
        owner: &TronAddress,
        contract: &TronAddress,
        to: &TronAddress,
        amount: TokenAmount,
        fee_limit: Sun,
    ) -> Result<UnsignedTransaction, TronError> {
        let call = transfer_call(to, amount);
        self.gateway
            .trigger_smart_contract(owner, contract, &call, fee_limit)
            .await
            .map_err(build_error)
    }

    pub async fn build_approve(
        &self,
        owner: &TronAddress,
        contract: &TronAddress,
        spender: &TronAddress,
        amount: TokenAmount,
        fee_limit: Sun,
    ) -> Result<UnsignedTransaction, TronError> {
        let call = approve_call(spender, amount);
        self.gateway
            .trigger_smart_contract(owner, contract, &call, fee_limit)
            .await
            .map_err(build_error)
    }

    pub async fn build_native_transfer(
        &self,
        owner: &TronAddress,
        to: &TronAddress,
        amount: Sun,
    ) -> Result<UnsignedTransaction, TronError> {
        self.gateway
            .create_transaction(owner, to, amount)
            .await
            .map_err(build_error)
    }
}

/// 签名并自检
pub fn sign_transaction(
    unsigned: UnsignedTransaction,
    key: &PrivateKey,
) -> Result<SignedTransaction, TronError> {
    let hash = unsigned
        .hash()
        .map_err(|e| TronError::SignFailed(e.to_string()))?;
    if !hex::encode(hash).eq_ignore_ascii_case(&unsigned.tx_id) {
        return Err(TronError::SignFailed(format!(
            "txID {} does not match SHA256(raw_data)",
            unsigned.tx_id
        )));
    }

    let signing_key = key.signing_key()?;
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&hash)
        .map_err(|e| TronError::SignFailed(e.to_string()))?;

    let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
    bytes.extend_from_slice(&signature.to_bytes());
    bytes.push(recovery_id.to_byte());

    let signed = SignedTransaction {
        transaction: unsigned,
        signature: vec![hex::encode(&bytes)],
    };
    let expected = derive_address(key)?.address;
    verify_signature(&signed, &expected)?;
    Ok(signed)
}

/// 从签名恢复公钥，确认对应 `expected` 地址
pub fn verify_signature(
    signed: &SignedTransaction,
    expected: &TronAddress,
) -> Result<(), TronError> {
    let hash = signed
        .transaction
        .hash()
        .map_err(|e| TronError::SignFailed(e.to_string()))?;
    let sig_hex = signed
        .signature
        .first()
        .ok_or_else(|| TronError::SignFailed("missing signature".into()))?;
    let bytes = hex::decode(sig_hex).map_err(|e| TronError::SignFailed(e.to_string()))?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(TronError::SignFailed(format!(
            "signature must be {} bytes, got {}",
            SIGNATURE_LEN,
            bytes.len()
        )));
    }

    let signature =
        Signature::from_slice(&bytes[..64]).map_err(|e| TronError::SignFailed(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(bytes[64])
        .ok_or_else(|| TronError::SignFailed(format!("bad recovery id {}", bytes[64])))?;
    let recovered = VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id)
        .map_err(|e| TronError::SignFailed(e.to_string()))?;

    let actual = address_from_verifying_key(&recovered);
    if &actual != expected {
        return Err(TronError::SignFailed(format!(
            "signature recovers to {}, expected {}",
            actual, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sha2::{Digest, Sha256};

    use super::*;

    fn unsigned(raw_hex: &str) -> UnsignedTransaction {
        let raw = hex::decode(raw_hex).unwrap();
        UnsignedTransaction {
            tx_id: hex::encode(Sha256::digest(&raw)),
            raw_data: serde_json::json!({"contract": []}),
            raw_data_hex: raw_hex.to_string(),
            visible: Some(false),
        }
    }

    fn key_one() -> PrivateKey {
        PrivateKey::from_hex(&format!("{:0>64}", "1")).unwrap()
    }

    #[test]
    fn test_sign_produces_recoverable_signature() {
        let key = key_one();
        let signed = sign_transaction(unsigned("0a02c1b42208a7d3b5b1"), &key).unwrap();
        let sig = hex::decode(&signed.signature[0]).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(sig[64] <= 1);
        verify_signature(&signed, &derive_address(&key).unwrap().address).unwrap();
    }

    #[test]
    fn test_signing_is_deterministic() {
        let key = key_one();
        let a = sign_transaction(unsigned("0a02c1b4"), &key).unwrap();
        let b = sign_transaction(unsigned("0a02c1b4"), &key).unwrap();
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn test_rejects_txid_mismatch() {
        let mut tx = unsigned("0a02c1b4");
        tx.tx_id = "00".repeat(32);
        assert!(matches!(
            sign_transaction(tx, &key_one()),
            Err(TronError::SignFailed(_))
        ));
    }

    #[test]
    fn test_verify_detects_wrong_signer() {
        let signed = sign_transaction(unsigned("0a02c1b4"), &key_one()).unwrap();
        let other = derive_address(&PrivateKey::generate()).unwrap().address;
        assert!(matches!(
            verify_signature(&signed, &other),
            Err(TronError::SignFailed(_))
        ));
    }
}
