//! 领域层：地址、密钥、金额、ABI 与交易模型（纯函数，无 IO）

pub mod abi;
pub mod address;
pub mod amount;
pub mod keys;
pub mod transaction;
pub mod wallet;

pub use address::TronAddress;
pub use amount::{Asset, Sun, TokenAmount};
pub use keys::{derive_address, DerivedKey, PrivateKey};
pub use transaction::{SignedTransaction, TxState, TxStatus, UnsignedTransaction};
pub use wallet::{
    BalanceSnapshot, NewWallet, TransactionRecord, VirtualTransfer, VirtualTransferStatus, Wallet,
};
