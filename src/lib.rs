//! trongate - TRON USDT 托管钱包后端
//!
//! 地址编解码、私钥派生、TRC20 ABI、能量估算、签名广播与账本对账

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod repository;
pub mod service;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{AppError, TronError};
pub use service::wallet_service::WalletService;
