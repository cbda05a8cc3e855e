pub mod balance_reader;
pub mod fee_estimator;
pub mod gateway;
pub mod ledger_reconciler;
pub mod retry;
pub mod transaction_builder;
pub mod wallet_service; // 对外操作入口
