pub mod db;
pub mod log_redact;
pub mod logging;
pub mod quote_cache;
pub mod wallet_locks;
