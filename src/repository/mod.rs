// Repository 抽象层
pub mod memory;
pub mod wallet_repository;

pub use memory::MemoryWalletRepository;
pub use wallet_repository::{PgWalletRepository, WalletRepository};
