// Blockchain module
//
// This module contains the ledger engine:
// - Content hashing
// - Transaction, pool and block structures
// - Proof of work miner
// - Chain validation and persistence
// - Catalog and wallet collaborators
// - Purchase service

pub mod block;
pub mod catalog;
pub mod chain;
pub mod hash;
pub mod ledger;
pub mod miner;
pub mod pool;
pub mod service;
pub mod storage;
pub mod transaction;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use catalog::{Catalog, InMemoryCatalog, Product};
pub use ledger::{ChainSnapshot, Ledger, LedgerError};
pub use service::LedgerService;
pub use transaction::{Address, Transaction};
pub use wallet::{BalanceSource, InMemoryWallet};
