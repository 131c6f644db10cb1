// Blockchain module
//
// This module contains the core ledger implementation including:
// - Amount and timestamp numbers
// - Keys, addresses and wallets
// - Transaction and block structures
// - Validation rules
// - Ledger state and the mempool
// - Chain persistence

pub mod block;
pub mod crypto;
pub mod ledger;
pub mod mempool;
pub mod number;
pub mod storage;
pub mod transaction;
pub mod validation;

#[cfg(test)]
pub mod test_utils;

// Re-export main components for easier access
pub use block::Block;
pub use crypto::{display_address, Address, Wallet};
pub use ledger::Ledger;
pub use mempool::Mempool;
pub use storage::{ChainStore, StorageError};
pub use transaction::Transaction;
