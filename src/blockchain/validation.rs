//! Admission rules for transactions and block candidates.
//!
//! Every check is a pure function of its inputs; callers decide what to do
//! with the outcome. Failure reasons double as protocol error strings.

use serde_json::Value;
use thiserror::Error;

use std::collections::{HashMap, HashSet};

use crate::config::ConsensusParams;

use super::block::Block;
use super::crypto::Address;
use super::ledger::Ledger;
use super::mempool::Mempool;
use super::transaction::{Transaction, TransactionError};

/// Fields a submitted transaction must carry
const REQUIRED_TX_FIELDS: [&str; 5] = ["sender", "recipient", "amount", "timestamp", "signature"];

/// Fields a submitted block must carry
const REQUIRED_BLOCK_FIELDS: [&str; 6] = ["index", "timestamp", "transactions", "prev_hash", "nonce", "hash"];

/// Reasons a block candidate is refused
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockError {
    #[error("{0}")]
    MalformedBlock(String),

    #[error("Invalid block hash")]
    HashMismatch,

    #[error("Invalid Proof of Work (hash does not meet difficulty {0})")]
    InsufficientWork(usize),

    #[error("Invalid block index. Expected {expected}, got {got}")]
    IndexMismatch { expected: u64, got: u64 },

    #[error("Invalid previous hash")]
    ForkMismatch,

    #[error("Duplicate transaction ID in block: {0}")]
    DuplicateTxid(String),

    #[error("Duplicate transaction in block: {0}")]
    DuplicateTransaction(String),

    #[error("Transaction already in blockchain: {0}")]
    AlreadyMined(String),

    #[error("Block must contain exactly one coinbase transaction, found {0}")]
    CoinbaseCountError(usize),

    #[error("{0}")]
    RewardMismatch(String),

    #[error("Invalid transaction in block: {0}")]
    InvalidEmbeddedTransaction(#[source] TransactionError),

    #[error("Total block reward mismatch. Expected {expected}, got {got}")]
    RewardSumMismatch { expected: f64, got: f64 },
}

/// Read access to account balances
pub trait BalanceView {
    fn balance_of(&self, address: &Address) -> f64;
}

impl BalanceView for Ledger {
    fn balance_of(&self, address: &Address) -> f64 {
        Ledger::balance_of(self, address)
    }
}

/// A balance view with outstanding debits subtracted
///
/// Used for amounts that are committed but not yet on the chain: pending
/// mempool spends during admission, earlier transfers of the same block
/// during block validation. Credits are never counted as spendable.
pub struct PendingSpends<'a, V: BalanceView + ?Sized> {
    base: &'a V,
    debits: HashMap<Address, f64>,
}

impl<'a, V: BalanceView + ?Sized> PendingSpends<'a, V> {
    pub fn new(base: &'a V) -> Self {
        PendingSpends {
            base,
            debits: HashMap::new(),
        }
    }

    /// Records the pending spends of every transaction in the pool
    pub fn with_mempool(base: &'a V, mempool: &Mempool) -> Self {
        let mut view = Self::new(base);
        for tx in mempool.transactions() {
            view.debit(tx);
        }
        view
    }

    pub fn debit(&mut self, tx: &Transaction) {
        if !tx.is_coinbase() {
            *self.debits.entry(tx.sender.clone()).or_insert(0.0) += tx.amount.value();
        }
    }
}

impl<V: BalanceView + ?Sized> BalanceView for PendingSpends<'_, V> {
    fn balance_of(&self, address: &Address) -> f64 {
        let debited = self.debits.get(address).copied().unwrap_or(0.0);
        self.base.balance_of(address) - debited
    }
}

/// Checks field presence, then decodes a submitted transaction
pub fn parse_transaction(value: Value) -> Result<Transaction, TransactionError> {
    let fields = value
        .as_object()
        .ok_or_else(|| TransactionError::Malformed("expected a JSON object".to_string()))?;

    if let Some(missing) = REQUIRED_TX_FIELDS.iter().find(|field| !fields.contains_key(**field)) {
        return Err(TransactionError::MissingField(missing.to_string()));
    }

    serde_json::from_value(value).map_err(|e| TransactionError::Malformed(e.to_string()))
}

/// Checks field presence, then decodes a submitted block
pub fn parse_block(value: Value) -> Result<Block, BlockError> {
    let fields = value
        .as_object()
        .ok_or_else(|| BlockError::MalformedBlock("Block must be a JSON object".to_string()))?;

    if let Some(missing) = REQUIRED_BLOCK_FIELDS.iter().find(|field| !fields.contains_key(**field)) {
        return Err(BlockError::MalformedBlock(format!("Block missing field: {}", missing)));
    }

    serde_json::from_value(value).map_err(|e| BlockError::MalformedBlock(format!("Malformed block: {}", e)))
}

/// Validates a standalone transaction against a balance view
pub fn validate_transaction<V: BalanceView + ?Sized>(
    tx: &Transaction,
    balances: &V,
) -> Result<(), TransactionError> {
    if tx.signature.is_none() {
        return Err(TransactionError::MissingField("signature".to_string()));
    }

    let amount = tx.amount.value();
    if !(amount > 0.0) {
        return Err(TransactionError::NonPositiveAmount);
    }

    if tx.is_coinbase() {
        return Ok(());
    }

    let balance = balances.balance_of(&tx.sender);
    if balance < amount {
        return Err(TransactionError::InsufficientBalance {
            have: balance,
            need: amount,
        });
    }

    if !tx.verify_signature() {
        return Err(TransactionError::InvalidSignature);
    }

    Ok(())
}

/// Validates a block candidate against the chain it would extend
pub fn validate_block(
    block: &Block,
    ledger: &Ledger,
    owner: &Address,
    params: &ConsensusParams,
) -> Result<(), BlockError> {
    if block.calculate_hash() != block.hash {
        return Err(BlockError::HashMismatch);
    }

    if !block.meets_difficulty(params.difficulty) {
        return Err(BlockError::InsufficientWork(params.difficulty));
    }

    let expected_index = ledger.len() as u64;
    if block.index != expected_index {
        return Err(BlockError::IndexMismatch {
            expected: expected_index,
            got: block.index,
        });
    }
    if block.index > 0 && block.prev_hash != ledger.tip().hash {
        return Err(BlockError::ForkMismatch);
    }

    let expected_reward = params.expected_coinbase(block.index);
    let mut coinbase_count = 0;
    let mut reward_sum = 0.0;
    let mut seen = HashSet::new();
    let mut seen_contents = HashSet::new();
    let mut balances = PendingSpends::new(ledger);

    for tx in &block.transactions {
        let txid = tx
            .txid()
            .ok_or_else(|| BlockError::MalformedBlock("Transaction missing txid".to_string()))?;

        if !seen.insert(txid) {
            return Err(BlockError::DuplicateTxid(txid.to_string()));
        }
        if !tx.is_coinbase() && !seen_contents.insert(tx.compute_txid()) {
            return Err(BlockError::DuplicateTransaction(txid.to_string()));
        }
        if ledger.contains(tx) {
            return Err(BlockError::AlreadyMined(txid.to_string()));
        }

        if tx.is_coinbase() {
            coinbase_count += 1;
            if coinbase_count > 1 {
                return Err(BlockError::CoinbaseCountError(coinbase_count));
            }

            reward_sum += tx.amount.value();
            check_coinbase(tx, block.index, owner, expected_reward)?;
        } else {
            validate_transaction(tx, &balances).map_err(BlockError::InvalidEmbeddedTransaction)?;
            balances.debit(tx);
        }
    }

    if coinbase_count != 1 {
        return Err(BlockError::CoinbaseCountError(coinbase_count));
    }

    if reward_sum != expected_reward {
        return Err(BlockError::RewardSumMismatch {
            expected: expected_reward,
            got: reward_sum,
        });
    }

    Ok(())
}

fn check_coinbase(tx: &Transaction, index: u64, owner: &Address, expected: f64) -> Result<(), BlockError> {
    let amount = tx.amount.value();

    if index == 0 {
        if amount != expected {
            return Err(BlockError::RewardMismatch(format!(
                "Invalid genesis block reward amount. Expected {}, got {}",
                expected, tx.amount
            )));
        }
        if tx.recipient != *owner {
            return Err(BlockError::RewardMismatch(format!(
                "Invalid genesis block recipient. Expected {}, got {}",
                owner, tx.recipient
            )));
        }
    } else if amount != expected {
        return Err(BlockError::RewardMismatch(format!(
            "Invalid block reward amount. Expected {}, got {}",
            expected, tx.amount
        )));
    }

    Ok(())
}
