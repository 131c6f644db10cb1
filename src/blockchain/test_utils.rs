//! Fixtures shared by the unit tests: wallets, signed transfers and the
//! brute-force nonce search miners run.

use serde_json::Map;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ConsensusParams;

use super::block::Block;
use super::crypto::{Address, DigitalSignature, Wallet};
use super::ledger::Ledger;
use super::number::{Amount, Timestamp};
use super::transaction::{sha256_hex, Transaction};

static COINBASE_SEQ: AtomicU64 = AtomicU64::new(0);

pub fn test_params() -> ConsensusParams {
    ConsensusParams {
        difficulty: 2,
        block_reward: 50,
        owner_allocation: 10_000_000,
        total_supply: 100_000_000,
    }
}

/// A fresh owner wallet and a ledger holding only its genesis block
pub fn genesis_ledger() -> (Wallet, Ledger) {
    let owner = Wallet::generate();
    let genesis = Block::genesis(owner.address().clone(), Amount::from_units(test_params().owner_allocation));
    (owner, Ledger::new(genesis))
}

/// A coinbase paying `units` with a unique txid, the way a miner builds one
pub fn coinbase(recipient: &Address, units: u64) -> Transaction {
    let seq = COINBASE_SEQ.fetch_add(1, Ordering::Relaxed);
    let timestamp = Timestamp::now();

    Transaction {
        sender: Address::coinbase(),
        recipient: recipient.clone(),
        amount: Amount::from_units(units),
        txid: Some(sha256_hex(format!("coinbase_{}_{}_{}", recipient, timestamp, seq).as_bytes())),
        timestamp,
        signature: Some(DigitalSignature("coinbase_signature".to_string())),
        extra: Map::new(),
    }
}

pub fn signed_transfer(from: &Wallet, to: &Address, amount: Amount) -> Transaction {
    let mut tx = Transaction::new(from.address().clone(), to.clone(), amount);
    tx.sign(from);
    tx
}

/// An unsealed block extending the ledger's tip
pub fn candidate(ledger: &Ledger, mut transactions: Vec<Transaction>) -> Block {
    for tx in &mut transactions {
        tx.ensure_txid();
    }

    Block {
        index: ledger.len() as u64,
        timestamp: Timestamp::now(),
        transactions,
        prev_hash: ledger.tip().hash.clone(),
        nonce: 0,
        hash: String::new(),
        extra: Map::new(),
    }
}

/// Increments the nonce until the hash meets `difficulty`
pub fn seal(mut block: Block, difficulty: usize) -> Block {
    block.nonce = 0;
    loop {
        block.hash = block.calculate_hash();
        if block.meets_difficulty(difficulty) {
            return block;
        }
        block.nonce += 1;
    }
}

/// Increments the nonce until the hash does *not* meet `difficulty`
pub fn seal_failing(mut block: Block, difficulty: usize) -> Block {
    block.nonce = 0;
    loop {
        block.hash = block.calculate_hash();
        if !block.meets_difficulty(difficulty) {
            return block;
        }
        block.nonce += 1;
    }
}
