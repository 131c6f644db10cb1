use thiserror::Error;

use std::collections::{HashMap, HashSet};

use super::block::{Block, GENESIS_PREV_HASH};
use super::crypto::Address;
use super::transaction::Transaction;
use super::validation::BlockError;

/// Errors raised when building or checking a ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Chain is empty")]
    EmptyChain,

    #[error("Invalid block at index {index}: {source}")]
    InvalidBlock {
        index: usize,
        #[source]
        source: BlockError,
    },
}

/// The canonical chain and the state derived from it
///
/// Balances are a cache over a replay of every transaction in the chain.
/// The cache and the mined-transaction indexes change only in
/// [`Ledger::append`].
#[derive(Debug, Clone)]
pub struct Ledger {
    /// Blocks in chain order, never empty
    chain: Vec<Block>,

    /// Net received minus sent, per address
    balances: HashMap<Address, f64>,

    /// Every txid included in the chain
    txids: HashSet<String>,

    /// Content hash of every mined transfer, whatever txid it was filed under
    contents: HashSet<String>,
}

impl Ledger {
    /// Creates a ledger holding only the genesis block
    pub fn new(genesis: Block) -> Self {
        let mut ledger = Ledger {
            chain: Vec::new(),
            balances: HashMap::new(),
            txids: HashSet::new(),
            contents: HashSet::new(),
        };
        ledger.append(genesis);
        ledger
    }

    /// Rebuilds a ledger from persisted blocks, replaying every transaction
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, LedgerError> {
        let mut blocks = blocks.into_iter();
        let genesis = blocks.next().ok_or(LedgerError::EmptyChain)?;

        let mut ledger = Ledger::new(genesis);
        for block in blocks {
            ledger.append(block);
        }

        Ok(ledger)
    }

    /// Appends a block that has already passed validation
    pub fn append(&mut self, block: Block) {
        for tx in &block.transactions {
            let amount = tx.amount.value();
            *self.balances.entry(tx.sender.clone()).or_insert(0.0) -= amount;
            *self.balances.entry(tx.recipient.clone()).or_insert(0.0) += amount;

            if let Some(txid) = tx.txid() {
                self.txids.insert(txid.to_string());
            }
            if !tx.is_coinbase() {
                self.contents.insert(tx.compute_txid());
            }
        }

        self.chain.push(block);
    }

    /// Balance of an address, zero for addresses never seen
    pub fn balance_of(&self, address: &Address) -> f64 {
        self.balances.get(address).copied().unwrap_or(0.0)
    }

    /// Balance of an address by replaying the whole chain
    #[cfg(test)]
    pub fn replay_balance(&self, address: &Address) -> f64 {
        let mut balance = 0.0;
        for tx in self.chain.iter().flat_map(|block| &block.transactions) {
            if tx.sender == *address {
                balance -= tx.amount.value();
            }
            if tx.recipient == *address {
                balance += tx.amount.value();
            }
        }
        balance
    }

    /// Every account that ever received or sent coins, without the
    /// coinbase pseudo-account
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, f64)> {
        self.balances
            .iter()
            .filter(|(address, _)| !address.is_coinbase())
            .map(|(address, balance)| (address, *balance))
    }

    /// Total supply minted so far: owner allocation plus block rewards
    pub fn total_minted(&self) -> f64 {
        -self.balance_of(&Address::coinbase())
    }

    /// The last block
    pub fn tip(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Whether the transaction is on the chain, under its own txid or
    /// replayed under another one
    pub fn contains(&self, tx: &Transaction) -> bool {
        if tx.txid().map_or(false, |txid| self.txids.contains(txid)) {
            return true;
        }

        !tx.is_coinbase() && self.contents.contains(&tx.compute_txid())
    }

    /// Checks stored hashes, positions and links of every block
    pub fn verify_integrity(&self) -> Result<(), LedgerError> {
        for (position, block) in self.chain.iter().enumerate() {
            let invalid = |source| LedgerError::InvalidBlock { index: position, source };

            if block.calculate_hash() != block.hash {
                return Err(invalid(BlockError::HashMismatch));
            }

            if block.index != position as u64 {
                return Err(invalid(BlockError::IndexMismatch {
                    expected: position as u64,
                    got: block.index,
                }));
            }

            let expected_prev = match position {
                0 => GENESIS_PREV_HASH,
                _ => self.chain[position - 1].hash.as_str(),
            };
            if block.prev_hash != expected_prev {
                return Err(invalid(BlockError::ForkMismatch));
            }
        }

        Ok(())
    }
}
