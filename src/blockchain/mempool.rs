//! Pool of validated transactions waiting to be mined.
//!
//! Keeps arrival order, which is the order miners place transactions after
//! their coinbase. Deduplicates by txid and by content hash, so a signed
//! transfer re-filed under a fresh txid is still a duplicate.

use thiserror::Error;

use std::collections::HashSet;

use super::transaction::Transaction;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MempoolError {
    #[error("Transaction already in mempool")]
    DuplicateTx,

    #[error("Transaction has no txid")]
    MissingTxid,
}

/// Pending transactions keyed by txid, in arrival order
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: Vec<Transaction>,
    txids: HashSet<String>,
    contents: HashSet<String>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the transaction is pending under its txid or its content
    pub fn contains(&self, tx: &Transaction) -> bool {
        tx.txid().map_or(false, |txid| self.txids.contains(txid))
            || self.contents.contains(&tx.compute_txid())
    }

    /// Adds a transaction unless it is already pending
    pub fn admit(&mut self, transaction: Transaction) -> Result<(), MempoolError> {
        let txid = transaction.txid().ok_or(MempoolError::MissingTxid)?;
        let content = transaction.compute_txid();

        if self.txids.contains(txid) || self.contents.contains(&content) {
            return Err(MempoolError::DuplicateTx);
        }

        self.txids.insert(txid.to_string());
        self.contents.insert(content);
        self.transactions.push(transaction);
        Ok(())
    }

    /// Removes every pending transaction included in `mined`, matched by
    /// txid or by content
    ///
    /// Returns how many entries were dropped.
    pub fn drain(&mut self, mined: &[Transaction]) -> usize {
        let before = self.transactions.len();

        let mined_txids: HashSet<&str> = mined.iter().filter_map(Transaction::txid).collect();
        let mined_contents: HashSet<String> = mined.iter().map(Transaction::compute_txid).collect();

        let txids = &mut self.txids;
        let contents = &mut self.contents;
        self.transactions.retain(|tx| {
            let content = tx.compute_txid();
            let included = tx.txid().map_or(false, |txid| mined_txids.contains(txid))
                || mined_contents.contains(&content);

            if included {
                if let Some(txid) = tx.txid() {
                    txids.remove(txid);
                }
                contents.remove(&content);
            }
            !included
        });

        before - self.transactions.len()
    }

    /// Pending transactions in arrival order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }
}
