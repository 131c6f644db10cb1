//! Owner of the ledger and the mempool.
//!
//! All mutations run on a single writer task fed through a command channel,
//! one at a time and to completion: validate, admit or append, drain, save.
//! After each mutation the writer publishes a fresh [`NodeSnapshot`]; readers
//! clone the current snapshot and never wait on the writer.
//!
//! A command that made it into the channel is processed even if the caller
//! stops waiting for the reply.

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use std::iter;
use std::sync::Arc;

use crate::blockchain::crypto::Address;
use crate::blockchain::mempool::MempoolError;
use crate::blockchain::storage::StorageError;
use crate::blockchain::transaction::TransactionError;
use crate::blockchain::validation::{validate_block, validate_transaction, BlockError, PendingSpends};
use crate::blockchain::{Block, ChainStore, Ledger, Mempool, Transaction};
use crate::config::{ConsensusParams, PersistenceMode};

/// Commands queued ahead of the writer before senders start waiting
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Reasons a mutating request fails
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Mempool(#[from] MempoolError),

    #[error("Transaction already in blockchain")]
    AlreadyMined,

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("Failed to persist chain: {0}")]
    Persistence(#[from] StorageError),

    #[error("Node writer is not running")]
    Unavailable,
}

/// Immutable view of the node state between two mutations
#[derive(Debug)]
pub struct NodeSnapshot {
    pub ledger: Arc<Ledger>,
    pub mempool: Arc<Mempool>,
    /// The last accepted block has not reached the chain file yet
    pub persistence_dirty: bool,
}

enum Command {
    SubmitTransaction {
        tx: Transaction,
        done: oneshot::Sender<Result<String, ServiceError>>,
    },
    SubmitBlock {
        block: Block,
        done: oneshot::Sender<Result<(), ServiceError>>,
    },
    Flush {
        done: oneshot::Sender<Result<(), ServiceError>>,
    },
}

/// Cloneable handle shared by every connection
#[derive(Clone)]
pub struct NodeService {
    commands: mpsc::Sender<Command>,
    published: Arc<RwLock<Arc<NodeSnapshot>>>,
    owner: Address,
    params: ConsensusParams,
}

impl NodeService {
    /// Spawns the writer task over `ledger` and an empty mempool
    ///
    /// Must be called from within a tokio runtime. Without a store the
    /// chain lives in memory only.
    pub fn start(
        ledger: Ledger,
        store: Option<ChainStore>,
        owner: Address,
        params: ConsensusParams,
        mode: PersistenceMode,
    ) -> Self {
        let ledger = Arc::new(ledger);
        let mempool = Arc::new(Mempool::new());
        let published = Arc::new(RwLock::new(Arc::new(NodeSnapshot {
            ledger: ledger.clone(),
            mempool: mempool.clone(),
            persistence_dirty: false,
        })));

        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let writer = Writer {
            ledger,
            mempool,
            store,
            mode,
            owner: owner.clone(),
            params: params.clone(),
            published: published.clone(),
            dirty: false,
        };
        tokio::spawn(writer.run(receiver));

        NodeService {
            commands,
            published,
            owner,
            params,
        }
    }

    /// The most recently published state
    pub fn snapshot(&self) -> Arc<NodeSnapshot> {
        self.published.read().clone()
    }

    pub fn balance_of(&self, address: &Address) -> f64 {
        self.snapshot().ledger.balance_of(address)
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Validates a transaction and adds it to the mempool, returning its txid
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<String, ServiceError> {
        if tx.is_coinbase() {
            return Err(TransactionError::CoinbaseSubmission.into());
        }

        self.request(|done| Command::SubmitTransaction { tx, done }).await
    }

    /// Validates a sealed block and appends it to the chain
    pub async fn submit_block(&self, block: Block) -> Result<(), ServiceError> {
        self.request(|done| Command::SubmitBlock { block, done }).await
    }

    /// Writes the chain to the store
    pub async fn flush(&self) -> Result<(), ServiceError> {
        self.request(|done| Command::Flush { done }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> Command,
    ) -> Result<T, ServiceError> {
        let (done, reply) = oneshot::channel();

        self.commands
            .send(command(done))
            .await
            .map_err(|_| ServiceError::Unavailable)?;

        reply.await.map_err(|_| ServiceError::Unavailable)?
    }
}

/// State owned by the writer task
struct Writer {
    ledger: Arc<Ledger>,
    mempool: Arc<Mempool>,
    store: Option<ChainStore>,
    mode: PersistenceMode,
    owner: Address,
    params: ConsensusParams,
    published: Arc<RwLock<Arc<NodeSnapshot>>>,
    dirty: bool,
}

impl Writer {
    /// Runs until every [`NodeService`] handle is dropped
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::SubmitTransaction { tx, done } => {
                    let result = self.admit_transaction(tx).await;
                    let _ = done.send(result);
                }
                Command::SubmitBlock { block, done } => {
                    let result = self.accept_block(block).await;
                    let _ = done.send(result);
                }
                Command::Flush { done } => {
                    let result = self.persist().await.map_err(ServiceError::from);
                    self.publish();
                    let _ = done.send(result);
                }
            }
        }

        if self.dirty {
            let _ = self.persist().await;
        }
        debug!("Node writer stopped");
    }

    async fn admit_transaction(&mut self, mut tx: Transaction) -> Result<String, ServiceError> {
        let txid = tx.ensure_txid().to_string();

        let result = self.check_transaction(&tx);
        if let Err(err) = result {
            warn!("Rejected transaction {}: {}", txid, err);
            return Err(err);
        }

        info!(
            "Transaction added: {} -> {} ({} PHN)",
            tx.sender.display(),
            tx.recipient.display(),
            tx.amount
        );
        Arc::make_mut(&mut self.mempool).admit(tx)?;

        if self.dirty {
            let _ = self.persist().await;
        }
        self.publish();

        Ok(txid)
    }

    fn check_transaction(&self, tx: &Transaction) -> Result<(), ServiceError> {
        if self.ledger.contains(tx) {
            return Err(ServiceError::AlreadyMined);
        }
        if self.mempool.contains(tx) {
            return Err(MempoolError::DuplicateTx.into());
        }

        let available = PendingSpends::with_mempool(self.ledger.as_ref(), &self.mempool);
        validate_transaction(tx, &available)?;

        Ok(())
    }

    async fn accept_block(&mut self, block: Block) -> Result<(), ServiceError> {
        if let Err(err) = validate_block(&block, &self.ledger, &self.owner, &self.params) {
            warn!("Invalid block submitted: {}", err);
            return Err(err.into());
        }

        if self.mode == PersistenceMode::FlushBeforeAck {
            if let Some(store) = &self.store {
                let extended = self.ledger.blocks().iter().chain(iter::once(&block));
                if let Err(err) = store.save(extended).await {
                    error!("Refusing block {}, chain could not be saved: {}", block.index, err);
                    return Err(err.into());
                }
            }
            self.dirty = false;
        }

        let index = block.index;
        let miner = block.miner().map(Address::display).unwrap_or_default();

        Arc::make_mut(&mut self.mempool).drain(&block.transactions);
        Arc::make_mut(&mut self.ledger).append(block);

        info!("Block #{} accepted! Mined by {}", index, miner);
        info!(
            "Chain length: {}, pending transactions remaining: {}",
            self.ledger.len(),
            self.mempool.len()
        );

        if self.mode == PersistenceMode::BestEffort {
            self.dirty = true;
            let _ = self.persist().await;
        }
        self.publish();

        Ok(())
    }

    /// Saves the whole chain, tracking whether the file is behind
    async fn persist(&mut self) -> Result<(), StorageError> {
        let Some(store) = &self.store else {
            self.dirty = false;
            return Ok(());
        };

        match store.save(self.ledger.blocks()).await {
            Ok(()) => {
                if self.dirty {
                    debug!("Chain of {} blocks saved to {}", self.ledger.len(), store.path().display());
                }
                self.dirty = false;
                Ok(())
            }
            Err(err) => {
                error!("Failed to save chain to {}: {}", store.path().display(), err);
                self.dirty = true;
                Err(err)
            }
        }
    }

    fn publish(&self) {
        let snapshot = NodeSnapshot {
            ledger: self.ledger.clone(),
            mempool: self.mempool.clone(),
            persistence_dirty: self.dirty,
        };
        *self.published.write() = Arc::new(snapshot);
    }
}
