//! Command-line interface and node configuration.
//!
//! Every `run` flag can also be supplied through the environment, so a
//! deployment can keep its settings in an env file.

use clap::{Args, Parser, Subcommand};

use std::path::PathBuf;

/// Leading zero hex digits a block hash must carry
pub const DEFAULT_DIFFICULTY: usize = 2;

/// Coins paid by the coinbase of every non-genesis block
pub const DEFAULT_BLOCK_REWARD: u64 = 50;

/// Conceptual total supply
pub const DEFAULT_TOTAL_SUPPLY: u64 = 100_000_000;

/// Owner allocation paid by the genesis block, 10% of the total supply
pub const DEFAULT_OWNER_ALLOCATION: u64 = DEFAULT_TOTAL_SUPPLY / 10;

/// PHN ledger node.
///
/// Keeps the chain, admits signed transactions into the mempool and accepts
/// proof-of-work sealed blocks from miners over a WebSocket JSON protocol.
#[derive(Parser, Debug)]
#[command(name = "phn-node", version, propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Generate a wallet, optionally writing it as a wallet file.
    Keygen(KeygenArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Interface to listen on.
    #[arg(long, env = "NODE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port serving the WebSocket protocol and the REST API.
    #[arg(long, short = 'p', env = "NODE_PORT", default_value_t = 8765)]
    pub port: u16,

    /// Wallet file of the owner receiving the genesis allocation.
    #[arg(long, env = "OWNER_WALLET", default_value = "owner.txt")]
    pub owner_wallet: PathBuf,

    /// File the chain is persisted to.
    #[arg(long, env = "BLOCKCHAIN_FILE", default_value = "blockchain.json")]
    pub chain_file: PathBuf,

    #[arg(long, env = "DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    #[arg(long, env = "BLOCK_REWARD", default_value_t = DEFAULT_BLOCK_REWARD)]
    pub block_reward: u64,

    #[arg(long, env = "TOTAL_SUPPLY", default_value_t = DEFAULT_TOTAL_SUPPLY)]
    pub total_supply: u64,

    #[arg(long, env = "OWNER_ALLOCATION", default_value_t = DEFAULT_OWNER_ALLOCATION)]
    pub owner_allocation: u64,

    /// Persist an accepted block before acknowledging it. A block that
    /// cannot be written is then rejected instead of kept in memory only.
    #[arg(long, env = "STRICT_PERSISTENCE")]
    pub strict_persistence: bool,

    /// Default log filter, overridden by `RUST_LOG`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl RunArgs {
    pub fn consensus(&self) -> ConsensusParams {
        ConsensusParams {
            difficulty: self.difficulty,
            block_reward: self.block_reward,
            owner_allocation: self.owner_allocation,
            total_supply: self.total_supply,
        }
    }

    pub fn persistence(&self) -> PersistenceMode {
        if self.strict_persistence {
            PersistenceMode::FlushBeforeAck
        } else {
            PersistenceMode::BestEffort
        }
    }
}

/// Arguments for the `keygen` subcommand.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Write the wallet to this file (private key line, address line).
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

/// Rules every block is checked against
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusParams {
    pub difficulty: usize,
    pub block_reward: u64,
    pub owner_allocation: u64,
    pub total_supply: u64,
}

impl ConsensusParams {
    /// Coinbase amount a block at `index` must pay
    pub fn expected_coinbase(&self, index: u64) -> f64 {
        if index == 0 {
            self.owner_allocation as f64
        } else {
            self.block_reward as f64
        }
    }

    /// Supply left for block rewards after the owner allocation
    pub fn minable_supply(&self) -> u64 {
        self.total_supply.saturating_sub(self.owner_allocation)
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            difficulty: DEFAULT_DIFFICULTY,
            block_reward: DEFAULT_BLOCK_REWARD,
            owner_allocation: DEFAULT_OWNER_ALLOCATION,
            total_supply: DEFAULT_TOTAL_SUPPLY,
        }
    }
}

/// When an accepted block is written relative to its acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceMode {
    /// Append in memory, then save. A failed save is logged and retried on
    /// the next mutation; the block stays accepted.
    #[default]
    BestEffort,
    /// Save the extended chain first and reject the block if that fails.
    FlushBeforeAck,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["phn-node", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        assert_eq!(args.consensus(), ConsensusParams::default());
        assert_eq!(args.persistence(), PersistenceMode::BestEffort);
        assert_eq!(args.chain_file, PathBuf::from("blockchain.json"));
    }

    #[test]
    fn test_consensus_params() {
        let params = ConsensusParams::default();
        assert_eq!(params.owner_allocation, 10_000_000);
        assert_eq!(params.minable_supply(), 90_000_000);
        assert_eq!(params.expected_coinbase(0), 10_000_000.0);
        assert_eq!(params.expected_coinbase(7), 50.0);
    }
}
