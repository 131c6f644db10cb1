use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{display_address, Address, Block, Transaction};
use crate::node::NodeService;

/// Shared handle to the running node
pub type NodeData = web::Data<NodeService>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    #[schema(value_type = Vec<Object>)]
    pub chain: Vec<Block>,

    /// Whether stored hashes and links check out
    pub is_valid: bool,
}

/// Response for the pending transactions endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PendingResponse {
    pub count: usize,

    /// Transactions in arrival order
    #[schema(value_type = Vec<Object>)]
    pub transactions: Vec<Transaction>,
}

/// Get the full blockchain
///
/// Returns the entire blockchain and its validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    let snapshot = node.snapshot();

    let response = ChainResponse {
        length: snapshot.ledger.len(),
        chain: snapshot.ledger.blocks().to_vec(),
        is_valid: snapshot.ledger.verify_integrity().is_ok(),
    };

    HttpResponse::Ok().json(response)
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = PendingResponse)
    )
)]
pub async fn get_pending_transactions(node: NodeData) -> impl Responder {
    let snapshot = node.snapshot();

    HttpResponse::Ok().json(PendingResponse {
        count: snapshot.mempool.len(),
        transactions: snapshot.mempool.transactions().to_vec(),
    })
}

/// Response for the chain validation endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    pub is_valid: bool,

    /// First problem found, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Check if the blockchain is valid
///
/// Recomputes every block hash and checks indices and previous-hash links
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    let response = match node.snapshot().ledger.verify_integrity() {
        Ok(()) => ValidationResponse {
            is_valid: true,
            error: None,
        },
        Err(err) => ValidationResponse {
            is_valid: false,
            error: Some(err.to_string()),
        },
    };

    HttpResponse::Ok().json(response)
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    /// Canonical address (public key hex)
    pub address: String,

    /// Human-facing PHN address
    pub display_address: String,

    pub balance: f64,
}

/// Get wallet balance
///
/// Returns the confirmed balance of a canonical address
#[utoipa::path(
    get,
    path = "/api/v1/balance/{address}",
    params(
        ("address" = String, Path, description = "Canonical address (public key hex)")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_balance(node: NodeData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());

    HttpResponse::Ok().json(BalanceResponse {
        balance: node.balance_of(&address),
        display_address: address.display(),
        address: address.0,
    })
}

/// Response for the get accounts endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    /// The address of the account
    pub address: String,

    pub display_address: String,

    /// The balance of the account
    pub balance: f64,
}

/// Get all accounts
///
/// Returns every address that appears in the chain, except the coinbase
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    responses(
        (status = 200, description = "Accounts retrieved successfully", body = Vec<AccountResponse>)
    )
)]
pub async fn get_all_accounts(node: NodeData) -> impl Responder {
    let snapshot = node.snapshot();

    let mut accounts: Vec<AccountResponse> = snapshot
        .ledger
        .accounts()
        .map(|(address, balance)| AccountResponse {
            address: address.0.clone(),
            display_address: display_address(&address.0),
            balance,
        })
        .collect();
    accounts.sort_by(|a, b| a.address.cmp(&b.address));

    HttpResponse::Ok().json(accounts)
}

/// Response for the node info endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NodeInfoResponse {
    pub difficulty: usize,
    pub block_reward: u64,
    pub owner_allocation: u64,
    pub total_supply: u64,
    pub minted: f64,
    pub length: usize,
    pub pending_count: usize,
    pub owner: String,
    pub owner_display: String,

    /// The chain file is behind the in-memory chain
    pub persistence_dirty: bool,
}

/// Get node parameters
///
/// Returns consensus parameters and a summary of the node state
#[utoipa::path(
    get,
    path = "/api/v1/node",
    responses(
        (status = 200, description = "Node info retrieved successfully", body = NodeInfoResponse)
    )
)]
pub async fn get_node_info(node: NodeData) -> impl Responder {
    let snapshot = node.snapshot();
    let params = node.params();

    HttpResponse::Ok().json(NodeInfoResponse {
        difficulty: params.difficulty,
        block_reward: params.block_reward,
        owner_allocation: params.owner_allocation,
        total_supply: params.total_supply,
        minted: snapshot.ledger.total_minted(),
        length: snapshot.ledger.len(),
        pending_count: snapshot.mempool.len(),
        owner: node.owner().0.clone(),
        owner_display: node.owner().display(),
        persistence_dirty: snapshot.persistence_dirty,
    })
}
