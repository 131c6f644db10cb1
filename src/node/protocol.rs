//! JSON request/response protocol spoken by wallets and miners.
//!
//! One JSON object per message, selected by its `type` field. Every request
//! gets exactly one response object; failures are reported in the response
//! and never close the connection.

use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::blockchain::validation::{parse_block, parse_transaction};
use crate::blockchain::{display_address, Address, Block, Transaction};

use super::service::{NodeService, ServiceError};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Request {
    GetBalance {
        #[serde(default)]
        address: Value,
    },
    GetBlockchain,
    GetPending,
    GetNodeInfo,
    SendTx {
        #[serde(default)]
        tx: Value,
    },
    SubmitBlock {
        #[serde(default)]
        block: Value,
    },
}

/// Handles one inbound message and returns the response to send back
pub async fn handle_message(service: &NodeService, text: &str) -> Value {
    let message: Value = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!("Invalid JSON: {}", err);
            return error("Invalid JSON");
        }
    };

    let request: Request = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(err) => {
            debug!("Unrecognised message: {}", err);
            return error("Unknown message type");
        }
    };
    debug!("Received message: {}", request_kind(&request));

    let response = match request {
        Request::GetBalance { address } => Ok(get_balance(service, &address)),
        Request::GetBlockchain => get_blockchain(service),
        Request::GetPending => get_pending(service),
        Request::GetNodeInfo => Ok(get_node_info(service)),
        Request::SendTx { tx } => Ok(send_tx(service, tx).await),
        Request::SubmitBlock { block } => Ok(submit_block(service, block).await),
    };

    response.unwrap_or_else(|err| internal_error(&err))
}

fn request_kind(request: &Request) -> &'static str {
    match request {
        Request::GetBalance { .. } => "get_balance",
        Request::GetBlockchain => "get_blockchain",
        Request::GetPending => "get_pending",
        Request::GetNodeInfo => "get_node_info",
        Request::SendTx { .. } => "send_tx",
        Request::SubmitBlock { .. } => "submit_block",
    }
}

fn get_balance(service: &NodeService, address: &Value) -> Value {
    if is_absent(address) {
        return error("No address provided");
    }
    let Some(address) = address.as_str() else {
        return error("Address must be a string");
    };

    let balance = service.balance_of(&Address(address.to_string()));
    debug!("Balance query for {}: {} PHN", display_address(address), balance);

    json!({
        "address": address,
        "display_address": display_address(address),
        "balance": balance,
    })
}

fn get_blockchain(service: &NodeService) -> Result<Value, serde_json::Error> {
    let snapshot = service.snapshot();
    let blocks = snapshot
        .ledger
        .blocks()
        .iter()
        .map(decorate_block)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "blockchain": blocks,
        "length": snapshot.ledger.len(),
    }))
}

fn get_pending(service: &NodeService) -> Result<Value, serde_json::Error> {
    let snapshot = service.snapshot();
    let pending = snapshot
        .mempool
        .transactions()
        .iter()
        .map(decorate_transaction)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "pending_transactions": pending,
        "count": snapshot.mempool.len(),
    }))
}

fn get_node_info(service: &NodeService) -> Value {
    let snapshot = service.snapshot();
    let params = service.params();
    let rewards_paid = snapshot.ledger.total_minted() - params.owner_allocation as f64;
    let remaining = (params.minable_supply() as f64 - rewards_paid).max(0.0);

    json!({
        "difficulty": params.difficulty,
        "block_reward": params.block_reward,
        "owner_allocation": params.owner_allocation,
        "total_supply": params.total_supply,
        "minable_supply_remaining": remaining,
        "length": snapshot.ledger.len(),
        "pending_count": snapshot.mempool.len(),
        "owner": service.owner(),
        "owner_display": service.owner().display(),
        "persistence_dirty": snapshot.persistence_dirty,
    })
}

async fn send_tx(service: &NodeService, tx: Value) -> Value {
    if is_absent(&tx) {
        return error("No transaction provided");
    }

    let tx = match parse_transaction(tx) {
        Ok(tx) => tx,
        Err(err) => {
            warn!("Rejected transaction: {}", err);
            return error(err);
        }
    };

    match service.submit_transaction(tx).await {
        Ok(txid) => json!({
            "status": "success",
            "message": "Transaction received and added to mempool",
            "txid": txid,
        }),
        Err(err @ ServiceError::Unavailable) => internal_error(&err),
        Err(err) => error(err),
    }
}

async fn submit_block(service: &NodeService, block: Value) -> Value {
    if is_absent(&block) {
        return error("No block provided");
    }

    let result = match parse_block(block) {
        Ok(block) => service.submit_block(block).await,
        Err(err) => {
            warn!("Invalid block submitted: {}", err);
            Err(err.into())
        }
    };

    match result {
        Ok(()) => json!({"status": "success", "message": "Block accepted!"}),
        Err(err @ ServiceError::Unavailable) => internal_error(&err),
        Err(err) => json!({"status": "error", "message": err.to_string()}),
    }
}

/// Copy of a block whose transactions carry display addresses
fn decorate_block(block: &Block) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(block)?;

    if let Value::Object(fields) = &mut value {
        let transactions = block
            .transactions
            .iter()
            .map(decorate_transaction)
            .collect::<Result<Vec<_>, _>>()?;
        fields.insert("transactions".to_string(), Value::Array(transactions));
    }

    Ok(value)
}

/// Copy of a transaction with `sender_display` and `recipient_display`
fn decorate_transaction(tx: &Transaction) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(tx)?;

    if let Value::Object(fields) = &mut value {
        if !tx.is_coinbase() {
            fields.insert("sender_display".to_string(), json!(tx.sender.display()));
        }
        fields.insert("recipient_display".to_string(), json!(tx.recipient.display()));
    }

    Ok(value)
}

/// Payloads that count as "not provided": null, false, zero and empty values
fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

fn error(reason: impl ToString) -> Value {
    json!({"error": reason.to_string()})
}

fn internal_error(err: &dyn std::error::Error) -> Value {
    json!({"error": format!("Internal error: {}", err)})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::number::Amount;
    use crate::blockchain::test_utils::{candidate, coinbase, genesis_ledger, seal, signed_transfer, test_params};
    use crate::blockchain::Wallet;
    use crate::config::PersistenceMode;

    fn start() -> (Wallet, NodeService) {
        let (owner, ledger) = genesis_ledger();
        let service = NodeService::start(
            ledger,
            None,
            owner.address().clone(),
            test_params(),
            PersistenceMode::BestEffort,
        );
        (owner, service)
    }

    async fn call(service: &NodeService, request: Value) -> Value {
        handle_message(service, &request.to_string()).await
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_messages() {
        let (_, service) = start();

        assert_eq!(handle_message(&service, "{not json").await, json!({"error": "Invalid JSON"}));
        assert_eq!(
            call(&service, json!({"type": "mine_for_me"})).await,
            json!({"error": "Unknown message type"})
        );
        assert_eq!(
            call(&service, json!({"address": "aa"})).await,
            json!({"error": "Unknown message type"})
        );
    }

    #[tokio::test]
    async fn test_missing_payloads() {
        let (_, service) = start();

        assert_eq!(
            call(&service, json!({"type": "get_balance"})).await,
            json!({"error": "No address provided"})
        );
        assert_eq!(
            call(&service, json!({"type": "send_tx", "tx": {}})).await,
            json!({"error": "No transaction provided"})
        );
        assert_eq!(
            call(&service, json!({"type": "submit_block", "block": null})).await,
            json!({"error": "No block provided"})
        );
    }

    #[tokio::test]
    async fn test_get_balance_reports_display_address() {
        let (owner, service) = start();
        let address = owner.address().to_string();

        let response = call(&service, json!({"type": "get_balance", "address": address})).await;
        assert_eq!(response["address"], json!(address));
        assert_eq!(response["balance"], json!(10_000_000.0));
        assert_eq!(response["display_address"], json!(owner.address().display()));

        let response = call(&service, json!({"type": "get_balance", "address": "not-hex"})).await;
        assert_eq!(response["balance"], json!(0.0));
        assert_eq!(response["display_address"], json!("INVALID_ADDRESS"));
    }

    #[tokio::test]
    async fn test_send_tx_flow() {
        let (owner, service) = start();
        let bob = Wallet::generate();

        let tx = serde_json::to_value(signed_transfer(&owner, bob.address(), Amount::from_units(12))).unwrap();
        let response = call(&service, json!({"type": "send_tx", "tx": tx})).await;
        assert_eq!(response["status"], json!("success"));
        assert_eq!(response["message"], json!("Transaction received and added to mempool"));
        let txid = response["txid"].as_str().unwrap().to_string();

        let response = call(&service, json!({"type": "send_tx", "tx": tx})).await;
        assert_eq!(response, json!({"error": "Transaction already in mempool"}));

        let pending = call(&service, json!({"type": "get_pending"})).await;
        assert_eq!(pending["count"], json!(1));
        let entry = &pending["pending_transactions"][0];
        assert_eq!(entry["txid"], json!(txid));
        assert_eq!(entry["sender_display"], json!(owner.address().display()));
        assert_eq!(entry["recipient_display"], json!(bob.address().display()));

        // decoration never reaches stored state
        let snapshot = service.snapshot();
        let stored = &snapshot.mempool.transactions()[0];
        assert!(stored.extra.is_empty());
    }

    #[tokio::test]
    async fn test_send_tx_rejections() {
        let (owner, service) = start();
        let stranger = Wallet::generate();

        let mut tx = serde_json::to_value(signed_transfer(&owner, stranger.address(), Amount::from_units(1))).unwrap();
        tx.as_object_mut().unwrap().remove("signature");
        let response = call(&service, json!({"type": "send_tx", "tx": tx})).await;
        assert_eq!(response, json!({"error": "Missing field: signature"}));

        let tx = serde_json::to_value(signed_transfer(&stranger, owner.address(), Amount::from_units(5))).unwrap();
        let response = call(&service, json!({"type": "send_tx", "tx": tx})).await;
        assert_eq!(response, json!({"error": "Insufficient balance. Have: 0, Need: 5"}));

        let tx = serde_json::to_value(coinbase(stranger.address(), 500)).unwrap();
        let response = call(&service, json!({"type": "send_tx", "tx": tx})).await;
        assert_eq!(
            response,
            json!({"error": "Coinbase transactions can only be created by a block"})
        );
    }

    #[tokio::test]
    async fn test_submit_block_flow() {
        let (owner, service) = start();
        let miner = Wallet::generate();
        let params = test_params();

        let tx = serde_json::to_value(signed_transfer(&owner, miner.address(), Amount::from_units(4))).unwrap();
        call(&service, json!({"type": "send_tx", "tx": tx})).await;

        // miners copy the decorated pending entries straight into their block
        let pending = call(&service, json!({"type": "get_pending"})).await;
        let mut transactions = vec![coinbase(miner.address(), params.block_reward)];
        for entry in pending["pending_transactions"].as_array().unwrap() {
            transactions.push(serde_json::from_value(entry.clone()).unwrap());
        }
        let block = seal(candidate(&service.snapshot().ledger, transactions), params.difficulty);

        let mut tampered = serde_json::to_value(&block).unwrap();
        tampered["nonce"] = json!(block.nonce + 1);
        let response = call(&service, json!({"type": "submit_block", "block": tampered})).await;
        assert_eq!(response, json!({"status": "error", "message": "Invalid block hash"}));

        let response = call(&service, json!({"type": "submit_block", "block": block})).await;
        assert_eq!(response, json!({"status": "success", "message": "Block accepted!"}));

        let chain = call(&service, json!({"type": "get_blockchain"})).await;
        assert_eq!(chain["length"], json!(2));
        let reward = &chain["blockchain"][1]["transactions"][0];
        assert!(reward.get("sender_display").is_none());
        assert_eq!(reward["recipient_display"], json!(miner.address().display()));
        assert_eq!(chain["blockchain"][1]["hash"], json!(block.hash));

        let balance = call(&service, json!({"type": "get_balance", "address": miner.address()})).await;
        assert_eq!(balance["balance"], json!(54.0));
        assert_eq!(call(&service, json!({"type": "get_pending"})).await["count"], json!(0));
    }

    #[tokio::test]
    async fn test_submit_block_missing_field() {
        let (_, service) = start();

        let response = call(&service, json!({"type": "submit_block", "block": {"index": 1}})).await;
        assert_eq!(response["status"], json!("error"));
        assert_eq!(response["message"], json!("Block missing field: timestamp"));
    }

    #[tokio::test]
    async fn test_get_node_info() {
        let (owner, service) = start();

        let info = call(&service, json!({"type": "get_node_info"})).await;
        assert_eq!(info["difficulty"], json!(2));
        assert_eq!(info["block_reward"], json!(50));
        assert_eq!(info["minable_supply_remaining"], json!(90_000_000.0));
        assert_eq!(info["length"], json!(1));
        assert_eq!(info["pending_count"], json!(0));
        assert_eq!(info["owner"], json!(owner.address()));
        assert_eq!(info["persistence_dirty"], json!(false));
    }
}
