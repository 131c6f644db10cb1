use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::crypto::{verify_signature, Address, DigitalSignature};
use super::number::{Amount, Timestamp};

/// Reasons a transaction is refused
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Malformed transaction: {0}")]
    Malformed(String),

    #[error("Amount must be positive")]
    NonPositiveAmount,

    #[error("Insufficient balance. Have: {have}, Need: {need}")]
    InsufficientBalance { have: f64, need: f64 },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Coinbase transactions can only be created by a block")]
    CoinbaseSubmission,
}

/// A value transfer between two accounts
///
/// Fields the node does not interpret are kept in `extra` so that the
/// transaction re-encodes to exactly what its author submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,

    pub recipient: Address,

    pub amount: Amount,

    pub timestamp: Timestamp,

    /// Content hash, derived on admission when the submitter omits it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<DigitalSignature>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    /// Creates an unsigned transfer stamped with the current time
    #[cfg(test)]
    pub fn new(sender: Address, recipient: Address, amount: Amount) -> Self {
        Transaction {
            sender,
            recipient,
            amount,
            timestamp: Timestamp::now(),
            txid: None,
            signature: None,
            extra: Map::new(),
        }
    }

    /// Creates the one-time owner allocation paid out by the genesis block
    pub fn genesis_allocation(owner: Address, amount: Amount) -> Self {
        let timestamp = Timestamp::now();
        let seed = format!("genesis_tx_{}_{}", owner, timestamp);

        Transaction {
            sender: Address::coinbase(),
            recipient: owner,
            amount,
            timestamp,
            txid: Some(sha256_hex(seed.as_bytes())),
            signature: Some(DigitalSignature("genesis_signature".to_string())),
            extra: Map::new(),
        }
    }

    /// The bytes a sender signs: `sender‖recipient‖amount‖timestamp`
    pub fn signing_message(&self) -> String {
        format!("{}{}{}{}", self.sender, self.recipient, self.amount, self.timestamp)
    }

    /// Content hash over the signing message
    pub fn compute_txid(&self) -> String {
        sha256_hex(self.signing_message().as_bytes())
    }

    pub fn txid(&self) -> Option<&str> {
        self.txid.as_deref()
    }

    /// Returns the txid, deriving it from the content when absent
    pub fn ensure_txid(&mut self) -> &str {
        if self.txid.is_none() {
            self.txid = Some(self.compute_txid());
        }

        self.txid.as_deref().unwrap_or_default()
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender.is_coinbase()
    }

    /// Checks the signature against the sender's public key
    ///
    /// Any decoding failure counts as an invalid signature.
    pub fn verify_signature(&self) -> bool {
        let signature = match &self.signature {
            Some(signature) => signature,
            None => return false,
        };

        let outcome = self
            .sender
            .to_public_key()
            .and_then(|key| verify_signature(self.signing_message().as_bytes(), signature, &key));

        match outcome {
            Ok(valid) => valid,
            Err(err) => {
                debug!(
                    "Signature verification failed for TX {}: {}",
                    self.txid().unwrap_or("N/A"),
                    err
                );
                false
            }
        }
    }

    /// Signs the transaction with a wallet
    #[cfg(test)]
    pub fn sign(&mut self, wallet: &super::crypto::Wallet) {
        self.signature = Some(wallet.sign(self.signing_message().as_bytes()));
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;

    #[test]
    fn test_sign_transaction() {
        let sender = Wallet::generate();
        let recipient = Wallet::generate();

        let mut transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            Amount::from_units(5),
        );
        assert!(!transaction.verify_signature());

        transaction.sign(&sender);
        assert!(transaction.verify_signature());

        transaction.amount = Amount::from_units(6);
        assert!(!transaction.verify_signature());
    }

    #[test]
    fn test_signature_by_other_key_is_rejected() {
        let sender = Wallet::generate();
        let thief = Wallet::generate();

        let mut transaction = Transaction::new(
            sender.address().clone(),
            thief.address().clone(),
            Amount::from_units(5),
        );
        transaction.sign(&thief);

        assert!(!transaction.verify_signature());
    }

    #[test]
    fn test_txid_derivation() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "sender": "aa",
            "recipient": "bb",
            "amount": 5,
            "timestamp": 1718000000.5,
            "signature": "00"
        }))
        .unwrap();

        assert_eq!(tx.signing_message(), "aabb51718000000.5");
        assert_eq!(tx.compute_txid(), sha256_hex(b"aabb51718000000.5"));

        let mut tx = tx;
        let derived = tx.ensure_txid().to_string();
        assert_eq!(tx.txid(), Some(derived.as_str()));
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let raw = serde_json::json!({
            "sender": "coinbase",
            "recipient": "bb",
            "amount": 50,
            "timestamp": 1718000000.25,
            "txid": "abc",
            "signature": "coinbase_signature",
            "recipient_display": "PHN1234"
        });

        let tx: Transaction = serde_json::from_value(raw.clone()).unwrap();
        assert!(tx.is_coinbase());
        assert_eq!(tx.extra.get("recipient_display"), Some(&Value::from("PHN1234")));
        assert_eq!(serde_json::to_value(&tx).unwrap(), raw);
    }

    #[test]
    fn test_genesis_allocation() {
        let owner = Wallet::generate();
        let tx = Transaction::genesis_allocation(owner.address().clone(), Amount::from_units(10_000_000));

        assert!(tx.is_coinbase());
        assert_eq!(tx.recipient, *owner.address());
        assert_eq!(tx.amount.to_string(), "10000000");
        assert_eq!(tx.txid().map(str::len), Some(64));
    }
}
