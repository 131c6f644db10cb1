use serde::{Deserialize, Serialize};
use serde_json::ser::{Formatter, Serializer};
use serde_json::{json, Map, Value};

use std::io::{self, Write};

use super::crypto::Address;
use super::number::{Amount, Timestamp};
use super::transaction::{sha256_hex, Transaction};

/// `prev_hash` carried by the genesis block
pub const GENESIS_PREV_HASH: &str = "0";

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Timestamp when the block was assembled
    pub timestamp: Timestamp,

    /// Transactions in miner order, coinbase first
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub prev_hash: String,

    /// Proof of work
    pub nonce: u64,

    /// Hash over every other field
    pub hash: String,

    /// Fields added by the miner that the node does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    /// Creates the genesis block paying the owner allocation
    ///
    /// The genesis block is synthesized locally and carries no proof of work.
    pub fn genesis(owner: Address, allocation: Amount) -> Self {
        let mut block = Block {
            index: 0,
            timestamp: Timestamp::now(),
            transactions: vec![Transaction::genesis_allocation(owner, allocation)],
            prev_hash: GENESIS_PREV_HASH.to_string(),
            nonce: 0,
            hash: String::new(),
            extra: Map::new(),
        };

        block.hash = block.calculate_hash();
        block
    }

    /// Calculates the hash of the block
    ///
    /// SHA-256 over the canonical JSON encoding of the block without its
    /// `hash` field: keys sorted, `", "` and `": "` separators and ASCII-only
    /// string escapes.
    pub fn calculate_hash(&self) -> String {
        let mut fields = self.extra.clone();
        fields.insert("index".to_string(), json!(self.index));
        fields.insert("timestamp".to_string(), json!(self.timestamp));
        fields.insert("transactions".to_string(), json!(self.transactions));
        fields.insert("prev_hash".to_string(), json!(self.prev_hash));
        fields.insert("nonce".to_string(), json!(self.nonce));
        fields.remove("hash");

        sha256_hex(&canonical_json(&Value::Object(fields)))
    }

    /// Whether the stated hash carries `difficulty` leading zero hex digits
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    /// The coinbase transactions of the block
    pub fn coinbase_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| tx.is_coinbase())
    }

    /// Recipient of the block's coinbase, used when logging who mined it
    pub fn miner(&self) -> Option<&Address> {
        self.coinbase_transactions().next().map(|tx| &tx.recipient)
    }
}

pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Encodes a JSON value the way the miners hash it
///
/// Object keys come out sorted because `serde_json::Map` is ordered.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, CanonicalFormatter);
    // writing a Value into a Vec cannot fail
    let _ = value.serialize(&mut serializer);
    out
}

/// `", "` and `": "` separators, everything outside printable ASCII
/// escaped as `\uXXXX`
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        for c in fragment.chars() {
            if matches!(c, ' '..='~') {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}
