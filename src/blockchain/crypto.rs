use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;
use std::fs;
use std::path::Path;

/// Sender identity reserved for newly minted supply
pub const COINBASE: &str = "coinbase";

/// Display form returned when a canonical address is not valid hex
pub const INVALID_DISPLAY_ADDRESS: &str = "INVALID_ADDRESS";

/// Prefix of human-facing display addresses
const DISPLAY_PREFIX: &str = "PHN";

/// Number of hash hex characters kept in a display address
const DISPLAY_HASH_LEN: usize = 40;

/// Raw public key length: the X and Y coordinates without the SEC1 tag
const RAW_PUBLIC_KEY_LEN: usize = 64;

/// SEC1 tag of an uncompressed point
const UNCOMPRESSED_TAG: u8 = 0x04;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Invalid wallet file: {0}")]
    InvalidWalletFile(String),

    #[error("Wallet file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Canonical account identifier: the raw secp256k1 public key (`X‖Y`,
/// 128 hex characters) as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// The reserved minting sender
    pub fn coinbase() -> Self {
        Address(COINBASE.to_string())
    }

    /// Creates the canonical address of a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Address(hex::encode(&public_key.serialize_uncompressed()[1..]))
    }

    pub fn is_coinbase(&self) -> bool {
        self.0 == COINBASE
    }

    /// Converts the address back to the public key it encodes
    pub fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        let bytes = hex::decode(&self.0).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        if bytes.len() != RAW_PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidPublicKey("Invalid public key length".to_string()));
        }

        let mut encoded = Vec::with_capacity(RAW_PUBLIC_KEY_LEN + 1);
        encoded.push(UNCOMPRESSED_TAG);
        encoded.extend_from_slice(&bytes);

        PublicKey::from_slice(&encoded).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Human-facing form of this address, see [`display_address`]
    pub fn display(&self) -> String {
        display_address(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derives the cosmetic `PHN…` address of a canonical public key hex
///
/// Only ever used for presentation; validation always works on the
/// canonical address.
pub fn display_address(canonical: &str) -> String {
    match hex::decode(canonical) {
        Ok(bytes) => {
            let digest = format!("{:x}", Sha256::digest(&bytes));
            format!("{}{}", DISPLAY_PREFIX, &digest[..DISPLAY_HASH_LEN])
        }
        Err(_) => INVALID_DISPLAY_ADDRESS.to_string(),
    }
}

/// Represents a digital signature: raw `r‖s`, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    #[cfg(test)]
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(hex::encode(signature.serialize_compact()))
    }

    /// Decodes the signature, normalizing it to low-S form
    ///
    /// Wallets may produce either of the two equivalent `s` values.
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = hex::decode(&self.0).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        if bytes.len() != 64 {
            return Err(CryptoError::InvalidSignature("Invalid signature length".to_string()));
        }

        let mut signature =
            Signature::from_compact(&bytes).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        signature.normalize_s();

        Ok(signature)
    }
}

/// The digest wallets sign: SHA-1 of the message, left-padded to the
/// 32 bytes secp256k1 expects
fn message_digest(message: &[u8]) -> Message {
    let mut digest = [0u8; 32];
    digest[12..].copy_from_slice(&Sha1::digest(message));
    Message::from_digest(digest)
}

/// Represents a wallet with a keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    secret_key: SecretKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Self::from_key(SecretKey::new(&mut rng))
    }

    /// Creates a wallet from an existing secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        if secret_key_bytes.len() != 32 {
            return Err(CryptoError::InvalidPrivateKey("Invalid private key length".to_string()));
        }

        let secret_key = SecretKey::from_slice(secret_key_bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self::from_key(secret_key))
    }

    fn from_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret_key);
        let address = Address::from_public_key(&public_key);
        Wallet { secret_key, address }
    }

    /// Loads a wallet file: private key hex on the first line, canonical
    /// address on the second. The address must match the key.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CryptoError> {
        let contents = fs::read_to_string(path)?;
        let mut lines = contents.lines().map(str::trim).filter(|line| !line.is_empty());

        let (secret_hex, canonical) = match (lines.next(), lines.next()) {
            (Some(secret), Some(address)) => (secret, address),
            _ => {
                return Err(CryptoError::InvalidWalletFile(
                    "expected private key and canonical address".to_string(),
                ))
            }
        };

        if secret_hex.len() != 64 {
            return Err(CryptoError::InvalidPrivateKey(
                "Invalid private key hex length".to_string(),
            ));
        }

        let secret = hex::decode(secret_hex).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
        let wallet = Self::from_secret_key(&secret)?;

        if wallet.address.0 != canonical {
            return Err(CryptoError::InvalidWalletFile(
                "canonical address does not match the private key".to_string(),
            ));
        }

        Ok(wallet)
    }

    /// Writes the wallet in the format read by [`Wallet::load`]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CryptoError> {
        fs::write(path, format!("{}\n{}\n", self.export_secret_key_hex(), self.address))?;
        Ok(())
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn export_secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Signs a message with the wallet's private key
    #[cfg(test)]
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        let signature = Secp256k1::signing_only().sign_ecdsa(&message_digest(message), &self.secret_key);
        DigitalSignature::from_signature(&signature)
    }
}

/// Verifies a signature against a message and public key
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &PublicKey,
) -> Result<bool, CryptoError> {
    let signature = signature.to_signature()?;

    Ok(Secp256k1::verification_only()
        .verify_ecdsa(&message_digest(message), &signature, public_key)
        .is_ok())
}
