//! Cryptographic primitives: account identities, key pairs and signatures

use crate::error::FriendbotError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Prefix of the textual form of an account id.
const ACCOUNT_ID_PREFIX: char = 'G';

/// Length of the key hint attached to every decorated signature.
pub const SIGNATURE_HINT_SIZE: usize = 4;

/// 32-byte identifier of a network, the SHA-256 of its passphrase.
pub type NetworkId = [u8; 32];

pub fn network_id(passphrase: &str) -> NetworkId {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// A ledger account identity: the compressed secp256k1 public key of the
/// account's master signer.
///
/// Rendered as `G` followed by 66 upper-case hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; PUBLIC_KEY_SIZE]);

impl AccountId {
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        AccountId(public_key.serialize())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FriendbotError> {
        // Reject anything that is not a point on the curve.
        let public_key = PublicKey::from_slice(bytes)
            .map_err(|e| FriendbotError::CryptoError(format!("Invalid account id: {}", e)))?;
        Ok(Self::from_public_key(&public_key))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Last four bytes of the key, used to match signatures to signers.
    pub fn hint(&self) -> [u8; SIGNATURE_HINT_SIZE] {
        let mut hint = [0u8; SIGNATURE_HINT_SIZE];
        hint.copy_from_slice(&self.0[PUBLIC_KEY_SIZE - SIGNATURE_HINT_SIZE..]);
        hint
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ACCOUNT_ID_PREFIX, hex::encode_upper(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

impl FromStr for AccountId {
    type Err = FriendbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(ACCOUNT_ID_PREFIX).ok_or_else(|| {
            FriendbotError::CryptoError(format!(
                "Account id must start with '{}': {}",
                ACCOUNT_ID_PREFIX, s
            ))
        })?;
        let bytes = hex::decode(body)
            .map_err(|e| FriendbotError::CryptoError(format!("Invalid hex account id: {}", e)))?;
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(FriendbotError::CryptoError(format!(
                "Account id must be {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }
        Self::from_bytes(&bytes)
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        AccountId::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, FriendbotError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                FriendbotError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                FriendbotError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Parses the hex form used in config files.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, FriendbotError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| FriendbotError::CryptoError(format!("Invalid hex secret key: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    pub fn account_id(&self) -> AccountId {
        AccountId::from_public_key(&self.public_key)
    }

    /// Signs a message (hashed with SHA-256 first) and returns the compact signature bytes.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], FriendbotError> {
        let digest = Sha256::digest(message);

        let message = Message::from_digest_slice(&digest)
            .map_err(|e| FriendbotError::CryptoError(format!("Failed to create message: {}", e)))?;

        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact())
    }
}

/// Verifies a compact ECDSA signature made by `signer` over `message`.
pub fn verify_signature(
    signer: &AccountId,
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), FriendbotError> {
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(FriendbotError::CryptoError(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(signer.as_bytes())
        .map_err(|e| FriendbotError::CryptoError(format!("Invalid public key: {}", e)))?;

    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| FriendbotError::CryptoError(format!("Failed to create message: {}", e)))?;

    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| FriendbotError::CryptoError(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| FriendbotError::CryptoError("Signature verification failed".to_string()))
}
