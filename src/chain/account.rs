//! Locally held Ed25519 accounts.
//!
//! The address is the account's authentication key for a single-key
//! Ed25519 scheme: `sha3_256(public_key || 0x00)`.

use ed25519_dalek::{Signer, SigningKey};
use secrecy::{ExposeSecret, SecretString};
use sha3::{Digest, Sha3_256};
use std::fmt;

use crate::types::AgentError;

/// Authentication-key scheme byte for single Ed25519 keys.
const ED25519_SCHEME: u8 = 0x00;

/// AIP-80 prefix some wallets export keys with.
const AIP80_PREFIX: &str = "ed25519-priv-";

/// A managed account: private key plus derived address.
#[derive(Clone)]
pub struct LocalAccount {
    signing_key: SigningKey,
    address: String,
}

impl LocalAccount {
    /// Parse a hex private key (`0x` and `ed25519-priv-` prefixes optional).
    pub fn from_private_key(key: &SecretString) -> Result<Self, AgentError> {
        let raw = key.expose_secret().trim();
        let raw = raw.strip_prefix(AIP80_PREFIX).unwrap_or(raw);
        let raw = raw.strip_prefix("0x").unwrap_or(raw);

        let bytes = hex::decode(raw).map_err(|e| AgentError::InvalidKey(e.to_string()))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            AgentError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;

        Ok(Self::from_seed(seed))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let address = derive_address(&signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// `0x`-prefixed, 64 hex chars.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.verifying_key().to_bytes()))
    }

    /// Sign a message and return the `0x`-prefixed hex signature.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        let signature = self.signing_key.sign(message);
        format!("0x{}", hex::encode(signature.to_bytes()))
    }
}

impl fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn derive_address(public_key: &[u8; 32]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(public_key);
    hasher.update([ED25519_SCHEME]);
    format!("0x{}", hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
