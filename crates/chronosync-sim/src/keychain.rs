//! Per-identity signing for published content
//!
//! Keys are derived from the identity name so every run of a scenario signs
//! with the same keys.

use chronosync_core::Name;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain prefix for key derivation
pub const DOMAIN_KEY: &[u8] = b"chronosync-key";

/// Keychain errors
#[derive(Debug, Error)]
pub enum KeyChainError {
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("signer mismatch: expected {expected}, got {actual}")]
    SignerMismatch { expected: String, actual: String },
    #[error("signature verification failed")]
    InvalidSignature,
}

/// Content as published under a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    /// `<session>/<seq>`
    pub name: String,
    pub content: Vec<u8>,
    pub freshness_ms: u64,
}

/// A packet with the publisher's signature over its canonical bytes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedData {
    pub packet: DataPacket,
    pub signer: [u8; 32],
    pub signature: Vec<u8>,
}

impl SignedData {
    /// Verify against the key expected for the publishing session
    pub fn verify(&self, expected_signer: &[u8; 32]) -> Result<(), KeyChainError> {
        if &self.signer != expected_signer {
            return Err(KeyChainError::SignerMismatch {
                expected: hex::encode(&expected_signer[..8]),
                actual: hex::encode(&self.signer[..8]),
            });
        }
        let verifying_key =
            VerifyingKey::from_bytes(&self.signer).map_err(|_| KeyChainError::InvalidPublicKey)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| KeyChainError::InvalidSignature)?;
        let bytes = postcard::to_allocvec(&self.packet)?;
        verifying_key
            .verify(&bytes, &signature)
            .map_err(|_| KeyChainError::InvalidSignature)
    }
}

/// Ed25519 signing identity
#[derive(Clone)]
pub struct KeyChain {
    signing_key: SigningKey,
}

impl KeyChain {
    /// Derive the key for an identity: BLAKE3("chronosync-key" || name)
    pub fn for_identity(identity: &Name) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN_KEY);
        hasher.update(identity.to_string().as_bytes());
        let seed = hasher.finalize();
        Self {
            signing_key: SigningKey::from_bytes(seed.as_bytes()),
        }
    }

    /// Get the public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Short hex form of the public key for logs
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.public_key()[..8])
    }

    /// Sign a packet
    pub fn sign(&self, packet: DataPacket) -> Result<SignedData, KeyChainError> {
        let bytes = postcard::to_allocvec(&packet)?;
        let signature = self.signing_key.sign(&bytes);
        Ok(SignedData {
            packet,
            signer: self.public_key(),
            signature: signature.to_bytes().to_vec(),
        })
    }
}

impl std::fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyChain")
            .field("public_key", &self.fingerprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> DataPacket {
        DataPacket {
            name: "/nodeA/1000/1".to_string(),
            content: b"/nodeA:1".to_vec(),
            freshness_ms: 4000,
        }
    }

    #[test]
    fn test_deterministic_keys() {
        let a = KeyChain::for_identity(&Name::parse("/nodeA"));
        let again = KeyChain::for_identity(&Name::parse("/nodeA"));
        let b = KeyChain::for_identity(&Name::parse("/nodeB"));
        assert_eq!(a.public_key(), again.public_key());
        assert_ne!(a.public_key(), b.public_key());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn test_sign_verify() {
        let keys = KeyChain::for_identity(&Name::parse("/nodeA"));
        let signed = keys.sign(packet()).unwrap();
        assert!(signed.verify(&keys.public_key()).is_ok());
    }

    #[test]
    fn test_tampered_content_rejected() {
        let keys = KeyChain::for_identity(&Name::parse("/nodeA"));
        let mut signed = keys.sign(packet()).unwrap();
        signed.packet.content = b"/nodeA:2".to_vec();
        assert!(matches!(
            signed.verify(&keys.public_key()),
            Err(KeyChainError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_signer_rejected() {
        let keys = KeyChain::for_identity(&Name::parse("/nodeA"));
        let other = KeyChain::for_identity(&Name::parse("/mallory"));
        let signed = other.sign(packet()).unwrap();
        assert!(matches!(
            signed.verify(&keys.public_key()),
            Err(KeyChainError::SignerMismatch { .. })
        ));
    }
}
