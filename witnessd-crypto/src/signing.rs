//! Ed25519 signing for declaration statements and checkpoint roots.
//!
//! The signing key is the provenance root of trust: §1 explicitly excludes
//! "defending against adversaries who control the machine before the
//! signing key is created," so this module only needs to get key
//! generation, storage-ready serialization, and constant-time verification
//! right — not key distribution or revocation.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// A device's Ed25519 signing key, loaded from or destined for
/// `$STATE_DIR/signing_key` (§6).
///
/// `SigningKey` zeroizes its own memory on drop (the `zeroize` feature of
/// `ed25519-dalek`), so this wrapper needs no `Drop` impl of its own; the
/// scrubbing this module still owns is on the byte buffers that leave the
/// key's memory — [`DeviceSigningKey::to_bytes`]'s return value, and
/// whatever the caller does with it (e.g. writing it to disk).
pub struct DeviceSigningKey(SigningKey);

/// The corresponding public key, persisted at `$STATE_DIR/signing_key.pub`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevicePublicKey(VerifyingKey);

/// First 16 bytes of `SHA256(public_key)`, per §6 "device-id = first 16
/// bytes of `SHA256(pub)`".
pub type DeviceId = [u8; 16];

impl DeviceSigningKey {
    /// Generate a fresh key using the supplied CSPRNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        DeviceSigningKey(SigningKey::generate(rng))
    }

    /// Load a key from its 32-byte seed representation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyMaterial(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(DeviceSigningKey(SigningKey::from_bytes(&arr)))
    }

    /// The raw 32-byte seed, for writing to `signing_key`. Wrapped in
    /// [`Zeroizing`] so the copy this call makes gets scrubbed once the
    /// caller drops it, rather than lingering in freed memory.
    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.0.to_bytes())
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> DevicePublicKey {
        DevicePublicKey(self.0.verifying_key())
    }

    /// Sign an arbitrary message.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.0.sign(message).to_bytes()
    }
}

impl DevicePublicKey {
    /// Load a public key from its 32-byte representation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyMaterial(format!("expected 32 bytes, got {}", bytes.len())))?;
        VerifyingKey::from_bytes(&arr)
            .map(DevicePublicKey)
            .map_err(|e| Error::InvalidKeyMaterial(e.to_string()))
    }

    /// The raw 32-byte representation, for writing to `signing_key.pub`.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Derive the device id: first 16 bytes of `SHA256(pub)`.
    pub fn device_id(&self) -> DeviceId {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.to_bytes());
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        id
    }

    /// Verify a signature produced by [`DeviceSigningKey::sign`].
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<()> {
        let sig = Signature::from_bytes(signature);
        self.0
            .verify(message, &sig)
            .map_err(|_| Error::SignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn sign_and_verify_round_trip() {
        let key = DeviceSigningKey::generate(&mut OsRng);
        let pubkey = key.public_key();
        let sig = key.sign(b"declaration digest");
        assert!(pubkey.verify(b"declaration digest", &sig).is_ok());
    }

    #[test]
    fn tampered_message_rejected() {
        let key = DeviceSigningKey::generate(&mut OsRng);
        let pubkey = key.public_key();
        let sig = key.sign(b"declaration digest");
        assert!(pubkey.verify(b"different digest", &sig).is_err());
    }

    #[test]
    fn device_id_is_deterministic() {
        let key = DeviceSigningKey::generate(&mut OsRng);
        let pubkey = key.public_key();
        assert_eq!(pubkey.device_id(), pubkey.device_id());
        assert_eq!(pubkey.device_id().len(), 16);
    }

    #[test]
    fn key_round_trips_through_bytes() {
        let key = DeviceSigningKey::generate(&mut OsRng);
        let restored = DeviceSigningKey::from_bytes(&key.to_bytes()[..]).unwrap();
        assert_eq!(key.public_key(), restored.public_key());
    }
}
