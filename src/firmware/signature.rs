use std::mem;

use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha512};

use super::SIGNATURE_LEN;

/// Incremental signature verification over a streamed message.
///
/// A verifier accumulates the message through [`update`](Verifier::update)
/// and checks the trailing signature once, at the end.
pub trait Verifier {
    /// Length of the signature trailer in bytes.
    fn signature_len(&self) -> usize;

    fn update(&mut self, data: &[u8]);

    /// Checks `signature` against everything passed to `update` so far.
    fn verify(&mut self, signature: &[u8]) -> bool;
}

/// Verifies Ed25519ph signatures (RFC 8032, SHA-512 prehash, no context).
#[derive(Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
    digest: Sha512,
}

impl Ed25519Verifier {
    pub fn new(key: VerifyingKey) -> Ed25519Verifier {
        Ed25519Verifier {
            key,
            digest: Sha512::new(),
        }
    }

    /// Creates a verifier from the 32 byte encoding of a public key.
    pub fn from_bytes(key: &[u8; 32]) -> crate::Result<Ed25519Verifier> {
        let key = VerifyingKey::from_bytes(key).map_err(|err| crate::Error::InvalidKey(err.to_string()))?;
        Ok(Ed25519Verifier::new(key))
    }

    pub fn key(&self) -> &VerifyingKey {
        &self.key
    }
}

impl Verifier for Ed25519Verifier {
    fn signature_len(&self) -> usize {
        SIGNATURE_LEN
    }

    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn verify(&mut self, signature: &[u8]) -> bool {
        let digest = mem::take(&mut self.digest);

        match Signature::from_slice(signature) {
            Ok(signature) => self.key.verify_prehashed(digest, None, &signature).is_ok(),
            Err(_) => false,
        }
    }
}

impl<V: Verifier + ?Sized> Verifier for &mut V {
    fn signature_len(&self) -> usize {
        (**self).signature_len()
    }

    fn update(&mut self, data: &[u8]) {
        (**self).update(data)
    }

    fn verify(&mut self, signature: &[u8]) -> bool {
        (**self).verify(signature)
    }
}
