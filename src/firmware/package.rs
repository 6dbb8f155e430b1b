use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha512};

use super::UPDATE_MAGIC;

/// Builds signed update packages.
///
/// # Examples
///
/// ```
/// use ed25519_dalek::SigningKey;
/// use multipart_ota::firmware::UpdatePackage;
///
/// let key = SigningKey::from_bytes(&[7; 32]);
/// let package = UpdatePackage::new()
///     .image(0x2000, b"application image".to_vec())
///     .sign(&key)
///     .unwrap();
///
/// // header, image header, image padded to 20 bytes, signature
/// assert_eq!(package.len(), 8 + 8 + 20 + 64);
/// ```
#[derive(Debug, Clone, Default)]
pub struct UpdatePackage {
    images: Vec<(u32, Vec<u8>)>,
}

impl UpdatePackage {
    pub fn new() -> UpdatePackage {
        UpdatePackage::default()
    }

    /// Appends an image for `address`. The content is padded with zeros to a
    /// multiple of 4 bytes.
    pub fn image(mut self, address: u32, mut content: Vec<u8>) -> UpdatePackage {
        let padded = (content.len() + 3) & !3;
        content.resize(padded, 0);
        self.images.push((address, content));
        self
    }

    /// The package without its signature trailer, i.e. the signed bytes.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let len = 8 + self.images.iter().map(|(_, content)| 8 + content.len()).sum::<usize>();
        let mut out = Vec::with_capacity(len);

        out.extend_from_slice(&UPDATE_MAGIC.to_le_bytes());
        out.extend_from_slice(&(self.images.len() as u32).to_le_bytes());

        for (address, content) in &self.images {
            out.extend_from_slice(&address.to_le_bytes());
            out.extend_from_slice(&(content.len() as u32).to_le_bytes());
            out.extend_from_slice(content);
        }

        out
    }

    /// The complete package, signed with Ed25519ph.
    pub fn sign(&self, key: &SigningKey) -> crate::Result<Vec<u8>> {
        let mut out = self.unsigned_bytes();

        let mut digest = Sha512::new();
        digest.update(&out);
        let signature = key
            .sign_prehashed(digest, None)
            .map_err(|err| crate::Error::Signing(err.to_string()))?;

        out.extend_from_slice(&signature.to_bytes());
        Ok(out)
    }
}
