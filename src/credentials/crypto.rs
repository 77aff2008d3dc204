//! Token encryption at rest: AES-256-CBC with a random per-call IV, stored
//! as `hex(iv):hex(ciphertext)`.

use crate::errors::{GitSyncError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Symmetric cipher for credential material. The key is fixed for the
/// process lifetime and validated at construction.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Build a cipher from the configured key string.
    ///
    /// Accepts a 64-hex-character key (decoded to 32 raw bytes) or any
    /// string of at least 32 characters (first 32 bytes used). Anything
    /// shorter is rejected here so a broken key configuration fails at
    /// startup rather than on first use.
    pub fn new(key: &str) -> Result<Self> {
        let bytes = if key.len() == 2 * KEY_LEN && key.bytes().all(|b| b.is_ascii_hexdigit()) {
            hex::decode(key)
                .map_err(|e| GitSyncError::crypto(format!("Invalid hex encryption key: {e}")))?
        } else if key.len() >= KEY_LEN {
            key.as_bytes()[..KEY_LEN].to_vec()
        } else {
            return Err(GitSyncError::crypto(format!(
                "Encryption key must be 64 hex characters or at least {KEY_LEN} characters, got {}",
                key.len()
            )));
        };

        let mut key_arr = [0u8; KEY_LEN];
        key_arr.copy_from_slice(&bytes);
        Ok(Self { key: key_arr })
    }

    /// Encrypt a plaintext. Non-deterministic: a fresh IV is drawn per call.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
    }

    /// Decrypt a stored `hex(iv):hex(ciphertext)` value.
    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let parts: Vec<&str> = stored.splitn(2, ':').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(GitSyncError::crypto(
                "Invalid encrypted value format, expected iv:ciphertext",
            ));
        }

        let iv_bytes = hex::decode(parts[0])
            .map_err(|_| GitSyncError::crypto("Invalid encrypted value format, bad IV encoding"))?;
        if iv_bytes.len() != IV_LEN {
            return Err(GitSyncError::crypto(
                "Invalid encrypted value format, IV must be 16 bytes",
            ));
        }
        let ciphertext = hex::decode(parts[1]).map_err(|_| {
            GitSyncError::crypto("Invalid encrypted value format, bad ciphertext encoding")
        })?;

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&iv_bytes);

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| GitSyncError::crypto("Decryption failed, wrong key or corrupt data"))?;

        String::from_utf8(plaintext)
            .map_err(|_| GitSyncError::crypto("Decrypted data is not valid UTF-8"))
    }
}
