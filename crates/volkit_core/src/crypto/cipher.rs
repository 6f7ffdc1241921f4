//! AES-GCM needle encryption.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{consts::U12, generic_array::GenericArray, Aead, KeyInit},
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Bytes encryption adds to a plaintext.
pub const CIPHER_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;
/// Environment variable holding the encoded cipher key.
pub const CIPHER_KEY_ENV: &str = "ENCRYPTION_KEY";

/// AES-192 in GCM mode with a 96-bit nonce.
type Aes192Gcm = AesGcm<Aes192, U12>;

/// A 16-byte (AES-128), 24-byte (AES-192) or 32-byte (AES-256) key.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    bytes: Vec<u8>,
}

impl CipherKey {
    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error unless `bytes` is 16, 24 or 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        match bytes.len() {
            16 | 24 | 32 => Ok(Self {
                bytes: bytes.to_vec(),
            }),
            actual => Err(CoreError::InvalidKeySize { actual }),
        }
    }

    /// Decodes a key stored as base64 of the base64 text of the raw key.
    ///
    /// # Errors
    ///
    /// Returns an error if either decoding layer fails or the key has the
    /// wrong size.
    pub fn from_encoded(encoded: &str) -> CoreResult<Self> {
        let outer = Zeroizing::new(decode_layer(encoded.trim())?);
        let inner_text = std::str::from_utf8(&outer).map_err(|_| CoreError::InvalidKey {
            message: "inner key encoding is not text".into(),
        })?;
        let raw = Zeroizing::new(decode_layer(inner_text.trim())?);
        Self::from_bytes(&raw)
    }

    /// Reads the key from the `ENCRYPTION_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingCipherKey`] if the variable is unset or
    /// empty, or a decoding error.
    pub fn from_env() -> CoreResult<Self> {
        match std::env::var(CIPHER_KEY_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::from_encoded(&value),
            _ => Err(CoreError::MissingCipherKey),
        }
    }

    /// Reads an encoded key from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let contents = Zeroizing::new(std::fs::read_to_string(path)?);
        Self::from_encoded(&contents)
    }

    /// Encodes a raw key the way [`from_encoded`](Self::from_encoded)
    /// expects it.
    #[must_use]
    pub fn encode(&self) -> String {
        STANDARD.encode(STANDARD.encode(&self.bytes))
    }

    /// Key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; keys are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

fn decode_layer(text: &str) -> CoreResult<Vec<u8>> {
    STANDARD.decode(text).map_err(|e| CoreError::InvalidKey {
        message: e.to_string(),
    })
}

enum Inner {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// Encrypts and decrypts needle data.
///
/// Ciphertext layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct Cipher {
    inner: Inner,
}

impl Cipher {
    /// Creates a cipher for `key`, choosing the AES variant by its length.
    #[must_use]
    pub fn new(key: &CipherKey) -> Self {
        let inner = match key.bytes.len() {
            16 => Inner::Aes128(Aes128Gcm::new(GenericArray::from_slice(&key.bytes))),
            24 => Inner::Aes192(Aes192Gcm::new(GenericArray::from_slice(&key.bytes))),
            _ => Inner::Aes256(Aes256Gcm::new(GenericArray::from_slice(&key.bytes))),
        };
        Self { inner }
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = match &self.inner {
            Inner::Aes128(c) => c.encrypt(nonce, plaintext),
            Inner::Aes192(c) => c.encrypt(nonce, plaintext),
            Inner::Aes256(c) => c.encrypt(nonce, plaintext),
        }
        .map_err(|_| CoreError::encryption_failed("encryption error"))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + sealed.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(sealed);
        Ok(result)
    }

    /// Decrypts data produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns an error for short input, a wrong key or tampered data.
    pub fn decrypt(&self, ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
        if ciphertext.len() < CIPHER_OVERHEAD {
            return Err(CoreError::decryption_failed("ciphertext too short"));
        }
        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        let sealed = &ciphertext[NONCE_SIZE..];
        match &self.inner {
            Inner::Aes128(c) => c.decrypt(nonce, sealed),
            Inner::Aes192(c) => c.decrypt(nonce, sealed),
            Inner::Aes256(c) => c.decrypt(nonce, sealed),
        }
        .map_err(|_| CoreError::decryption_failed("decryption error"))
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.inner {
            Inner::Aes128(_) => "Aes128Gcm",
            Inner::Aes192(_) => "Aes192Gcm",
            Inner::Aes256(_) => "Aes256Gcm",
        };
        f.debug_struct("Cipher").field("cipher", &name).finish()
    }
}
