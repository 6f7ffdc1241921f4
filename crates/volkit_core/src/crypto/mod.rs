//! Needle data encryption.
//!
//! ## Security Model
//!
//! - AES-GCM with a 16, 24 or 32-byte key (AES-128, AES-192, AES-256)
//! - Unique random nonce per encryption, stored in front of the ciphertext
//! - Keys are zeroized on drop and redacted from debug output
//!
//! ## Usage
//!
//! ```ignore
//! use volkit_core::crypto::{Cipher, CipherKey};
//!
//! let key = CipherKey::from_env()?;
//! let cipher = Cipher::new(&key);
//!
//! let sealed = cipher.encrypt(b"needle data")?;
//! let plain = cipher.decrypt(&sealed)?;
//! ```

mod cipher;

pub use cipher::{Cipher, CipherKey, CIPHER_KEY_ENV, CIPHER_OVERHEAD, NONCE_SIZE, TAG_SIZE};
