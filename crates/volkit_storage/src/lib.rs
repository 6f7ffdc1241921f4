//! # volkit storage
//!
//! Raw byte-store backends for volume data logs.
//!
//! Backends are **opaque byte stores**: they know nothing about needles,
//! super blocks or index entries. `volkit_core` owns every format
//! interpretation and drives the backend through positional writes and
//! length queries.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - OS file, including exclusive creation for rewrite targets
//! - [`InMemoryBackend`] - For tests and in-memory remote fixtures
//!
//! ## Example
//!
//! ```rust
//! use volkit_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.write_at(b"superblk", 0).unwrap();
//! let end = backend.size().unwrap();
//! backend.write_at(b"needle", end).unwrap();
//! assert_eq!(backend.read_at(8, 6).unwrap(), b"needle");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
