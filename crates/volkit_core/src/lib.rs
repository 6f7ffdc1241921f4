//! # volkit core
//!
//! Scan-validate-rewrite engine for append-only needle volumes.
//!
//! This crate provides:
//! - The volume formats: super block, needles, TTLs and the `.idx` index
//! - A streaming log scanner driven by a [`VolumeVisitor`]
//! - Liveness checks against the index
//! - A per-needle transform pipeline (encryption, TTL aging, timestamps)
//! - A destination writer that tags every failure with its [`WriteStage`]
//! - Maintenance passes: transform, clean, compact, generate and check
//! - Local replica operations used by incremental sync

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod crc;
pub mod crypto;
mod error;
mod files;
pub mod index;
mod liveness;
pub mod needle;
pub mod passes;
pub mod scan;
mod super_block;
pub mod transform;
mod ttl;
mod types;
mod volume;
pub mod writer;

pub use clock::{SystemClock, TimeSource};
pub use crypto::{Cipher, CipherKey};
pub use error::{CoreError, CoreResult, WriteStage};
pub use files::VolumeFiles;
pub use index::{NeedleMap, NeedleValue};
pub use liveness::{check_liveness, Liveness};
pub use needle::{Needle, NeedleFlags};
pub use passes::{PassOptions, PassResult};
pub use scan::{scan_volume_file, ScanSummary, VisitFlow, VolumeVisitor};
pub use super_block::{ReplicaPlacement, SuperBlock, Version, SUPER_BLOCK_SIZE};
pub use transform::{LastModifiedPolicy, TransformOptions, Transformer};
pub use ttl::{Ttl, TtlUnit};
pub use types::{
    format_file_id, Cookie, NeedleId, Offset, Size, VolumeId, NEEDLE_CHECKSUM_SIZE,
    NEEDLE_HEADER_SIZE, NEEDLE_MAP_ENTRY_SIZE, NEEDLE_PADDING_SIZE, TIMESTAMP_SIZE,
};
pub use volume::{remove_volume_files, Volume};
pub use writer::{VolumeWriter, WriteSummary};
