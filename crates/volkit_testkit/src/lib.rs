//! # volkit testkit
//!
//! Test utilities for volkit.
//!
//! This crate provides:
//! - [`VolumeFixture`] to synthesize volumes, including stale, deleted and
//!   unindexed needles
//! - Property-based test generators using proptest
//! - Crashing backends for destination write failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use volkit_testkit::prelude::*;
//!
//! #[test]
//! fn compacts_away_stale_copies() {
//!     let volume = temp_volume("pics", VolumeId(1), |v| {
//!         v.put(1, b"old");
//!         v.put(1, b"new");
//!     });
//!     // ... run a pass against volume.files
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use volkit_core::{NeedleId, VolumeId};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
