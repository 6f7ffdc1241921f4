//! Transform command implementation.

use super::{load_cipher_key, print_pass_result, VolumeArgs};
use std::path::PathBuf;
use tracing::info;
use volkit_core::passes;
use volkit_core::{LastModifiedPolicy, TransformOptions};

/// Transform-only flags.
#[derive(Debug, Clone, Default)]
pub struct TransformArgs {
    /// Encrypt needle data.
    pub encrypt: bool,
    /// Age TTLs by the days stored.
    pub age_ttl: bool,
    /// Set last-modified times to the transform time.
    pub touch_last_modified: bool,
    /// Needle limit.
    pub limit: Option<u64>,
    /// Key file; the environment is used when absent.
    pub cipher_key_file: Option<PathBuf>,
}

impl TransformArgs {
    /// The per-needle transformations these flags select.
    pub fn transform_options(&self) -> TransformOptions {
        let last_modified = if self.touch_last_modified {
            LastModifiedPolicy::Now
        } else {
            LastModifiedPolicy::Preserve
        };
        TransformOptions::default()
            .encrypt(self.encrypt)
            .age_ttl(self.age_ttl)
            .last_modified(last_modified)
    }
}

/// Runs the transform command.
pub fn run(volume: &VolumeArgs, args: &TransformArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = volume.pass_options();
    if let Some(limit) = args.limit {
        options = options.limit(limit);
    }
    if args.encrypt {
        options = options.cipher_key(load_cipher_key(args.cipher_key_file.as_deref())?);
    }

    let transform = args.transform_options();

    info!(vid = volume.vid, ?transform, "transforming volume");
    let result = passes::transform(&options, transform)?;
    print_pass_result("transform", volume, &result, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_last_modified_uses_transform_time() {
        let args = TransformArgs {
            touch_last_modified: true,
            ..TransformArgs::default()
        };
        let options = args.transform_options();
        assert!(matches!(options.last_modified, LastModifiedPolicy::Now));
        assert!(!options.is_verbatim());

        let plain = TransformArgs::default().transform_options();
        assert!(matches!(plain.last_modified, LastModifiedPolicy::Preserve));
    }
}
