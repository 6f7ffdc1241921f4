//! Generate command implementation.

use super::{print_pass_result, CutoffArgs, VolumeArgs};
use std::sync::Arc;
use std::time::Duration;
use volkit_core::passes;
use volkit_core::{SystemClock, TimeSource};
use volkit_sync::{HttpTimeSource, ReqwestClient};

/// Runs the generate command.
///
/// Last-modified times come from `time_server` when given, otherwise from
/// the local clock. With `older_than` the needles last modified before it
/// are counted.
pub fn run(
    volume: &VolumeArgs,
    time_server: Option<&str>,
    passed_days: u32,
    older_than: Option<&CutoffArgs>,
) -> Result<(), Box<dyn std::error::Error>> {
    let time_source: Arc<dyn TimeSource> = match time_server {
        Some(url) => {
            let client = ReqwestClient::new(Duration::from_secs(10))?;
            Arc::new(HttpTimeSource::new(url, passed_days, client))
        }
        None => Arc::new(SystemClock),
    };

    let mut options = volume.pass_options();
    if let Some(cutoff) = older_than {
        options = options.cutoff_secs(cutoff.cutoff_secs()?);
    }
    let result = passes::generate(&options, time_source)?;
    print_pass_result("generate", volume, &result, "Older than cutoff:")
}
