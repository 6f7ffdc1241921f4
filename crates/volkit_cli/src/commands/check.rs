//! Check command implementation.

use super::{print_pass_result, CutoffArgs, VolumeArgs};
use volkit_core::passes;

/// Runs the check command. Nothing is written.
pub fn run(volume: &VolumeArgs, cutoff: &CutoffArgs) -> Result<(), Box<dyn std::error::Error>> {
    let options = volume.pass_options().cutoff_secs(cutoff.cutoff_secs()?);
    let result = passes::check(&options)?;
    print_pass_result("check", volume, &result, "Would delete:")
}
