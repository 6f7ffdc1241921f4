//! Clean command implementation.

use super::{print_pass_result, CutoffArgs, VolumeArgs};
use volkit_core::passes;

/// Runs the clean command.
///
/// With `in_place` the cleaned volume replaces the source volume; the
/// destination directory must then differ from the source directory.
pub fn run(
    volume: &VolumeArgs,
    cutoff: &CutoffArgs,
    in_place: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = volume.pass_options().cutoff_secs(cutoff.cutoff_secs()?);
    let result = passes::clean(&options)?;
    print_pass_result("clean", volume, &result, "Dropped as old:")?;

    if in_place {
        passes::swap_into_source(&options)?;
        println!("Replaced {}", options.source_files().dat_path().display());
    }
    Ok(())
}
