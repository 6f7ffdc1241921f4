//! Compact command implementation.

use super::{print_pass_result, VolumeArgs};
use volkit_core::passes;

/// Runs the compact command.
pub fn run(volume: &VolumeArgs, in_place: bool) -> Result<(), Box<dyn std::error::Error>> {
    let options = volume.pass_options();
    let source_size = std::fs::metadata(options.source_files().dat_path())?.len();

    let result = passes::compact(&options)?;
    print_pass_result("compact", volume, &result, "")?;

    let compacted_size = std::fs::metadata(options.destination_files().dat_path())?.len();
    let saved = source_size.saturating_sub(compacted_size);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        saved,
        if source_size > 0 {
            saved as f64 / source_size as f64 * 100.0
        } else {
            0.0
        }
    );

    if in_place {
        passes::swap_into_source(&options)?;
        println!("Replaced {}", options.source_files().dat_path().display());
    }
    Ok(())
}
