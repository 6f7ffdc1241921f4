//! CLI command implementations.

pub mod backup;
pub mod cat;
pub mod check;
pub mod clean;
pub mod compact;
pub mod generate;
pub mod transform;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use volkit_core::passes::{PassOptions, PassResult};
use volkit_core::{CipherKey, VolumeId};

/// Layout the cutoff time is given in.
pub const CUTOFF_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Source volume and destination selection shared by the volume commands.
#[derive(Args, Debug, Clone)]
pub struct VolumeArgs {
    /// Directory holding the volume
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Collection name
    #[arg(short, long, default_value = "")]
    pub collection: String,

    /// Volume id
    #[arg(long)]
    pub vid: u32,

    /// Directory the new volume is written to (default: the source directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl VolumeArgs {
    /// Pass options for the selected volume.
    pub fn pass_options(&self) -> PassOptions {
        let options =
            PassOptions::new(&self.dir, VolumeId::new(self.vid)).collection(&self.collection);
        match &self.output {
            Some(output) => options.destination_dir(output),
            None => options,
        }
    }
}

/// Last-modified cutoff selection.
#[derive(Args, Debug, Clone)]
pub struct CutoffArgs {
    /// Cutoff time as YYYY-MM-DDTHH:MM:SS
    #[arg(long, alias = "newer", alias = "older")]
    pub cutoff: String,

    /// Time zone of the cutoff: `local`, `utc` or an offset like `+08:00`
    #[arg(long, default_value = "local")]
    pub tz: String,
}

impl CutoffArgs {
    /// The cutoff in unix seconds.
    pub fn cutoff_secs(&self) -> Result<u64, Box<dyn std::error::Error>> {
        parse_cutoff(&self.cutoff, &self.tz)
    }
}

/// How results are printed.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable lines
    Text,
    /// One JSON object
    Json,
}

/// Parses `time` in the `tz` zone into unix seconds.
pub fn parse_cutoff(time: &str, tz: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let naive = NaiveDateTime::parse_from_str(time.trim(), CUTOFF_FORMAT)
        .map_err(|e| format!("invalid cutoff time {time:?}: {e}"))?;

    let at: DateTime<FixedOffset> = match tz.trim().to_ascii_lowercase().as_str() {
        "local" => Local
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| format!("cutoff time {time:?} is ambiguous in the local zone"))?
            .fixed_offset(),
        "utc" | "z" => Utc.from_utc_datetime(&naive).fixed_offset(),
        offset => {
            let offset: FixedOffset = offset
                .parse()
                .map_err(|e| format!("invalid time zone {tz:?}: {e}"))?;
            offset
                .from_local_datetime(&naive)
                .single()
                .ok_or_else(|| format!("cutoff time {time:?} does not exist at {tz}"))?
        }
    };

    u64::try_from(at.timestamp())
        .map_err(|_| format!("cutoff time {time:?} is before 1970").into())
}

/// Loads the cipher key from `file`, or from `$ENCRYPTION_KEY`.
pub fn load_cipher_key(file: Option<&Path>) -> Result<CipherKey, Box<dyn std::error::Error>> {
    let key = match file {
        Some(path) => CipherKey::from_file(path)?,
        None => CipherKey::from_env()?,
    };
    Ok(key)
}

#[derive(Serialize)]
struct PassReport<'a> {
    pass: &'a str,
    volume: String,
    processed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched: Option<u64>,
    skipped_stale: u64,
    skipped_missing: u64,
    bytes_written: u64,
    stopped_early: bool,
}

/// Prints the counters of a finished pass.
pub fn print_pass_result(
    pass: &str,
    volume: &VolumeArgs,
    result: &PassResult,
    matched_label: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = volume.pass_options().source_files().base_name();
    match volume.format {
        OutputFormat::Json => {
            let report = PassReport {
                pass,
                volume: name,
                processed: result.processed,
                matched: result.matched,
                skipped_stale: result.skipped_stale,
                skipped_missing: result.skipped_missing,
                bytes_written: result.bytes_written,
                stopped_early: result.stopped_early,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("{pass} {name}:");
            println!("  Live needles:    {}", result.processed);
            if let Some(matched) = result.matched {
                println!("  {matched_label:<16} {matched}");
            }
            println!("  Stale skipped:   {}", result.skipped_stale);
            println!("  Missing skipped: {}", result.skipped_missing);
            if result.bytes_written > 0 {
                println!("  Bytes written:   {}", result.bytes_written);
            }
            if result.stopped_early {
                println!("  (stopped at the needle limit)");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cutoff_with_fixed_offset() {
        let secs = parse_cutoff("2020-09-13T20:26:40", "+08:00").unwrap();
        assert_eq!(secs, 1_600_000_000);
    }

    #[test]
    fn parses_cutoff_in_utc() {
        assert_eq!(parse_cutoff("2020-09-13T12:26:40", "UTC").unwrap(), 1_600_000_000);
    }

    #[test]
    fn parses_cutoff_in_local_zone() {
        assert!(parse_cutoff("2021-06-01T00:00:00", "local").is_ok());
    }

    #[test]
    fn rejects_bad_cutoffs() {
        assert!(parse_cutoff("2020-09-13 12:26:40", "utc").is_err());
        assert!(parse_cutoff("2020-09-13T12:26:40", "Mars/Olympus").is_err());
        assert!(parse_cutoff("1960-01-01T00:00:00", "utc").is_err());
    }

    #[test]
    fn output_defaults_to_source_dir() {
        let args = VolumeArgs {
            dir: PathBuf::from("/data"),
            collection: "pics".into(),
            vid: 4,
            output: None,
            format: OutputFormat::Text,
        };
        let options = args.pass_options();
        assert_eq!(options.destination_dir, PathBuf::from("/data"));
        assert_eq!(options.source_files().base_name(), "pics_4");

        let options = VolumeArgs {
            output: Some(PathBuf::from("/out")),
            ..args
        }
        .pass_options();
        assert_eq!(options.destination_dir, PathBuf::from("/out"));
    }
}
