//! Cat command implementation.

use super::{load_cipher_key, OutputFormat, VolumeArgs};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use volkit_core::{format_file_id, Cipher, CipherKey, Needle, NeedleId, Volume};

#[derive(Serialize)]
struct NeedleSummary {
    file_id: String,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<u64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    ttl: String,
    gzipped: bool,
    append_at_ns: u64,
}

impl From<&Needle> for NeedleSummary {
    fn from(needle: &Needle) -> Self {
        Self {
            file_id: format_file_id(needle.id, needle.cookie),
            size: needle.data.len(),
            name: needle
                .has_name()
                .then(|| String::from_utf8_lossy(&needle.name).into_owned()),
            mime: needle
                .has_mime()
                .then(|| String::from_utf8_lossy(&needle.mime).into_owned()),
            last_modified: needle.has_last_modified().then_some(needle.last_modified),
            ttl: needle.ttl.to_string(),
            gzipped: needle.is_gzipped(),
            append_at_ns: needle.append_at_ns,
        }
    }
}

/// Parses a needle id given in hex, with or without a `0x` prefix.
pub fn parse_needle_id(text: &str) -> Result<NeedleId, Box<dyn std::error::Error>> {
    let digits = text.trim().trim_start_matches("0x");
    let id = u64::from_str_radix(digits, 16)
        .map_err(|e| format!("invalid needle id {text:?}: {e}"))?;
    Ok(NeedleId::new(id))
}

/// Reads the live needle `id` from the selected volume, decrypting its data
/// with `key` when given.
pub fn load_needle(
    volume: &VolumeArgs,
    id: NeedleId,
    key: Option<&CipherKey>,
) -> Result<Needle, Box<dyn std::error::Error>> {
    let files = volume.pass_options().source_files();
    let opened = Volume::open(files)?;
    let value = opened
        .index()
        .get(id)
        .ok_or_else(|| format!("needle {id} not found"))?;
    if value.is_deleted() {
        return Err(format!("needle {id} is deleted").into());
    }

    let mut needle = opened.read_needle_at(value.offset.to_actual())?;
    if let Some(key) = key {
        let plain = Cipher::new(key).decrypt(&needle.data)?;
        needle.set_data(plain);
    }
    Ok(needle)
}

/// Runs the cat command.
pub fn run(
    volume: &VolumeArgs,
    needle_id: &str,
    decrypt: bool,
    cipher_key_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = parse_needle_id(needle_id)?;
    let key = if decrypt {
        Some(load_cipher_key(cipher_key_file)?)
    } else {
        None
    };
    let needle = load_needle(volume, id, key.as_ref())?;
    let summary = NeedleSummary::from(&needle);

    match volume.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("File id:       {}", summary.file_id);
            println!("Size:          {}", summary.size);
            if let Some(name) = &summary.name {
                println!("Name:          {name}");
            }
            if let Some(mime) = &summary.mime {
                println!("Mime:          {mime}");
            }
            if let Some(secs) = summary.last_modified {
                println!("Last modified: {secs}");
            }
            if !summary.ttl.is_empty() {
                println!("TTL:           {}", summary.ttl);
            }
            println!();
            match std::str::from_utf8(&needle.data) {
                Ok(text) if !needle.is_gzipped() => println!("{text}"),
                _ => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&needle.data)?;
                    stdout.flush()?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use volkit_core::passes;
    use volkit_core::TransformOptions;
    use volkit_testkit::temp_volume;

    fn args(dir: &Path) -> VolumeArgs {
        VolumeArgs {
            dir: dir.to_path_buf(),
            collection: "pics".into(),
            vid: 2,
            output: None,
            format: OutputFormat::Text,
        }
    }

    #[test]
    fn parses_hex_ids() {
        assert_eq!(parse_needle_id("ff").unwrap(), NeedleId::new(255));
        assert_eq!(parse_needle_id("0x10").unwrap(), NeedleId::new(16));
        assert!(parse_needle_id("xyz").is_err());
    }

    #[test]
    fn loads_live_needle() {
        let volume = temp_volume("pics", volkit_core::VolumeId::new(2), |v| {
            v.put(1, b"old");
            v.put(1, b"new");
            v.put(2, b"gone");
            v.delete(2);
        });
        let args = args(volume.dir.path());

        let needle = load_needle(&args, NeedleId::new(1), None).unwrap();
        assert_eq!(needle.data, b"new");
        assert!(load_needle(&args, NeedleId::new(2), None).is_err());
        assert!(load_needle(&args, NeedleId::new(3), None).is_err());
    }

    #[test]
    fn decrypts_encrypted_needle() {
        let volume = temp_volume("pics", volkit_core::VolumeId::new(2), |v| {
            v.put(7, b"secret");
        });
        let out = tempfile::tempdir().unwrap();
        let key = CipherKey::from_bytes(&[9u8; 32]).unwrap();
        let options = args(volume.dir.path())
            .pass_options()
            .destination_dir(out.path())
            .cipher_key(key.clone());
        passes::transform(&options, TransformOptions::verbatim().encrypt(true)).unwrap();

        let encrypted = VolumeArgs {
            dir: PathBuf::from(out.path()),
            ..args(volume.dir.path())
        };
        let raw = load_needle(&encrypted, NeedleId::new(7), None).unwrap();
        assert_ne!(raw.data, b"secret");
        let plain = load_needle(&encrypted, NeedleId::new(7), Some(&key)).unwrap();
        assert_eq!(plain.data, b"secret");
    }
}
