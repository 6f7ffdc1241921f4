//! Per-needle transformation.
//!
//! A [`Transformer`] turns a live source needle into the needle written to
//! the destination. It is stateless across needles.

use crate::clock::{TimeSource, NANOS_PER_DAY};
use crate::crypto::{Cipher, CipherKey};
use crate::error::{CoreError, CoreResult};
use crate::needle::{Needle, NeedleFlags};
use std::fmt;
use std::sync::Arc;

/// How the destination needle's last-modified time is chosen.
#[derive(Clone, Default)]
pub enum LastModifiedPolicy {
    /// Copy the source value; the flag is set only if the source had it.
    #[default]
    Preserve,
    /// Use the time the needle is transformed.
    Now,
    /// Ask a time source for every needle.
    From(Arc<dyn TimeSource>),
}

impl fmt::Debug for LastModifiedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preserve => f.write_str("Preserve"),
            Self::Now => f.write_str("Now"),
            Self::From(_) => f.write_str("From(..)"),
        }
    }
}

/// Transformations applied to each live needle.
///
/// The default copies needles through unchanged, keeping their append
/// times. Any other combination rebuilds each needle and stamps it with the
/// time it was rewritten.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Encrypt data with the cipher key.
    pub encrypt: bool,
    /// Subtract the days a needle has been stored from its TTL.
    pub age_ttl: bool,
    /// Last-modified rewriting.
    pub last_modified: LastModifiedPolicy,
    restamp: bool,
}

impl TransformOptions {
    /// Options that copy needles through unchanged.
    #[must_use]
    pub fn verbatim() -> Self {
        Self::default()
    }

    /// Enables encryption.
    #[must_use]
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// Enables TTL aging.
    #[must_use]
    pub fn age_ttl(mut self, age_ttl: bool) -> Self {
        self.age_ttl = age_ttl;
        self
    }

    /// Sets the last-modified policy.
    #[must_use]
    pub fn last_modified(mut self, policy: LastModifiedPolicy) -> Self {
        self.last_modified = policy;
        self
    }

    /// Rebuilds every needle even when nothing else changes, so each one
    /// carries the rewrite time as its append time.
    #[must_use]
    pub(crate) fn restamped(mut self) -> Self {
        self.restamp = true;
        self
    }

    /// Returns true if these options copy needles byte for byte.
    #[must_use]
    pub fn is_verbatim(&self) -> bool {
        !self.encrypt
            && !self.age_ttl
            && !self.restamp
            && matches!(self.last_modified, LastModifiedPolicy::Preserve)
    }
}

/// Applies [`TransformOptions`] to needles.
#[derive(Debug)]
pub struct Transformer {
    options: TransformOptions,
    cipher: Option<Cipher>,
}

impl Transformer {
    /// Creates a transformer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingCipherKey`] if encryption is enabled
    /// without a key.
    pub fn new(options: TransformOptions, key: Option<&CipherKey>) -> CoreResult<Self> {
        let cipher = match (options.encrypt, key) {
            (true, Some(key)) => Some(Cipher::new(key)),
            (true, None) => return Err(CoreError::MissingCipherKey),
            (false, _) => None,
        };
        Ok(Self { options, cipher })
    }

    /// Returns the options in use.
    #[must_use]
    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Builds the destination needle for `source` at wall-clock `now_ns`.
    ///
    /// Verbatim options return a copy of `source`. Otherwise the needle is
    /// rebuilt and its append time set to `now_ns`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails or the time source fails.
    pub fn transform(&self, source: &Needle, now_ns: u64) -> CoreResult<Needle> {
        if self.options.is_verbatim() {
            return Ok(source.clone());
        }

        let data = match &self.cipher {
            Some(cipher) => cipher.encrypt(&source.data)?,
            None => source.data.clone(),
        };
        let mut out = Needle::new(source.id, source.cookie, data);

        let carried = source.flags.as_byte()
            & (NeedleFlags::GZIP.as_byte() | NeedleFlags::CHUNK_MANIFEST.as_byte());
        out.flags = NeedleFlags::from_byte(carried);
        if source.has_name() {
            out.set_name(source.name.clone());
        }
        if source.has_mime() {
            out.set_mime(source.mime.clone());
        }
        if source.has_pairs() {
            out.set_pairs(source.pairs.clone());
        }

        if source.has_ttl() {
            let ttl = if self.options.age_ttl && source.append_at_ns != 0 {
                let stored_days = now_ns.saturating_sub(source.append_at_ns) / NANOS_PER_DAY;
                source.ttl.aged(stored_days)
            } else {
                source.ttl
            };
            out.set_ttl(ttl);
        }

        match &self.options.last_modified {
            LastModifiedPolicy::Preserve => {
                if source.has_last_modified() {
                    out.set_last_modified(source.last_modified);
                }
            }
            LastModifiedPolicy::Now => out.set_last_modified(now_ns / 1_000_000_000),
            LastModifiedPolicy::From(source_time) => {
                out.set_last_modified(source_time.now_secs()?);
            }
        }

        out.append_at_ns = now_ns;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedTime;
    use crate::crypto::CIPHER_OVERHEAD;
    use crate::ttl::{Ttl, TtlUnit};
    use crate::types::{Cookie, NeedleId};

    const NOW: u64 = 1_700_000_000 * 1_000_000_000;

    fn source() -> Needle {
        let mut n = Needle::new(NeedleId::new(9), Cookie::new(3), b"payload".to_vec());
        n.flags = n.flags.with(NeedleFlags::GZIP);
        n.set_name(b"f.bin".to_vec());
        n.set_mime(b"application/octet-stream".to_vec());
        n.set_ttl(Ttl::new(10, TtlUnit::Day));
        n.set_last_modified(1_600_000_000);
        n.append_at_ns = NOW - 3 * NANOS_PER_DAY - 1;
        n
    }

    #[test]
    fn verbatim_is_identity() {
        let t = Transformer::new(TransformOptions::verbatim(), None).unwrap();
        let src = source();
        assert_eq!(t.transform(&src, NOW).unwrap(), src);
    }

    #[test]
    fn encryption_requires_key() {
        let err = Transformer::new(TransformOptions::default().encrypt(true), None).unwrap_err();
        assert!(matches!(err, CoreError::MissingCipherKey));
    }

    #[test]
    fn encrypts_and_recomputes_checksum() {
        let key = CipherKey::from_bytes(&[5u8; 16]).unwrap();
        let t = Transformer::new(TransformOptions::default().encrypt(true), Some(&key)).unwrap();
        let src = source();
        let out = t.transform(&src, NOW).unwrap();
        assert_eq!(out.data.len(), src.data.len() + CIPHER_OVERHEAD);
        assert_eq!(out.checksum, crate::crc::crc32c(&out.data));
        assert_eq!(Cipher::new(&key).decrypt(&out.data).unwrap(), src.data);
    }

    #[test]
    fn carries_flags_and_metadata() {
        let t = Transformer::new(TransformOptions::default().restamped(), None).unwrap();
        let out = t.transform(&source(), NOW).unwrap();
        assert!(out.is_gzipped());
        assert_eq!(out.name, b"f.bin");
        assert!(out.has_mime());
        assert!(!out.has_pairs());
        assert_eq!(out.last_modified, 1_600_000_000);
        assert_eq!(out.append_at_ns, NOW);
    }

    #[test]
    fn ttl_aging_subtracts_whole_days() {
        let t = Transformer::new(TransformOptions::default().age_ttl(true), None).unwrap();
        let out = t.transform(&source(), NOW).unwrap();
        assert_eq!(out.ttl.days(), 7);
        assert!(out.has_ttl());
    }

    #[test]
    fn rewriting_stamps_transform_time() {
        let src = source();
        let aged = Transformer::new(TransformOptions::default().age_ttl(true), None).unwrap();
        assert_eq!(aged.transform(&src, NOW).unwrap().append_at_ns, NOW);

        let fixed = Transformer::new(
            TransformOptions::default()
                .last_modified(LastModifiedPolicy::From(Arc::new(FixedTime(1234)))),
            None,
        )
        .unwrap();
        assert_eq!(fixed.transform(&src, NOW).unwrap().append_at_ns, NOW);

        let verbatim = Transformer::new(TransformOptions::verbatim(), None).unwrap();
        assert_eq!(verbatim.transform(&src, NOW).unwrap().append_at_ns, src.append_at_ns);
    }

    #[test]
    fn expired_ttl_clears_flag() {
        let mut src = source();
        src.append_at_ns = NOW - 30 * NANOS_PER_DAY;
        let t = Transformer::new(TransformOptions::default().age_ttl(true), None).unwrap();
        let out = t.transform(&src, NOW).unwrap();
        assert!(!out.has_ttl());
        assert!(out.ttl.is_empty());
    }

    #[test]
    fn unknown_append_time_keeps_ttl() {
        let mut src = source();
        src.append_at_ns = 0;
        let t = Transformer::new(TransformOptions::default().age_ttl(true), None).unwrap();
        assert_eq!(t.transform(&src, NOW).unwrap().ttl, src.ttl);
    }

    #[test]
    fn last_modified_policies() {
        let mut src = source();
        src.clear_last_modified();

        let keep = Transformer::new(TransformOptions::default().age_ttl(true), None).unwrap();
        assert!(!keep.transform(&src, NOW).unwrap().has_last_modified());

        let now = Transformer::new(
            TransformOptions::default().last_modified(LastModifiedPolicy::Now),
            None,
        )
        .unwrap();
        assert_eq!(now.transform(&src, NOW).unwrap().last_modified, 1_700_000_000);

        let fixed = Transformer::new(
            TransformOptions::default()
                .last_modified(LastModifiedPolicy::From(Arc::new(FixedTime(1234)))),
            None,
        )
        .unwrap();
        let out = fixed.transform(&src, NOW).unwrap();
        assert!(out.has_last_modified());
        assert_eq!(out.last_modified, 1234);
    }
}
