//! Needle flag bits.

/// Flag byte of a version 2/3 needle body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct NeedleFlags(u8);

impl NeedleFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Data is gzip compressed.
    pub const GZIP: Self = Self(0x01);
    /// A name field follows.
    pub const NAME: Self = Self(0x02);
    /// A mime field follows.
    pub const MIME: Self = Self(0x04);
    /// A last-modified field follows.
    pub const LAST_MODIFIED: Self = Self(0x08);
    /// A TTL field follows.
    pub const TTL: Self = Self(0x10);
    /// A pairs field follows.
    pub const PAIRS: Self = Self(0x20);
    /// Data is a chunk manifest.
    pub const CHUNK_MANIFEST: Self = Self(0x80);

    /// Creates flags from the raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns these flags with `other` set.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns these flags with `other` cleared.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Sets or clears `other`.
    pub fn set(&mut self, other: Self, on: bool) {
        *self = if on { self.with(other) } else { self.without(other) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear() {
        let mut flags = NeedleFlags::NONE.with(NeedleFlags::GZIP);
        assert!(flags.contains(NeedleFlags::GZIP));
        assert!(!flags.contains(NeedleFlags::NAME));

        flags.set(NeedleFlags::TTL, true);
        flags.set(NeedleFlags::GZIP, false);
        assert_eq!(flags.as_byte(), 0x10);
        assert_eq!(NeedleFlags::from_byte(0x90).without(NeedleFlags::TTL), NeedleFlags::CHUNK_MANIFEST);
    }
}
