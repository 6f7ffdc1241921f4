//! CRC-32C checksums over needle data.

const CRC32C_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0x82F6_3B78;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Computes the CRC-32C (Castagnoli) checksum of `data`.
#[must_use]
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32C_TABLE[index];
    }
    !crc
}

/// The masked form older volume servers stored instead of the raw checksum.
#[must_use]
pub fn legacy_masked(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(0xa282_ead8)
}

/// Returns true if `stored` matches `data` in either the raw or the legacy
/// masked form.
#[must_use]
pub fn matches(stored: u32, data: &[u8]) -> bool {
    let crc = crc32c(data);
    stored == crc || stored == legacy_masked(crc)
}
