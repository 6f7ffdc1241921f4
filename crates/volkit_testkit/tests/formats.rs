//! Property tests for the on-disk formats.

use proptest::prelude::*;
use volkit_core::index::{encode_idx, load_from_idx, parse_idx, save_to_idx};
use volkit_core::needle::Needle;
use volkit_core::{Size, Ttl, TtlUnit, NEEDLE_MAP_ENTRY_SIZE};
use volkit_testkit::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn idx_file_round_trip(map in needle_map_strategy()) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("7.idx");
        save_to_idx(&map, &path).unwrap();

        let loaded = load_from_idx(&path).unwrap();
        prop_assert_eq!(loaded.len(), map.len());
        for (id, value) in map.iter() {
            let got = loaded.get(id).unwrap();
            prop_assert_eq!(got.offset, value.offset);
            prop_assert_eq!(got.size.is_tombstone(), value.size.is_tombstone());
            if !value.size.is_tombstone() {
                prop_assert_eq!(got.size, value.size);
            }
        }
        prop_assert!(!volkit_core::index::temp_path_for(&path).exists());
    }

    #[test]
    fn idx_entries_are_sorted_by_id(map in needle_map_strategy()) {
        let bytes = encode_idx(&map);
        prop_assert_eq!(bytes.len(), map.len() * NEEDLE_MAP_ENTRY_SIZE);
        let ids: Vec<u64> = bytes
            .chunks(NEEDLE_MAP_ENTRY_SIZE)
            .map(|entry| u64::from_be_bytes(entry[..8].try_into().unwrap()))
            .collect();
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn needles_decode_as_written(needle in needle_strategy(), version in version_strategy()) {
        let mut needle = needle;
        let bytes = needle.prepare_write_buffer(version).unwrap();
        let decoded = Needle::decode(&bytes, version, 8).unwrap();

        prop_assert_eq!(&decoded.data, &needle.data);
        prop_assert_eq!(decoded.id, needle.id);
        prop_assert_eq!(decoded.checksum, needle.checksum);
        if version != volkit_core::Version::V1 {
            prop_assert_eq!(decoded.flags, needle.flags);
            prop_assert_eq!(decoded.ttl, needle.ttl);
        }
    }

    #[test]
    fn ttl_expires_once_stored_long_enough(ttl in ttl_strategy(), days in 0u64..200_000) {
        let aged = ttl.aged(days);
        if days * 24 * 60 >= ttl.to_minutes() {
            prop_assert!(aged.is_empty());
        } else {
            prop_assert!(!aged.is_empty());
        }
    }
}

#[test]
fn idx_replay_keeps_last_entry() {
    let mut first = volkit_core::NeedleMap::new();
    first.set(volkit_core::NeedleId(1), volkit_core::Offset(1), Size::new(10));
    let mut second = volkit_core::NeedleMap::new();
    second.set(volkit_core::NeedleId(1), volkit_core::Offset(5), Size::new(20));

    let mut bytes = encode_idx(&first);
    bytes.extend_from_slice(&encode_idx(&second));
    let map = parse_idx(&bytes).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(volkit_core::NeedleId(1)).unwrap().offset, volkit_core::Offset(5));
}

#[test]
fn ttl_aging_boundary() {
    let ttl = Ttl::new(3, TtlUnit::Day);
    assert_eq!(ttl.aged(0), ttl);
    assert_eq!(ttl.aged(2), Ttl::new(1, TtlUnit::Day));
    assert_eq!(ttl.aged(3), Ttl::EMPTY);
    assert_eq!(ttl.aged(30), Ttl::EMPTY);
    assert_eq!(Ttl::new(2, TtlUnit::Week).aged(1), Ttl::new(13, TtlUnit::Day));
    assert_eq!(Ttl::EMPTY.aged(10), Ttl::EMPTY);
}
