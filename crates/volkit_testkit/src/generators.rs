//! Property-based test generators using proptest.

use proptest::prelude::*;
use volkit_core::{
    Cookie, Needle, NeedleId, NeedleMap, Offset, Size, Ttl, TtlUnit, Version,
};

/// Strategy for needle IDs.
pub fn needle_id_strategy() -> impl Strategy<Value = NeedleId> {
    any::<u64>().prop_map(NeedleId)
}

/// Strategy for the on-disk formats.
pub fn version_strategy() -> impl Strategy<Value = Version> {
    prop_oneof![Just(Version::V1), Just(Version::V2), Just(Version::V3)]
}

/// Strategy for TTLs, including the empty one.
pub fn ttl_strategy() -> impl Strategy<Value = Ttl> {
    prop_oneof![
        Just(Ttl::EMPTY),
        (
            1u8..=255,
            prop_oneof![
                Just(TtlUnit::Minute),
                Just(TtlUnit::Hour),
                Just(TtlUnit::Day),
                Just(TtlUnit::Week),
                Just(TtlUnit::Month),
                Just(TtlUnit::Year),
            ],
        )
            .prop_map(|(count, unit)| Ttl::new(count, unit)),
    ]
}

/// Strategy for needle payloads.
pub fn needle_data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..512)
}

/// Strategy for needles with any mix of optional fields set.
pub fn needle_strategy() -> impl Strategy<Value = Needle> {
    (
        needle_id_strategy(),
        any::<u32>(),
        needle_data_strategy(),
        prop::option::of(prop::collection::vec(any::<u8>(), 1..64)),
        prop::option::of("[a-z]{1,12}/[a-z]{1,12}"),
        prop::option::of(0u64..(1 << 40)),
        ttl_strategy(),
        prop::option::of(prop::collection::vec(any::<u8>(), 1..128)),
        any::<bool>(),
    )
        .prop_map(
            |(id, cookie, data, name, mime, last_modified, ttl, pairs, gzipped)| {
                let mut needle = Needle::new(id, Cookie(cookie), data);
                if let Some(name) = name {
                    needle.set_name(name);
                }
                if let Some(mime) = mime {
                    needle.set_mime(mime.into_bytes());
                }
                if let Some(secs) = last_modified {
                    needle.set_last_modified(secs);
                }
                needle.set_ttl(ttl);
                if let Some(pairs) = pairs {
                    needle.set_pairs(pairs);
                }
                if gzipped {
                    needle.flags = needle.flags.with(volkit_core::NeedleFlags::GZIP);
                }
                needle
            },
        )
}

/// Strategy for index maps mixing live entries and tombstones.
pub fn needle_map_strategy() -> impl Strategy<Value = NeedleMap> {
    prop::collection::vec(
        (any::<u64>(), 1u32..u32::MAX, prop_oneof![3 => 1i32..1 << 24, 1 => Just(-1i32)]),
        0..64,
    )
    .prop_map(|entries| {
        let mut map = NeedleMap::new();
        for (id, offset, size) in entries {
            if size < 0 {
                map.delete(NeedleId(id), Offset(offset));
            } else {
                map.set(NeedleId(id), Offset(offset), Size::new(size));
            }
        }
        map
    })
}
