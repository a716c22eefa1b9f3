//! Bit-vector codec for zonefile inventories.
//!
//! Bit index `i` addresses byte `i / 8`, bit `7 - (i % 8)` of that byte
//! (MSB first). This matches the wire protocol and the peers' own encoding,
//! so it is not renegotiable even though LSB-first would be more natural for
//! a fresh design (§4.1 rationale).

/// Extends `v` in place with zero bytes so that bit index `i` is addressable.
fn ensure_len(v: &mut Vec<u8>, i: usize) {
    let needed_bytes = i / 8 + 1;
    if v.len() < needed_bytes {
        v.resize(needed_bytes, 0);
    }
}

fn byte_and_mask(i: usize) -> (usize, u8) {
    (i / 8, 1u8 << (7 - (i % 8)))
}

/// Sets every bit in `indexes`, growing `v` as needed. Idempotent.
pub fn set(v: &[u8], indexes: &[usize]) -> Vec<u8> {
    let mut out = v.to_vec();
    for &i in indexes {
        ensure_len(&mut out, i);
        let (byte, mask) = byte_and_mask(i);
        out[byte] |= mask;
    }
    out
}

/// Clears every bit in `indexes`, growing `v` as needed. Idempotent.
pub fn clear(v: &[u8], indexes: &[usize]) -> Vec<u8> {
    let mut out = v.to_vec();
    for &i in indexes {
        ensure_len(&mut out, i);
        let (byte, mask) = byte_and_mask(i);
        out[byte] &= !mask;
    }
    out
}

/// Returns the value of a single bit; indexes past the end of `v` read as 0.
pub fn test_bit(v: &[u8], i: usize) -> bool {
    let (byte, mask) = byte_and_mask(i);
    match v.get(byte) {
        Some(b) => b & mask != 0,
        None => false,
    }
}

/// True iff every index in `indexes` is set.
pub fn test(v: &[u8], indexes: &[usize]) -> bool {
    indexes.iter().all(|&i| test_bit(v, i))
}

/// Sorted subset of `[offset, offset + count)` whose bit is unset.
pub fn missing(v: &[u8], offset: usize, count: usize) -> Vec<usize> {
    (offset..offset + count).filter(|&i| !test_bit(v, i)).collect()
}

/// Sorted subset of `[offset, offset + count)` whose bit is set.
pub fn set_bits(v: &[u8], offset: usize, count: usize) -> Vec<usize> {
    (offset..offset + count).filter(|&i| test_bit(v, i)).collect()
}

/// Number of indexes where `remote` is 1 and `local` is 0.
///
/// Positions past the end of `local` are treated as 0, so any bit `remote`
/// has set beyond `local`'s length counts toward the diff.
pub fn diff_count(local: &[u8], remote: &[u8]) -> usize {
    let bits = remote.len() * 8;
    (0..bits)
        .filter(|&i| test_bit(remote, i) && !test_bit(local, i))
        .count()
}

/// Base64-encodes a bit-vector for the wire (§4.8).
pub fn encode_base64(v: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(v)
}

/// Decodes a base64-encoded bit-vector from the wire.
pub fn decode_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_test() {
        let v = set(&[], &[0, 1, 2]);
        assert_eq!(v, vec![0b1110_0000]);
        assert!(test(&v, &[0, 1, 2]));
        assert!(!test(&v, &[3]));
    }

    #[test]
    fn clear_then_test() {
        let v = set(&[], &[0, 1, 2]);
        let v = clear(&v, &[1]);
        assert!(test(&v, &[0, 2]));
        assert!(!test(&v, &[1]));
    }

    #[test]
    fn set_is_idempotent() {
        let v = set(&[], &[3, 9, 20]);
        let v2 = set(&v, &[3, 9, 20]);
        assert_eq!(v, v2);
    }

    #[test]
    fn clear_is_idempotent() {
        let v = set(&[], &[3, 9, 20]);
        let v = clear(&v, &[9]);
        let v2 = clear(&v, &[9]);
        assert_eq!(v, v2);
    }

    #[test]
    fn bits_past_end_read_as_zero() {
        let v = vec![0xFF];
        assert!(!test_bit(&v, 8));
        assert!(!test(&v, &[8, 9]));
    }

    #[test]
    fn missing_returns_exactly_unset_indexes_below_n() {
        let v = set(&[], &[0, 2, 4]);
        let m = missing(&v, 0, 6);
        assert_eq!(m, vec![1, 3, 5]);
    }

    #[test]
    fn set_bits_returns_exactly_set_indexes_in_range() {
        let v = set(&[], &[0, 2, 4]);
        assert_eq!(set_bits(&v, 0, 6), vec![0, 2, 4]);
    }

    #[test]
    fn diff_count_counts_remote_only_bits() {
        let local = set(&[], &[0]);
        let remote = set(&[], &[0, 1, 2]);
        assert_eq!(diff_count(&local, &remote), 2);
    }

    #[test]
    fn diff_count_handles_remote_longer_than_local() {
        let local: Vec<u8> = vec![];
        let remote = set(&[], &[10]);
        assert_eq!(diff_count(&local, &remote), 1);
    }

    #[test]
    fn base64_round_trips() {
        let v = set(&[], &[0, 5, 19, 100]);
        let encoded = encode_base64(&v);
        let decoded = decode_base64(&encoded).expect("valid base64");
        assert_eq!(decoded, v);
    }

    proptest::proptest! {
        #[test]
        fn prop_set_then_clear_round_trips(indexes in proptest::collection::vec(0usize..200, 0..20)) {
            let v = set(&[], &indexes);
            proptest::prop_assert!(test(&v, &indexes));
            let cleared = clear(&v, &indexes);
            proptest::prop_assert!(!test(&cleared, &indexes) || indexes.is_empty());
        }

        #[test]
        fn prop_set_is_idempotent(indexes in proptest::collection::vec(0usize..200, 0..20)) {
            let v = set(&[], &indexes);
            let v2 = set(&v, &indexes);
            proptest::prop_assert_eq!(v, v2);
        }

        #[test]
        fn prop_clear_is_idempotent(indexes in proptest::collection::vec(0usize..200, 0..20)) {
            let v = set(&[], &indexes);
            let cleared = clear(&v, &indexes);
            let cleared2 = clear(&cleared, &indexes);
            proptest::prop_assert_eq!(cleared, cleared2);
        }

        #[test]
        fn prop_missing_returns_exactly_unset_indexes(
            set_indexes in proptest::collection::vec(0usize..64, 0..30),
            n in 0usize..64,
        ) {
            let v = set(&[], &set_indexes);
            let m = missing(&v, 0, n);
            let expected: Vec<usize> = (0..n).filter(|i| !set_indexes.contains(i)).collect();
            proptest::prop_assert_eq!(m, expected);
        }

        #[test]
        fn prop_base64_round_trips(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64)) {
            let encoded = encode_base64(&bytes);
            let decoded = decode_base64(&encoded).expect("valid base64");
            proptest::prop_assert_eq!(decoded, bytes);
        }
    }

    #[test]
    fn ingest_scenario_three_slots_all_absent_is_zero_byte() {
        // §8 scenario 1: three committed hashes, none present yet.
        let v: Vec<u8> = vec![];
        let v = clear(&v, &[0, 1, 2]);
        assert_eq!(v, vec![0x00]);
    }
}
