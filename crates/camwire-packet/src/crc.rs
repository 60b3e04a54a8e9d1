//! Table-driven CRC-32 (IEEE 802.3, reflected).
//!
//! Polynomial `0xEDB88320` in reflected form, register preset to all ones,
//! result inverted. Identical to zlib's `crc32`, so host tools can verify
//! chunks with any standard implementation.

const POLYNOMIAL: u32 = 0xEDB8_8320;

/// Lookup table for one byte at a time, built at compile time.
static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut crc = byte as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[byte] = crc;
        byte += 1;
    }
    table
}

/// CRC-32 of `data`. Empty input yields `0`.
pub fn checksum(data: &[u8]) -> u32 {
    let crc = data.iter().fold(0xFFFF_FFFFu32, |crc, &b| {
        (crc >> 8) ^ TABLE[((crc ^ b as u32) & 0xFF) as usize]
    });
    crc ^ 0xFFFF_FFFF
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(b""), 0x0000_0000);
    }

    #[test]
    fn check_value() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn known_table_entries() {
        assert_eq!(TABLE[0], 0x0000_0000);
        assert_eq!(TABLE[1], 0x7707_3096);
        assert_eq!(TABLE[128], 0xEDB8_8320);
        assert_eq!(TABLE[255], 0x2D02_EF8D);
    }

    #[test]
    fn single_bit_flip_changes_checksum() {
        let mut payload: Vec<u8> = (0..512u32).map(|i| (i * 31 % 251) as u8).collect();
        let original = checksum(&payload);

        for bit in [0usize, 7, 1000, 4095] {
            payload[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(checksum(&payload), original, "flip of bit {bit} went unnoticed");
            payload[bit / 8] ^= 1 << (bit % 8);
        }
        assert_eq!(checksum(&payload), original);
    }

    proptest! {
        #[test]
        fn matches_reference_implementation(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            prop_assert_eq!(checksum(&data), crc32fast::hash(&data));
        }

        #[test]
        fn deterministic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(checksum(&data), checksum(&data));
        }
    }
}
