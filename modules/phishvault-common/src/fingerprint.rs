//! 64-bit perceptual fingerprints (dHash/pHash) and their distance metrics.

use thiserror::Error;

/// Number of bits in a fingerprint; the maximum possible Hamming distance.
pub const FINGERPRINT_BITS: u32 = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("fingerprint is empty")]
    Empty,

    #[error("fingerprint '{0}' is longer than 16 hex digits")]
    TooLong(String),

    #[error("fingerprint '{0}' is not valid hex")]
    InvalidHex(String),
}

/// Parse a hex-encoded fingerprint, with or without a `0x` prefix.
pub fn parse_fingerprint(raw: &str) -> Result<u64, FingerprintError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(FingerprintError::Empty);
    }
    if digits.len() > 16 {
        return Err(FingerprintError::TooLong(raw.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| FingerprintError::InvalidHex(raw.to_string()))
}

/// Number of differing bits.
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// `1 - hamming/64`, always within [0, 1].
pub fn similarity(a: u64, b: u64) -> f64 {
    1.0 - f64::from(hamming(a, b)) / f64::from(FINGERPRINT_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_of_identical_hashes_is_zero() {
        for h in [0u64, 1, 0x1234_5678_9ABC_DEF0, u64::MAX] {
            assert_eq!(hamming(h, h), 0);
            assert_eq!(similarity(h, h), 1.0);
        }
    }

    #[test]
    fn hamming_counts_differing_bits() {
        assert_eq!(hamming(0xFFFF, 0xFFFE), 1);
        assert_eq!(hamming(0, u64::MAX), 64);
        assert_eq!(similarity(0, u64::MAX), 0.0);
    }

    #[test]
    fn parses_hex_with_and_without_prefix() {
        assert_eq!(parse_fingerprint("1234567890abcdef"), Ok(0x1234_5678_90AB_CDEF));
        assert_eq!(parse_fingerprint("0xFF"), Ok(0xFF));
        assert_eq!(parse_fingerprint(" 0Xff "), Ok(0xFF));
    }

    #[test]
    fn rejects_malformed_fingerprints() {
        assert_eq!(parse_fingerprint(""), Err(FingerprintError::Empty));
        assert_eq!(parse_fingerprint("0x"), Err(FingerprintError::Empty));
        assert!(matches!(parse_fingerprint("zzzz"), Err(FingerprintError::InvalidHex(_))));
        assert!(matches!(
            parse_fingerprint("1234567890abcdef0"),
            Err(FingerprintError::TooLong(_))
        ));
    }
}
