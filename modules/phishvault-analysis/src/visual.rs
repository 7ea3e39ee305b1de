//! Golden Set: reference fingerprints of known brand login pages, and the
//! nearest-neighbor lookup against it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use phishvault_common::{parse_fingerprint, similarity, PhishVaultError};

/// Similarity must be strictly above this to count as a match.
pub const MATCH_THRESHOLD: f64 = 0.85;

/// Result of a catalog lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualMatch {
    /// Best brand, only set when `matched`.
    pub brand: Option<String>,
    /// Best similarity seen, matched or not.
    pub similarity: f64,
    pub matched: bool,
}

impl VisualMatch {
    pub fn none() -> Self {
        Self {
            brand: None,
            similarity: 0.0,
            matched: false,
        }
    }
}

/// On-disk catalog format: brand name to hex fingerprints.
#[derive(Debug, Deserialize, Serialize)]
struct CatalogFile {
    brands: HashMap<String, Vec<String>>,
}

/// Read-only after startup. Brands are kept sorted so ties resolve the same
/// way on every run.
#[derive(Debug, Clone, Default)]
pub struct GoldenSet {
    brands: BTreeMap<String, Vec<u64>>,
}

impl GoldenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Self {
        let mut set = Self::new();
        set.add("Microsoft", 0x1234_5678_90AB_CDEF);
        set.add("PayPal", 0x9876_5432_10AB_CDEF);
        set.add("Google", 0xAAAA_5555_AAAA_5555);
        set
    }

    pub fn from_json(raw: &str) -> Result<Self, PhishVaultError> {
        let file: CatalogFile = serde_json::from_str(raw)
            .map_err(|e| PhishVaultError::Catalog(format!("invalid catalog JSON: {e}")))?;

        let mut set = Self::new();
        for (brand, hashes) in file.brands {
            for raw_hash in hashes {
                let hash = parse_fingerprint(&raw_hash)
                    .map_err(|e| PhishVaultError::Catalog(format!("brand '{brand}': {e}")))?;
                set.add(&brand, hash);
            }
        }
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, PhishVaultError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PhishVaultError::Catalog(format!("reading {}: {e}", path.display()))
        })?;
        let set = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            brands = set.brands.len(),
            fingerprints = set.len(),
            "Loaded golden set"
        );
        Ok(set)
    }

    pub fn add(&mut self, brand: &str, hash: u64) {
        self.brands.entry(brand.to_string()).or_default().push(hash);
    }

    pub fn brands(&self) -> impl Iterator<Item = &str> {
        self.brands.keys().map(String::as_str)
    }

    /// Total number of reference fingerprints.
    pub fn len(&self) -> usize {
        self.brands.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closest brand by Hamming similarity over every stored fingerprint.
    pub fn find_match(&self, hash: u64) -> VisualMatch {
        let mut best: Option<(&str, f64)> = None;
        for (brand, hashes) in &self.brands {
            for &reference in hashes {
                let score = similarity(hash, reference);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((brand, score));
                }
            }
        }

        match best {
            Some((brand, score)) if score > MATCH_THRESHOLD => VisualMatch {
                brand: Some(brand.to_string()),
                similarity: score,
                matched: true,
            },
            Some((_, score)) => VisualMatch {
                brand: None,
                similarity: score,
                matched: false,
            },
            None => VisualMatch::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_fingerprint_matches_its_brand() {
        let set = GoldenSet::builtin();
        let m = set.find_match(0x9876_5432_10AB_CDEF);
        assert!(m.matched);
        assert_eq!(m.brand.as_deref(), Some("PayPal"));
        assert_eq!(m.similarity, 1.0);
    }

    #[test]
    fn near_fingerprint_still_matches() {
        let set = GoldenSet::builtin();
        // 4 bits off: similarity 60/64 = 0.9375
        let m = set.find_match(0x1234_5678_90AB_CDEF ^ 0xF);
        assert!(m.matched);
        assert_eq!(m.brand.as_deref(), Some("Microsoft"));
    }

    #[test]
    fn below_threshold_is_unmatched_but_keeps_similarity() {
        let mut set = GoldenSet::new();
        set.add("Brand", 0);
        // 10 bits set: similarity 54/64 = 0.84375
        let m = set.find_match(0x3FF);
        assert!(!m.matched);
        assert!(m.brand.is_none());
        assert!((m.similarity - 54.0 / 64.0).abs() < 1e-12);

        // 9 bits set: 55/64 = 0.859 > 0.85
        assert!(set.find_match(0x1FF).matched);
    }

    #[test]
    fn similarity_is_always_a_unit_value() {
        let set = GoldenSet::builtin();
        for h in [0u64, 1, u64::MAX, 0x5555_AAAA_5555_AAAA] {
            let m = set.find_match(h);
            assert!((0.0..=1.0).contains(&m.similarity));
        }
    }

    #[test]
    fn empty_catalog_never_matches() {
        let m = GoldenSet::new().find_match(0x1234);
        assert_eq!(m, VisualMatch::none());
    }

    #[test]
    fn loads_catalog_json() {
        let set = GoldenSet::from_json(
            r#"{"brands": {"Acme Bank": ["0x00000000000000ff", "ffff"], "Contoso": ["1"]}}"#,
        )
        .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.brands().collect::<Vec<_>>(), vec!["Acme Bank", "Contoso"]);
        assert_eq!(set.find_match(0xFF).brand.as_deref(), Some("Acme Bank"));
    }

    #[test]
    fn rejects_bad_fingerprints_in_catalog() {
        let err = GoldenSet::from_json(r#"{"brands": {"X": ["nothex"]}}"#).unwrap_err();
        assert!(matches!(err, PhishVaultError::Catalog(_)));
    }
}
