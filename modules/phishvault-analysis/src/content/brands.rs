//! Organization-name extraction from visible page text.
//!
//! Two sources: a gazetteer of known brand names (matched on word
//! boundaries, case-insensitive) and capitalized phrases ending in an
//! organization suffix such as "Acme Bank" or "Contoso Ltd".

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

/// Extracted names that never count as a brand.
const STOPLIST: &[&str] = &["inc", "ltd", "browser"];

/// Brands commonly impersonated, on top of the Golden Set names.
const COMMON_BRANDS: &[&str] = &[
    "Apple",
    "Amazon",
    "Netflix",
    "Facebook",
    "Instagram",
    "LinkedIn",
    "Dropbox",
    "DocuSign",
    "Adobe",
    "DHL",
    "FedEx",
    "Chase",
    "Wells Fargo",
    "Bank of America",
    "Coinbase",
];

static RE_ORG_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b((?:[A-Z][\w&'-]*\s+){1,3}(?:Inc|Ltd|LLC|Corp|Corporation|Bank|Group|Holdings)\b)",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct BrandExtractor {
    gazetteer: Vec<(String, Regex)>,
}

impl Default for BrandExtractor {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl BrandExtractor {
    /// Gazetteer of `brands` plus the common brand list.
    pub fn new<I, S>(brands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut gazetteer: Vec<(String, Regex)> = Vec::new();
        let names = brands
            .into_iter()
            .map(|b| b.as_ref().trim().to_string())
            .chain(COMMON_BRANDS.iter().map(|b| b.to_string()));

        for name in names {
            if name.is_empty() || gazetteer.iter().any(|(n, _)| n.eq_ignore_ascii_case(&name)) {
                continue;
            }
            match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&name))) {
                Ok(re) => gazetteer.push((name, re)),
                Err(e) => warn!(brand = name.as_str(), error = %e, "Skipping unmatchable brand name"),
            }
        }
        Self { gazetteer }
    }

    /// Organization names in order of first appearance, de-duplicated.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut found: Vec<(usize, String)> = Vec::new();

        for (name, re) in &self.gazetteer {
            if let Some(m) = re.find(text) {
                found.push((m.start(), name.clone()));
            }
        }
        for cap in RE_ORG_SUFFIX.captures_iter(text) {
            if let Some(m) = cap.get(1) {
                found.push((m.start(), m.as_str().split_whitespace().collect::<Vec<_>>().join(" ")));
            }
        }

        found.sort_by_key(|(pos, _)| *pos);
        let mut brands: Vec<String> = Vec::new();
        for (_, name) in found {
            if !brands.contains(&name) {
                brands.push(name);
            }
        }
        brands
    }
}

/// Trailing words a hosting domain commonly leaves out of the brand.
const ORG_SUFFIXES: &[&str] = &["inc", "ltd", "llc", "corp", "corporation", "group", "holdings"];

/// Lowercase ASCII alphanumerics only: "Wells Fargo" and "wells-fargo.com"
/// become comparable.
fn compact(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Forms of `brand` a legitimate host name may carry: the whole name, and
/// the name without a trailing organization suffix.
fn host_forms(brand: &str) -> Vec<String> {
    let mut forms = vec![compact(brand)];
    let words: Vec<&str> = brand.split_whitespace().collect();
    if let Some((last, rest)) = words.split_last() {
        if !rest.is_empty() && ORG_SUFFIXES.contains(&compact(last).as_str()) {
            forms.push(compact(&rest.join(" ")));
        }
    }
    forms.retain(|f| !f.is_empty());
    forms
}

/// True when some extracted brand does not appear in the hosting domain.
pub fn brand_mismatch(brands: &[String], hosting_domain: &str) -> bool {
    let domain = compact(hosting_domain);
    brands.iter().any(|brand| {
        let lower = brand.trim().to_lowercase();
        if STOPLIST.contains(&lower.as_str()) {
            return false;
        }
        let forms = host_forms(brand);
        let mismatched = !forms.is_empty() && !forms.iter().any(|f| domain.contains(f.as_str()));
        if mismatched {
            debug!(brand = brand.as_str(), domain = hosting_domain, "Brand mismatch");
        }
        mismatched
    })
}
