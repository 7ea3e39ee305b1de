//! Threat-intel collaborators: domain age and reputation lookups.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One reputation source's opinion of a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationHit {
    pub source: String,
    pub malicious: bool,
    #[serde(default)]
    pub score: f64,
}

#[async_trait]
pub trait ThreatIntel: Send + Sync {
    /// Days since the domain was registered.
    async fn fetch_domain_age(&self, domain: &str) -> Result<i64>;

    /// Every source's verdict on the domain; empty when none know it.
    async fn check_reputation(&self, domain: &str) -> Result<Vec<ReputationHit>>;
}

#[derive(Debug, Default, Deserialize)]
struct Fixtures {
    #[serde(default)]
    domain_ages: HashMap<String, i64>,
    #[serde(default)]
    reputation: HashMap<String, Vec<ReputationHit>>,
}

/// Answers from fixed tables. Domains are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticIntel {
    domain_ages: HashMap<String, i64>,
    reputation: HashMap<String, Vec<ReputationHit>>,
}

impl StaticIntel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain_age(mut self, domain: &str, days: i64) -> Self {
        self.domain_ages.insert(domain.to_lowercase(), days);
        self
    }

    pub fn with_reputation(mut self, domain: &str, hit: ReputationHit) -> Self {
        self.reputation
            .entry(domain.to_lowercase())
            .or_default()
            .push(hit);
        self
    }

    /// Load `{"domain_ages": {...}, "reputation": {"domain": [hit, ...]}}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading intel fixtures {}", path.display()))?;
        let fixtures: Fixtures = serde_json::from_str(&raw)
            .with_context(|| format!("parsing intel fixtures {}", path.display()))?;

        let intel = Self {
            domain_ages: lowercase_keys(fixtures.domain_ages),
            reputation: lowercase_keys(fixtures.reputation),
        };
        info!(
            path = %path.display(),
            domains = intel.domain_ages.len(),
            reputation_entries = intel.reputation.len(),
            "Loaded static threat intel"
        );
        Ok(intel)
    }
}

fn lowercase_keys<V>(map: HashMap<String, V>) -> HashMap<String, V> {
    map.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}

#[async_trait]
impl ThreatIntel for StaticIntel {
    async fn fetch_domain_age(&self, domain: &str) -> Result<i64> {
        self.domain_ages
            .get(&domain.to_lowercase())
            .copied()
            .with_context(|| format!("no registration data for {domain}"))
    }

    async fn check_reputation(&self, domain: &str) -> Result<Vec<ReputationHit>> {
        Ok(self
            .reputation
            .get(&domain.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(source: &str, malicious: bool) -> ReputationHit {
        ReputationHit {
            source: source.to_string(),
            malicious,
            score: if malicious { 0.9 } else { 0.0 },
        }
    }

    #[tokio::test]
    async fn static_intel_answers_from_tables() {
        let intel = StaticIntel::new()
            .with_domain_age("Login-Apple-Secure.com", 3)
            .with_reputation("login-apple-secure.com", hit("phishtank", true))
            .with_reputation("login-apple-secure.com", hit("urlhaus", false));

        assert_eq!(intel.fetch_domain_age("login-apple-secure.com").await.unwrap(), 3);
        let hits = intel.check_reputation("LOGIN-APPLE-SECURE.COM").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].malicious);
    }

    #[tokio::test]
    async fn unknown_domain_age_is_an_error_and_reputation_is_empty() {
        let intel = StaticIntel::new();
        assert!(intel.fetch_domain_age("example.test").await.is_err());
        assert!(intel.check_reputation("example.test").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn loads_fixture_file() {
        let path = std::env::temp_dir().join(format!("phishvault-intel-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"domain_ages": {"Malware.Example.com": 2},
                "reputation": {"malware.example.com": [{"source": "feed", "malicious": true, "score": 1.0}]}}"#,
        )
        .unwrap();

        let intel = StaticIntel::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(intel.fetch_domain_age("malware.example.com").await.unwrap(), 2);
        assert_eq!(intel.check_reputation("malware.example.com").await.unwrap().len(), 1);
    }
}
