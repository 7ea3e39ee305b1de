use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Signal taxonomy ---

pub const SIGNAL_BRAND_IMPERSONATION: &str = "BRAND_IMPERSONATION";
pub const SIGNAL_SENSITIVE_FORM: &str = "SENSITIVE_FORM";
pub const SIGNAL_YOUNG_DOMAIN: &str = "YOUNG_DOMAIN";
pub const SIGNAL_KNOWN_MALICIOUS: &str = "KNOWN_MALICIOUS";
/// Intent signals are keyed `INTENT_<label>`, e.g. `INTENT_CredentialHarvesting`.
pub const SIGNAL_INTENT_PREFIX: &str = "INTENT_";

/// Domains registered fewer than this many days ago raise `YOUNG_DOMAIN`.
pub const YOUNG_DOMAIN_MAX_DAYS: i64 = 30;

// --- Verdict ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Safe,
    Malicious,
    /// Escalate for manual review. Never read this as "safe".
    Unknown,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Safe => write!(f, "SAFE"),
            Verdict::Malicious => write!(f, "MALICIOUS"),
            Verdict::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// --- Entities ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "IP")]
    Ip,
    #[serde(rename = "ASN")]
    Asn,
    Domain,
    Brand,
    Email,
    Credential,
    #[serde(other)]
    Other,
}

/// An indicator extracted from an artifact. Read-only once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub value: String,
    /// Engine (or capture stage) that produced the entity.
    #[serde(default)]
    pub source: String,
}

impl Entity {
    pub fn new(entity_type: EntityType, value: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            entity_type,
            value: value.into(),
            source: source.into(),
        }
    }
}

// --- Signals ---

/// One engine's observation about an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub engine: String,
    pub key: String,
    /// Engine self-assessment, always within [0, 1].
    pub confidence: f64,
    /// Trust weight assigned to the engine.
    pub weight: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub evidence: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Signal {
    pub fn new(engine: &str, key: impl Into<String>, confidence: f64, weight: f64) -> Self {
        Self {
            engine: engine.to_string(),
            key: key.into(),
            confidence: clamp_unit(confidence),
            weight,
            evidence: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.evidence.insert(key.to_string(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

// --- Scan artifact ---

/// The unit of work handed to the analysis pipeline.
///
/// Capture fills in identity and input fields; the orchestrator fills in
/// signals, verdict and risk score during a single run and never touches the
/// artifact again afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanArtifact {
    #[serde(default)]
    pub scan_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub final_url: String,
    /// Full hop trace, in the order the redirects were followed.
    #[serde(default)]
    pub redirect_chain: Vec<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// e.g. "API", "Feed", "Email".
    #[serde(default)]
    pub ingestion_source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    /// Perceptual hash as captured, hex encoded. Parsed by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_hash: Option<String>,
    /// Address the final page was served from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default)]
    pub risk_score: f64,
}

impl ScanArtifact {
    pub fn new(scan_id: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            scan_id: scan_id.into(),
            final_url: url.clone(),
            url,
            redirect_chain: Vec::new(),
            timestamp: Utc::now(),
            ingestion_source: String::new(),
            raw_content: None,
            visual_hash: None,
            ip: None,
            signals: Vec::new(),
            entities: Vec::new(),
            campaign_id: None,
            verdict: None,
            risk_score: 0.0,
        }
    }

    /// Host of the final URL, falling back to the input URL when capture did
    /// not record where the redirects ended.
    pub fn final_host(&self) -> String {
        let host = extract_host(&self.final_url);
        if host.is_empty() {
            extract_host(&self.url)
        } else {
            host
        }
    }

    pub fn push_signal(&mut self, signal: Signal) {
        self.signals.push(signal);
    }

    pub fn has_signal(&self, key: &str) -> bool {
        self.signals.iter().any(|s| s.key == key)
    }
}

/// Lightweight host extraction: strip a leading `scheme://`, keep everything
/// up to the first `/`. No URL validation.
pub fn extract_host(url: &str) -> String {
    url.split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

/// Clamp into [0, 1]. NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_host_strips_scheme_and_path() {
        assert_eq!(extract_host("https://Login.Example.com/a/b?c=d"), "login.example.com");
        assert_eq!(extract_host("example.com/path"), "example.com");
        assert_eq!(extract_host("http://host:8080"), "host:8080");
        assert_eq!(extract_host(""), "");
    }

    #[test]
    fn final_host_falls_back_to_input_url() {
        let mut artifact = ScanArtifact::new("s1", "http://lure.test/x");
        artifact.final_url = String::new();
        assert_eq!(artifact.final_host(), "lure.test");

        artifact.final_url = "https://origin.test/login".to_string();
        assert_eq!(artifact.final_host(), "origin.test");
    }

    #[test]
    fn signal_confidence_is_clamped() {
        assert_eq!(Signal::new("e", "K", 1.7, 1.0).confidence, 1.0);
        assert_eq!(Signal::new("e", "K", -0.2, 1.0).confidence, 0.0);
        assert_eq!(Signal::new("e", "K", f64::NAN, 1.0).confidence, 0.0);
    }

    #[test]
    fn artifact_deserializes_from_capture_payload() {
        let json = r#"{
            "scan_id": "scan-1",
            "url": "http://lure.test",
            "redirect_chain": ["http://relay.test/r"],
            "visual_hash": "1234567890abcdef",
            "entities": [{"type": "ASN", "value": "AS13335", "source": "capture"},
                         {"type": "Certificate", "value": "x"}]
        }"#;
        let artifact: ScanArtifact = serde_json::from_str(json).unwrap();
        assert_eq!(artifact.redirect_chain.len(), 1);
        assert_eq!(artifact.entities[0].entity_type, EntityType::Asn);
        assert_eq!(artifact.entities[1].entity_type, EntityType::Other);
        assert!(artifact.verdict.is_none());
        assert!(artifact.signals.is_empty());
    }

    #[test]
    fn verdict_serializes_screaming_case() {
        assert_eq!(serde_json::to_string(&Verdict::Malicious).unwrap(), "\"MALICIOUS\"");
        assert_eq!(Verdict::Unknown.to_string(), "UNKNOWN");
    }
}
