//! Content risk pipeline: form structure, text semantics and brand
//! extraction fused into an intent label and an urgency score.

pub mod bayes;
pub mod brands;
pub mod forms;
pub mod text;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use phishvault_common::clamp_unit;

pub use bayes::BayesClassifier;
pub use brands::{brand_mismatch, BrandExtractor};
pub use forms::{analyze_forms, FormRisk};
pub use text::{dom_tokens, suspicious_keywords, visible_text};

/// Bayes confidence above which generic phishing intent is assumed.
const PHISHING_CONFIDENCE: f64 = 0.8;

const BAYES_WEIGHT: f64 = 0.6;
const BRAND_MISMATCH_BOOST: f64 = 0.3;
const FOREIGN_ACTION_BOOST: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Intent {
    Benign,
    PhishingScam,
    CredentialHarvesting,
    MalwareDistribution,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Benign => "Benign",
            Intent::PhishingScam => "PhishingScam",
            Intent::CredentialHarvesting => "CredentialHarvesting",
            Intent::MalwareDistribution => "MalwareDistribution",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRisk {
    /// Always within [0, 1].
    pub urgency_score: f64,
    pub intent: Intent,
    /// Suspicious phrases found, plus `brand_mismatch: ...` when applicable.
    pub keywords: Vec<String>,
    pub form_risk: FormRisk,
    /// Raw bucketed classifier output.
    pub bayes_confidence: f64,
    pub brands: Vec<String>,
}

/// Stateless after construction; share it freely across tasks.
#[derive(Debug, Clone, Default)]
pub struct ContentAnalyzer {
    bayes: BayesClassifier,
    brands: BrandExtractor,
}

impl ContentAnalyzer {
    pub fn new(bayes: BayesClassifier, brands: BrandExtractor) -> Self {
        Self { bayes, brands }
    }

    /// Analyze a captured page served from `hosting_domain`.
    pub fn analyze(&self, markup: &str, text: &str, hosting_domain: &str) -> ContentRisk {
        let lower_text = text.to_lowercase();
        let form_risk = analyze_forms(markup, hosting_domain);

        let bayes_confidence = self.bayes.confidence(&lower_text);

        let brands = self.brands.extract(text);
        let mismatch = brand_mismatch(&brands, hosting_domain);

        let mut keywords = suspicious_keywords(&lower_text);
        if mismatch {
            keywords.push(format!("brand_mismatch: {}", brands.join(",")));
        }

        let mut intent = Intent::Benign;
        if bayes_confidence > PHISHING_CONFIDENCE {
            intent = Intent::PhishingScam;
        }
        if form_risk.has_password {
            intent = Intent::CredentialHarvesting;
        }
        if lower_text.contains("download") && lower_text.contains(".exe") {
            intent = Intent::MalwareDistribution;
        }

        let mut urgency = BAYES_WEIGHT * bayes_confidence;
        if mismatch {
            urgency += BRAND_MISMATCH_BOOST;
        }
        if form_risk.foreign_action {
            urgency += FOREIGN_ACTION_BOOST;
        }

        ContentRisk {
            urgency_score: clamp_unit(urgency),
            intent,
            keywords,
            form_risk,
            bayes_confidence,
            brands,
        }
    }
}
