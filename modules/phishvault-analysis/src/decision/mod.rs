//! Decision engine: maps a small feature record to a verdict and risk score
//! through a versioned, hot-swappable policy document.

pub mod policy;

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use phishvault_common::Verdict;

use crate::content::Intent;

pub use policy::{Condition, Evaluation, Feature, Op, Policy, Rule, ScoreModel, ScoreTerm};

const EMBEDDED_POLICY: &str = include_str!("../../policy/phishing.json");

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("failed to read policy: {0}")]
    Io(String),

    #[error("failed to parse policy: {0}")]
    Parse(String),

    #[error("invalid policy: {0}")]
    Invalid(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("risk score is not a finite number")]
    NonFinite,
}

/// Features the policy sees for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyInput {
    pub visual_match_score: f64,
    pub urgency_score: f64,
    pub intent: Intent,
    pub has_login_form: bool,
    /// `None` when domain age could not be determined.
    pub domain_age_days: Option<i64>,
    /// Any reputation source flagged the domain.
    #[serde(default)]
    pub known_malicious: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictResult {
    pub verdict: Verdict,
    /// Always within [0, 1].
    pub risk_score: f64,
    pub policy_version: String,
    /// Deciding rule, if any.
    pub rule: Option<String>,
}

impl VerdictResult {
    fn unknown(policy_version: String) -> Self {
        Self {
            verdict: Verdict::Unknown,
            risk_score: 0.0,
            policy_version,
            rule: None,
        }
    }
}

/// Parse and validate a policy document.
pub fn parse_policy(raw: &str) -> Result<Policy, PolicyError> {
    let policy: Policy =
        serde_json::from_str(raw).map_err(|e| PolicyError::Parse(e.to_string()))?;
    policy.validate()?;
    Ok(policy)
}

pub fn load_policy(path: &Path) -> Result<Policy, PolicyError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| PolicyError::Io(format!("{}: {e}", path.display())))?;
    parse_policy(&raw)
}

/// JSON Schema of the policy document format.
pub fn policy_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(Policy)
}

/// Evaluations read the active policy without locking; `replace` swaps it
/// atomically and in-flight evaluations finish on the version they loaded.
pub struct DecisionEngine {
    policy: ArcSwap<Policy>,
}

impl DecisionEngine {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy: ArcSwap::new(Arc::new(policy)),
        }
    }

    /// Engine running the policy compiled into the binary.
    pub fn embedded() -> Result<Self, PolicyError> {
        Ok(Self::new(parse_policy(EMBEDDED_POLICY)?))
    }

    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        Ok(Self::new(parse_policy(raw)?))
    }

    pub fn from_path(path: &Path) -> Result<Self, PolicyError> {
        let policy = load_policy(path)?;
        info!(path = %path.display(), version = policy.version.as_str(), "Loaded policy");
        Ok(Self::new(policy))
    }

    /// Swap in a new policy. Returns the version it replaced.
    pub fn replace(&self, policy: Policy) -> String {
        let new_version = policy.version.clone();
        let old = self.policy.swap(Arc::new(policy));
        info!(from = old.version.as_str(), to = new_version.as_str(), "Policy replaced");
        old.version.clone()
    }

    /// Load, validate and swap in the policy at `path`. On error the active
    /// policy is left untouched.
    pub fn reload_from_path(&self, path: &Path) -> Result<String, PolicyError> {
        let policy = load_policy(path)?;
        let version = policy.version.clone();
        self.replace(policy);
        Ok(version)
    }

    pub fn version(&self) -> String {
        self.policy.load().version.clone()
    }

    pub fn policy(&self) -> Arc<Policy> {
        self.policy.load_full()
    }

    pub fn try_evaluate(&self, input: &PolicyInput) -> Result<VerdictResult, PolicyError> {
        let policy = self.policy.load();
        let Evaluation {
            verdict,
            risk_score,
            rule,
        } = policy.evaluate(input)?;
        Ok(VerdictResult {
            verdict,
            risk_score,
            policy_version: policy.version.clone(),
            rule,
        })
    }

    /// Never fails: any evaluation error is logged and yields UNKNOWN with
    /// risk 0, which escalates the artifact for manual review.
    pub fn evaluate(&self, input: &PolicyInput) -> VerdictResult {
        match self.try_evaluate(input) {
            Ok(result) => result,
            Err(e) => {
                let version = self.version();
                warn!(policy_version = version.as_str(), error = %e, "Policy evaluation failed");
                VerdictResult::unknown(version)
            }
        }
    }
}
