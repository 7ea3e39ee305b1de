//! Policy document model and evaluator.
//!
//! A policy computes a risk score from weighted features and bonus terms,
//! then walks an ordered rule list; the first rule whose conditions all hold
//! decides the verdict. Nothing here has side effects.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use phishvault_common::Verdict;

use super::{PolicyError, PolicyInput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub score: ScoreModel,
    /// Evaluated in order; the first match wins.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Verdict when no rule matches.
    #[serde(default = "default_verdict")]
    pub default_verdict: Verdict,
}

fn default_verdict() -> Verdict {
    Verdict::Unknown
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ScoreModel {
    #[serde(default)]
    pub base: f64,
    #[serde(default)]
    pub terms: Vec<ScoreTerm>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreTerm {
    /// `weight * feature`. Booleans count as 0 or 1; a null feature adds nothing.
    Weighted { feature: Feature, weight: f64 },
    /// Adds `add` when every condition holds.
    Bonus { when: Vec<Condition>, add: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub name: String,
    /// All must hold. An empty list always matches.
    #[serde(default)]
    pub when: Vec<Condition>,
    pub verdict: Verdict,
    /// Floor applied to the risk score when this rule decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_risk: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub feature: Feature,
    pub op: Op,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    VisualMatchScore,
    UrgencyScore,
    Intent,
    HasLoginForm,
    DomainAgeDays,
    KnownMalicious,
    /// The computed score. Only usable in rules.
    RiskScore,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::VisualMatchScore => "visual_match_score",
            Feature::UrgencyScore => "urgency_score",
            Feature::Intent => "intent",
            Feature::HasLoginForm => "has_login_form",
            Feature::DomainAgeDays => "domain_age_days",
            Feature::KnownMalicious => "known_malicious",
            Feature::RiskScore => "risk_score",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Lt => "lt",
            Op::Lte => "lte",
            Op::In => "in",
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub risk_score: f64,
    /// Name of the deciding rule; `None` when the default verdict applied.
    pub rule: Option<String>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Policy {
    /// Static checks run when a policy is loaded.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version.trim().is_empty() {
            return Err(PolicyError::Invalid("version must not be empty".into()));
        }
        if !self.score.base.is_finite() {
            return Err(PolicyError::Invalid("score.base must be finite".into()));
        }

        for (i, term) in self.score.terms.iter().enumerate() {
            match term {
                ScoreTerm::Weighted { feature, weight } => {
                    if *feature == Feature::RiskScore {
                        return Err(PolicyError::Invalid(format!(
                            "score term {i} references risk_score"
                        )));
                    }
                    if !weight.is_finite() {
                        return Err(PolicyError::Invalid(format!("score term {i} weight is not finite")));
                    }
                }
                ScoreTerm::Bonus { when, add } => {
                    if !add.is_finite() {
                        return Err(PolicyError::Invalid(format!("score term {i} bonus is not finite")));
                    }
                    for cond in when {
                        if cond.feature == Feature::RiskScore {
                            return Err(PolicyError::Invalid(format!(
                                "score term {i} references risk_score"
                            )));
                        }
                        cond.validate(&format!("score term {i}"))?;
                    }
                }
            }
        }

        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                return Err(PolicyError::Invalid("rule name must not be empty".into()));
            }
            if let Some(min) = rule.min_risk {
                if !(0.0..=1.0).contains(&min) {
                    return Err(PolicyError::Invalid(format!(
                        "rule '{}' min_risk {min} is outside [0, 1]",
                        rule.name
                    )));
                }
            }
            for cond in &rule.when {
                cond.validate(&format!("rule '{}'", rule.name))?;
            }
        }
        Ok(())
    }
}

impl Condition {
    fn validate(&self, context: &str) -> Result<(), PolicyError> {
        let ok = match self.op {
            Op::In => self.value.is_array(),
            Op::Gt | Op::Gte | Op::Lt | Op::Lte => self.value.is_number(),
            Op::Eq | Op::Ne => !self.value.is_null() && !self.value.is_array() && !self.value.is_object(),
        };
        if ok {
            Ok(())
        } else {
            Err(PolicyError::Invalid(format!(
                "{context}: '{}' {} does not accept {}",
                self.feature.as_str(),
                self.op.as_str(),
                self.value
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// A feature's value for one input.
#[derive(Debug, Clone, PartialEq)]
enum Actual {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

fn actual(input: &PolicyInput, risk_score: Option<f64>, feature: Feature) -> Actual {
    match feature {
        Feature::VisualMatchScore => Actual::Number(input.visual_match_score),
        Feature::UrgencyScore => Actual::Number(input.urgency_score),
        Feature::Intent => Actual::Text(input.intent.as_str().to_string()),
        Feature::HasLoginForm => Actual::Bool(input.has_login_form),
        Feature::DomainAgeDays => input
            .domain_age_days
            .map_or(Actual::Null, |d| Actual::Number(d as f64)),
        Feature::KnownMalicious => Actual::Bool(input.known_malicious),
        Feature::RiskScore => risk_score.map_or(Actual::Null, Actual::Number),
    }
}

fn type_error(cond: &Condition, actual: &Actual) -> PolicyError {
    PolicyError::Type(format!(
        "cannot apply '{}' {} {} to {:?}",
        cond.feature.as_str(),
        cond.op.as_str(),
        cond.value,
        actual
    ))
}

fn equals(cond: &Condition, actual: &Actual, expected: &Value) -> Result<bool, PolicyError> {
    match (actual, expected) {
        (Actual::Number(a), Value::Number(b)) => Ok(b.as_f64().is_some_and(|b| *a == b)),
        (Actual::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Actual::Text(a), Value::String(b)) => Ok(a == b),
        _ => Err(type_error(cond, actual)),
    }
}

fn compare(
    cond: &Condition,
    actual: &Actual,
    ordering: fn(f64, f64) -> bool,
) -> Result<bool, PolicyError> {
    let (Actual::Number(a), Some(b)) = (actual, cond.value.as_f64()) else {
        return Err(type_error(cond, actual));
    };
    Ok(ordering(*a, b))
}

impl Condition {
    /// A null feature value never satisfies a condition.
    fn holds(&self, input: &PolicyInput, risk_score: Option<f64>) -> Result<bool, PolicyError> {
        let actual = actual(input, risk_score, self.feature);
        if actual == Actual::Null {
            return Ok(false);
        }
        match self.op {
            Op::Eq => equals(self, &actual, &self.value),
            Op::Ne => equals(self, &actual, &self.value).map(|eq| !eq),
            Op::Gt => compare(self, &actual, |a, b| a > b),
            Op::Gte => compare(self, &actual, |a, b| a >= b),
            Op::Lt => compare(self, &actual, |a, b| a < b),
            Op::Lte => compare(self, &actual, |a, b| a <= b),
            Op::In => {
                let Value::Array(options) = &self.value else {
                    return Err(type_error(self, &actual));
                };
                for option in options {
                    if equals(self, &actual, option)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn all_hold(
    conditions: &[Condition],
    input: &PolicyInput,
    risk_score: Option<f64>,
) -> Result<bool, PolicyError> {
    for cond in conditions {
        if !cond.holds(input, risk_score)? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Policy {
    /// Risk score in [0, 1]. Errors on type mismatches and non-finite sums.
    pub fn score(&self, input: &PolicyInput) -> Result<f64, PolicyError> {
        let mut total = self.score.base;
        for term in &self.score.terms {
            match term {
                ScoreTerm::Weighted { feature, weight } => {
                    total += weight
                        * match actual(input, None, *feature) {
                            Actual::Number(n) => n,
                            Actual::Bool(b) => f64::from(u8::from(b)),
                            Actual::Null => 0.0,
                            other @ Actual::Text(_) => {
                                return Err(PolicyError::Type(format!(
                                    "weighted term on non-numeric feature '{}' ({other:?})",
                                    feature.as_str()
                                )))
                            }
                        };
                }
                ScoreTerm::Bonus { when, add } => {
                    if all_hold(when, input, None)? {
                        total += add;
                    }
                }
            }
        }
        if !total.is_finite() {
            return Err(PolicyError::NonFinite);
        }
        Ok(total.clamp(0.0, 1.0))
    }

    pub fn evaluate(&self, input: &PolicyInput) -> Result<Evaluation, PolicyError> {
        let score = self.score(input)?;
        for rule in &self.rules {
            if all_hold(&rule.when, input, Some(score))? {
                let risk = rule.min_risk.map_or(score, |min| score.max(min));
                return Ok(Evaluation {
                    verdict: rule.verdict,
                    risk_score: risk.clamp(0.0, 1.0),
                    rule: Some(rule.name.clone()),
                });
            }
        }
        Ok(Evaluation {
            verdict: self.default_verdict,
            risk_score: score,
            rule: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::content::Intent;

    fn input() -> PolicyInput {
        PolicyInput {
            visual_match_score: 0.0,
            urgency_score: 0.0,
            intent: Intent::Benign,
            has_login_form: false,
            domain_age_days: Some(100),
            known_malicious: false,
        }
    }

    fn policy(value: serde_json::Value) -> Policy {
        let policy: Policy = serde_json::from_value(value).unwrap();
        policy.validate().unwrap();
        policy
    }

    #[test]
    fn weighted_and_bonus_terms_sum() {
        let p = policy(json!({
            "version": "t",
            "score": {"base": 0.1, "terms": [
                {"kind": "weighted", "feature": "urgency_score", "weight": 0.5},
                {"kind": "weighted", "feature": "has_login_form", "weight": 0.2},
                {"kind": "bonus", "when": [{"feature": "intent", "op": "eq", "value": "PhishingScam"}], "add": 0.3}
            ]}
        }));
        let mut i = input();
        i.urgency_score = 0.4;
        i.has_login_form = true;
        i.intent = Intent::PhishingScam;
        assert!((p.score(&i).unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn score_is_clamped() {
        let p = policy(json!({
            "version": "t",
            "score": {"base": 0.9, "terms": [{"kind": "bonus", "when": [], "add": 0.9}]}
        }));
        assert_eq!(p.score(&input()).unwrap(), 1.0);

        let p = policy(json!({"version": "t", "score": {"base": -2.0}}));
        assert_eq!(p.score(&input()).unwrap(), 0.0);
    }

    #[test]
    fn first_matching_rule_wins_and_applies_floor() {
        let p = policy(json!({
            "version": "t",
            "score": {"terms": []},
            "rules": [
                {"name": "flagged", "when": [{"feature": "known_malicious", "op": "eq", "value": true}],
                 "verdict": "MALICIOUS", "min_risk": 0.9},
                {"name": "quiet", "when": [{"feature": "risk_score", "op": "lt", "value": 0.3}],
                 "verdict": "SAFE"}
            ]
        }));
        let mut i = input();
        i.known_malicious = true;
        let out = p.evaluate(&i).unwrap();
        assert_eq!(out.verdict, Verdict::Malicious);
        assert_eq!(out.risk_score, 0.9);
        assert_eq!(out.rule.as_deref(), Some("flagged"));

        let out = p.evaluate(&input()).unwrap();
        assert_eq!(out.verdict, Verdict::Safe);
        assert_eq!(out.rule.as_deref(), Some("quiet"));
    }

    #[test]
    fn unmatched_input_gets_default_verdict() {
        let p = policy(json!({"version": "t", "score": {"base": 0.5}, "rules": []}));
        let out = p.evaluate(&input()).unwrap();
        assert_eq!(out.verdict, Verdict::Unknown);
        assert_eq!(out.risk_score, 0.5);
        assert!(out.rule.is_none());
    }

    #[test]
    fn null_domain_age_never_satisfies_a_condition() {
        let p = policy(json!({
            "version": "t",
            "score": {"terms": [
                {"kind": "weighted", "feature": "domain_age_days", "weight": 1.0},
                {"kind": "bonus", "when": [{"feature": "domain_age_days", "op": "lt", "value": 30}], "add": 0.4},
                {"kind": "bonus", "when": [{"feature": "domain_age_days", "op": "ne", "value": 5}], "add": 0.2}
            ]}
        }));
        let mut i = input();
        i.domain_age_days = None;
        assert_eq!(p.score(&i).unwrap(), 0.0);
    }

    #[test]
    fn in_operator_matches_any_option() {
        let p = policy(json!({
            "version": "t",
            "score": {"terms": [{"kind": "bonus", "add": 0.5, "when": [
                {"feature": "intent", "op": "in", "value": ["CredentialHarvesting", "MalwareDistribution"]}
            ]}]}
        }));
        let mut i = input();
        i.intent = Intent::MalwareDistribution;
        assert_eq!(p.score(&i).unwrap(), 0.5);
        i.intent = Intent::PhishingScam;
        assert_eq!(p.score(&i).unwrap(), 0.0);
    }

    #[test]
    fn type_mismatch_is_an_evaluation_error() {
        let p = policy(json!({
            "version": "t",
            "score": {"terms": [{"kind": "bonus", "add": 0.5, "when": [
                {"feature": "intent", "op": "eq", "value": 3}
            ]}]}
        }));
        assert!(matches!(p.score(&input()), Err(PolicyError::Type(_))));

        let p = policy(json!({
            "version": "t",
            "score": {"terms": [{"kind": "weighted", "feature": "intent", "weight": 1.0}]}
        }));
        assert!(matches!(p.score(&input()), Err(PolicyError::Type(_))));
    }

    #[test]
    fn non_finite_input_is_an_evaluation_error() {
        let p = policy(json!({
            "version": "t",
            "score": {"terms": [{"kind": "weighted", "feature": "visual_match_score", "weight": 1.0}]}
        }));
        let mut i = input();
        i.visual_match_score = f64::NAN;
        assert!(matches!(p.evaluate(&i), Err(PolicyError::NonFinite)));
    }

    #[test]
    fn validation_rejects_bad_documents() {
        let bad = [
            json!({"version": "", "score": {}}),
            json!({"version": "t", "score": {"terms": [{"kind": "weighted", "feature": "risk_score", "weight": 1.0}]}}),
            json!({"version": "t", "score": {}, "rules": [{"name": "r", "verdict": "SAFE", "min_risk": 1.5}]}),
            json!({"version": "t", "score": {}, "rules": [{"name": "r", "verdict": "SAFE",
                   "when": [{"feature": "urgency_score", "op": "gt", "value": "high"}]}]}),
            json!({"version": "t", "score": {}, "rules": [{"name": "r", "verdict": "SAFE",
                   "when": [{"feature": "intent", "op": "in", "value": "Benign"}]}]}),
        ];
        for doc in bad {
            let policy: Policy = serde_json::from_value(doc.clone()).unwrap();
            assert!(policy.validate().is_err(), "accepted {doc}");
        }
    }

    #[test]
    fn unknown_features_fail_to_parse() {
        let doc = json!({"version": "t", "score": {"terms": [
            {"kind": "weighted", "feature": "page_rank", "weight": 1.0}
        ]}});
        assert!(serde_json::from_value::<Policy>(doc).is_err());
    }
}
