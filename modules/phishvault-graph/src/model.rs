use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type Properties = BTreeMap<String, serde_json::Value>;

/// Node labels the projector emits. Labels are interpolated into Cypher, so
/// they are a closed set rather than free strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeLabel {
    ScanArtifact,
    Domain,
    #[serde(rename = "ASN")]
    Asn,
    Campaign,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::ScanArtifact => "ScanArtifact",
            NodeLabel::Domain => "Domain",
            NodeLabel::Asn => "ASN",
            NodeLabel::Campaign => "Campaign",
        }
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    Captured,
    RedirectsTo,
    PartOf,
    HostedOn,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Captured => "CAPTURED",
            Relation::RedirectsTo => "REDIRECTS_TO",
            Relation::PartOf => "PART_OF",
            Relation::HostedOn => "HOSTED_ON",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub label: NodeLabel,
    /// Unique within the label: a domain name, scan id, campaign id, ASN.
    pub key: String,
    pub properties: Properties,
}

impl GraphNode {
    pub fn new(label: NodeLabel, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
            properties: Properties::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_label: NodeLabel,
    pub source_key: String,
    pub target_label: NodeLabel,
    pub target_key: String,
    pub relation: Relation,
    pub properties: Properties,
}

impl GraphEdge {
    pub fn new(
        source_label: NodeLabel,
        source_key: impl Into<String>,
        relation: Relation,
        target_label: NodeLabel,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            source_label,
            source_key: source_key.into(),
            target_label,
            target_key: target_key.into(),
            relation,
            properties: Properties::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }
}
