pub mod clustering;
pub mod content;
pub mod decision;
pub mod intel;
pub mod orchestrator;
pub mod visual;

pub use clustering::{Cluster, ClusterEngine, DbscanParams, FeatureVector};
pub use content::{ContentAnalyzer, ContentRisk, FormRisk, Intent};
pub use decision::{DecisionEngine, Policy, PolicyError, PolicyInput, VerdictResult};
pub use intel::{ReputationHit, StaticIntel, ThreatIntel};
pub use orchestrator::{Orchestrator, OrchestratorDeps};
pub use visual::{GoldenSet, VisualMatch};
