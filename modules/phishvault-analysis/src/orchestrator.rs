use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use phishvault_common::{
    clamp_unit, parse_fingerprint, Config, Entity, EntityType, PhishVaultError, ScanArtifact,
    Signal, SIGNAL_BRAND_IMPERSONATION, SIGNAL_INTENT_PREFIX, SIGNAL_KNOWN_MALICIOUS,
    SIGNAL_SENSITIVE_FORM, SIGNAL_YOUNG_DOMAIN, YOUNG_DOMAIN_MAX_DAYS,
};
use phishvault_graph::{graph_store_from_config, Projector, ProjectorConfig};

use crate::clustering::{Cluster, ClusterEngine, FeatureVector};
use crate::content::{dom_tokens, visible_text, BayesClassifier, BrandExtractor, ContentAnalyzer, Intent};
use crate::decision::{DecisionEngine, PolicyInput};
use crate::intel::{StaticIntel, ThreatIntel};
use crate::visual::{GoldenSet, VisualMatch};

/// Stand-in markup when capture stored no content.
const EMPTY_DOCUMENT: &str = "<html></html>";

// Engine names recorded on signals and entities.
const ENGINE_VISUAL: &str = "visual";
const ENGINE_CONTENT: &str = "content";
const ENGINE_STRUCTURE: &str = "structure";
const ENGINE_INTEL: &str = "intel";

/// Everything the orchestrator is wired from.
#[derive(TypedBuilder)]
pub struct OrchestratorDeps {
    #[builder(default = GoldenSet::builtin())]
    pub golden_set: GoldenSet,
    #[builder(default)]
    pub content: ContentAnalyzer,
    pub decision: Arc<DecisionEngine>,
    pub intel: Arc<dyn ThreatIntel>,
    pub projector: Projector,
    #[builder(default = ClusterEngine::new(20))]
    pub clusters: ClusterEngine,
    #[builder(default = Duration::from_secs(5))]
    pub collaborator_timeout: Duration,
}

/// Runs one artifact through every engine and returns it enriched.
///
/// Holds no lock across a call; any number of `process_artifact` futures may
/// run concurrently against one instance.
pub struct Orchestrator {
    golden_set: GoldenSet,
    content: ContentAnalyzer,
    decision: Arc<DecisionEngine>,
    intel: Arc<dyn ThreatIntel>,
    projector: Projector,
    clusters: ClusterEngine,
    collaborator_timeout: Duration,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            golden_set: deps.golden_set,
            content: deps.content,
            decision: deps.decision,
            intel: deps.intel,
            projector: deps.projector,
            clusters: deps.clusters,
            collaborator_timeout: deps.collaborator_timeout,
        }
    }

    /// Wire every component from configuration. Must be called inside a
    /// tokio runtime (the projector spawns its flush task).
    pub async fn from_config(config: &Config) -> Result<Self, PhishVaultError> {
        let golden_set = match &config.golden_set_path {
            Some(path) => GoldenSet::load(path)?,
            None => GoldenSet::builtin(),
        };
        let content = ContentAnalyzer::new(
            BayesClassifier::seeded(),
            BrandExtractor::new(golden_set.brands()),
        );

        let decision = match &config.policy_path {
            Some(path) => DecisionEngine::from_path(path),
            None => DecisionEngine::embedded(),
        }
        .map_err(|e| PhishVaultError::Policy(e.to_string()))?;

        let intel: Arc<dyn ThreatIntel> = match &config.intel_fixtures_path {
            Some(path) => Arc::new(StaticIntel::from_file(path)?),
            None => Arc::new(StaticIntel::new()),
        };

        let store = graph_store_from_config(config).await?;
        let projector = Projector::spawn(store, ProjectorConfig::from(config));

        info!(
            policy_version = decision.version().as_str(),
            golden_set = golden_set.len(),
            "Orchestrator ready"
        );

        Ok(Self::new(
            OrchestratorDeps::builder()
                .golden_set(golden_set)
                .content(content)
                .decision(Arc::new(decision))
                .intel(intel)
                .projector(projector)
                .clusters(ClusterEngine::new(config.cluster_batch_size))
                .collaborator_timeout(config.collaborator_timeout)
                .build(),
        ))
    }

    /// The live decision engine, for hot policy swaps.
    pub fn decision(&self) -> &DecisionEngine {
        &self.decision
    }

    /// Enrich `artifact` with signals, entities, a verdict and a risk score.
    ///
    /// Every engine or collaborator failure is logged and the affected step
    /// skipped; incomplete input still gets a best-effort verdict.
    pub async fn process_artifact(
        &self,
        mut artifact: ScanArtifact,
    ) -> Result<ScanArtifact, PhishVaultError> {
        if artifact.url.trim().is_empty() {
            warn!(
                scan_id = artifact.scan_id.as_str(),
                final_url = artifact.final_url.as_str(),
                "Artifact has no input URL, scoring against the final URL"
            );
        }
        let host = artifact.final_host();
        info!(scan_id = artifact.scan_id.as_str(), host = host.as_str(), "Processing artifact");

        // 1. Visual
        let fingerprint = self.fingerprint_of(&artifact);
        let visual = if fingerprint == 0 {
            VisualMatch::none()
        } else {
            self.golden_set.find_match(fingerprint)
        };
        if let (true, Some(brand)) = (visual.matched, visual.brand.as_deref()) {
            artifact.push_signal(
                Signal::new(ENGINE_VISUAL, SIGNAL_BRAND_IMPERSONATION, visual.similarity, 1.0)
                    .with_evidence("target_brand", brand)
                    .with_evidence("similarity", visual.similarity)
                    .with_tag("visual_clone"),
            );
            artifact
                .entities
                .push(Entity::new(EntityType::Brand, brand, ENGINE_VISUAL));
        }

        // 2. Content
        let markup = artifact
            .raw_content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(EMPTY_DOCUMENT)
            .to_string();
        let text = visible_text(&markup);
        let risk = self.content.analyze(&markup, &text, &host);
        if risk.intent != Intent::Benign {
            artifact.push_signal(
                Signal::new(
                    ENGINE_CONTENT,
                    format!("{SIGNAL_INTENT_PREFIX}{}", risk.intent),
                    risk.urgency_score,
                    0.8,
                )
                .with_evidence("keywords", risk.keywords.clone())
                .with_evidence("bayes_confidence", risk.bayes_confidence)
                .with_tag(risk.intent.as_str()),
            );
        }
        if risk.form_risk.has_password {
            artifact.push_signal(
                Signal::new(ENGINE_STRUCTURE, SIGNAL_SENSITIVE_FORM, 1.0, 0.5)
                    .with_evidence("foreign_action", risk.form_risk.foreign_action)
                    .with_evidence("has_upload", risk.form_risk.has_upload),
            );
        }
        for brand in &risk.brands {
            if !artifact
                .entities
                .iter()
                .any(|e| e.entity_type == EntityType::Brand && e.value == *brand)
            {
                artifact
                    .entities
                    .push(Entity::new(EntityType::Brand, brand.as_str(), ENGINE_CONTENT));
            }
        }

        // 3. Threat intel
        let (age, reputation) = tokio::join!(
            self.bounded("domain_age", &artifact.scan_id, self.intel.fetch_domain_age(&host)),
            self.bounded("reputation", &artifact.scan_id, self.intel.check_reputation(&host)),
        );
        if let Some(days) = age.filter(|d| *d < YOUNG_DOMAIN_MAX_DAYS) {
            artifact.push_signal(
                Signal::new(ENGINE_INTEL, SIGNAL_YOUNG_DOMAIN, 1.0, 0.6)
                    .with_evidence("domain_age_days", days),
            );
        }
        let mut known_malicious = false;
        for hit in reputation.unwrap_or_default().into_iter().filter(|h| h.malicious) {
            known_malicious = true;
            let confidence = if hit.score > 0.0 { hit.score } else { 1.0 };
            artifact.push_signal(
                Signal::new(ENGINE_INTEL, SIGNAL_KNOWN_MALICIOUS, confidence, 1.0)
                    .with_evidence("source", hit.source.as_str())
                    .with_tag(hit.source),
            );
        }

        // 4. Decision
        let verdict = self.decision.evaluate(&PolicyInput {
            visual_match_score: visual.similarity,
            urgency_score: risk.urgency_score,
            intent: risk.intent,
            has_login_form: risk.form_risk.has_password,
            domain_age_days: age,
            known_malicious,
        });
        artifact.verdict = Some(verdict.verdict);
        artifact.risk_score = clamp_unit(verdict.risk_score);

        info!(
            scan_id = artifact.scan_id.as_str(),
            verdict = %verdict.verdict,
            risk_score = artifact.risk_score,
            rule = verdict.rule.as_deref().unwrap_or("-"),
            policy_version = verdict.policy_version.as_str(),
            signals = artifact.signals.len(),
            "Artifact scored"
        );

        // 5. Graph projection (buffered)
        self.projector.project(&artifact);

        // 6. Campaign clustering (may run a pass on this task)
        let ip = artifact.ip.clone().or_else(|| {
            artifact
                .entities
                .iter()
                .find(|e| e.entity_type == EntityType::Ip)
                .map(|e| e.value.clone())
        });
        self.clusters.add(FeatureVector {
            id: artifact.scan_id.clone(),
            visual_hash: fingerprint,
            ip: ip.unwrap_or_default(),
            dom_tokens: dom_tokens(&markup),
        });

        Ok(artifact)
    }

    /// Cluster what is still buffered, then flush and close the graph
    /// projector. Returns the final clusters.
    pub async fn shutdown(self) -> Vec<Cluster> {
        let clusters = self.clusters.drain();
        self.projector.close().await;
        info!("Orchestrator stopped");
        clusters
    }

    /// A malformed fingerprint is treated as absent.
    fn fingerprint_of(&self, artifact: &ScanArtifact) -> u64 {
        match artifact.visual_hash.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(raw) => parse_fingerprint(raw).unwrap_or_else(|e| {
                warn!(scan_id = artifact.scan_id.as_str(), error = %e, "Ignoring malformed visual hash");
                0
            }),
        }
    }

    /// Await a collaborator call within the configured timeout. Failures and
    /// timeouts are logged and yield `None`.
    async fn bounded<T, F>(&self, what: &str, scan_id: &str, call: F) -> Option<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match time::timeout(self.collaborator_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(scan_id, collaborator = what, error = %e, "Collaborator call failed, skipping");
                None
            }
            Err(_) => {
                warn!(
                    scan_id,
                    collaborator = what,
                    timeout_ms = self.collaborator_timeout.as_millis() as u64,
                    "Collaborator call timed out, skipping"
                );
                None
            }
        }
    }
}
