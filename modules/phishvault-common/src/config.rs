use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::PhishVaultError;

/// Which graph store the projector writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphBackend {
    /// Logs each batch; persists nothing.
    Console,
    /// Records batches in process memory.
    Memory,
    Neo4j,
}

impl FromStr for GraphBackend {
    type Err = PhishVaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "console" => Ok(GraphBackend::Console),
            "memory" => Ok(GraphBackend::Memory),
            "neo4j" => Ok(GraphBackend::Neo4j),
            other => Err(PhishVaultError::Config(format!(
                "unknown GRAPH_BACKEND '{other}' (expected console, memory or neo4j)"
            ))),
        }
    }
}

/// Analysis service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Graph store
    pub graph_backend: GraphBackend,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub graph_batch_size: usize,
    pub graph_flush_interval: Duration,
    pub graph_flush_timeout: Duration,
    /// Projections waiting for the writer before new ones are dropped.
    pub graph_queue_capacity: usize,

    // Clustering
    pub cluster_batch_size: usize,

    // Collaborators
    pub collaborator_timeout: Duration,

    // Data files
    pub policy_path: Option<PathBuf>,
    pub golden_set_path: Option<PathBuf>,
    pub intel_fixtures_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graph_backend: GraphBackend::Console,
            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: "password".to_string(),
            graph_batch_size: 10,
            graph_flush_interval: Duration::from_millis(2000),
            graph_flush_timeout: Duration::from_millis(10_000),
            graph_queue_capacity: 1024,
            cluster_batch_size: 20,
            collaborator_timeout: Duration::from_millis(5000),
            policy_path: None,
            golden_set_path: None,
            intel_fixtures_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, using defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self, PhishVaultError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PhishVaultError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let graph_backend = match lookup("GRAPH_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.graph_backend,
        };

        Ok(Self {
            graph_backend,
            neo4j_uri: lookup("NEO4J_URI").unwrap_or(defaults.neo4j_uri),
            neo4j_user: lookup("NEO4J_USER").unwrap_or(defaults.neo4j_user),
            neo4j_password: lookup("NEO4J_PASSWORD").unwrap_or(defaults.neo4j_password),
            graph_batch_size: parse_or(&lookup, "GRAPH_BATCH_SIZE", defaults.graph_batch_size).max(1),
            graph_flush_interval: Duration::from_millis(
                parse_or(&lookup, "GRAPH_FLUSH_INTERVAL_MS", 2000u64).max(1),
            ),
            graph_flush_timeout: Duration::from_millis(parse_or(
                &lookup,
                "GRAPH_FLUSH_TIMEOUT_MS",
                10_000u64,
            )),
            graph_queue_capacity: parse_or(
                &lookup,
                "GRAPH_QUEUE_CAPACITY",
                defaults.graph_queue_capacity,
            )
            .max(1),
            cluster_batch_size: parse_or(&lookup, "CLUSTER_BATCH_SIZE", defaults.cluster_batch_size)
                .max(1),
            collaborator_timeout: Duration::from_millis(parse_or(
                &lookup,
                "COLLABORATOR_TIMEOUT_MS",
                5000u64,
            )),
            policy_path: lookup("POLICY_PATH").map(PathBuf::from),
            golden_set_path: lookup("GOLDEN_SET_PATH").map(PathBuf::from),
            intel_fixtures_path: lookup("INTEL_FIXTURES_PATH").map(PathBuf::from),
        })
    }

    /// Log the effective configuration with secrets omitted.
    pub fn log_redacted(&self) {
        info!(
            graph_backend = ?self.graph_backend,
            neo4j_uri = self.neo4j_uri.as_str(),
            neo4j_user = self.neo4j_user.as_str(),
            graph_batch_size = self.graph_batch_size,
            graph_flush_interval_ms = self.graph_flush_interval.as_millis() as u64,
            graph_flush_timeout_ms = self.graph_flush_timeout.as_millis() as u64,
            graph_queue_capacity = self.graph_queue_capacity,
            cluster_batch_size = self.cluster_batch_size,
            collaborator_timeout_ms = self.collaborator_timeout.as_millis() as u64,
            policy_path = ?self.policy_path,
            golden_set_path = ?self.golden_set_path,
            intel_fixtures_path = ?self.intel_fixtures_path,
            "Loaded configuration"
        );
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = raw.as_str(), "Unparseable config value, using default");
            default
        }),
        None => default,
    }
}
