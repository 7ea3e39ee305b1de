use anyhow::{Context, Result};
use neo4rs::{query, ConfigBuilder, Graph};
use tracing::info;

use phishvault_common::Config;

/// Rows pulled per round trip; projection batches are written, rarely read.
const FETCH_SIZE: usize = 200;
/// The projector is the only writer, so a small pool suffices.
const MAX_CONNECTIONS: usize = 4;

/// Connection to the Neo4j instance holding the threat graph.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    /// Connect and verify the server answers before any batch is queued, so
    /// a bad URI or credentials fail at startup instead of on first flush.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(FETCH_SIZE)
            .max_connections(MAX_CONNECTIONS)
            .build()
            .with_context(|| format!("invalid Neo4j settings for {uri}"))?;
        let graph = Graph::connect(config)
            .await
            .with_context(|| format!("connecting to Neo4j at {uri}"))?;
        graph
            .run(query("RETURN 1"))
            .await
            .with_context(|| format!("Neo4j at {uri} did not answer as user {user}"))?;

        info!(uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Connect with the `NEO4J_*` settings.
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await
    }

    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}
