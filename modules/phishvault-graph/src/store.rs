use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use phishvault_common::{Config, GraphBackend};

use crate::model::{GraphEdge, GraphNode};
use crate::{GraphClient, Neo4jGraphStore};

/// Pluggable persistence for projected graph batches.
///
/// Writes are merge-style upserts: replaying the same node or edge key must
/// be harmless.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert one batch of nodes, then the edges between them.
    async fn execute_batch(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<()>;

    /// Release connections. Called once, after the final flush.
    async fn close(&self) -> Result<()>;
}

/// Build the store selected by `GRAPH_BACKEND`.
pub async fn graph_store_from_config(config: &Config) -> Result<Arc<dyn GraphStore>> {
    let store: Arc<dyn GraphStore> = match config.graph_backend {
        GraphBackend::Console => {
            info!("Graph backend: console");
            Arc::new(ConsoleGraphStore)
        }
        GraphBackend::Memory => {
            info!("Graph backend: in-memory");
            Arc::new(MemoryGraphStore::new())
        }
        GraphBackend::Neo4j => {
            let client = GraphClient::from_config(config).await?;
            info!(uri = config.neo4j_uri.as_str(), "Graph backend: neo4j");
            Arc::new(Neo4jGraphStore::new(client))
        }
    };
    Ok(store)
}

// ---------------------------------------------------------------------------
// ConsoleGraphStore
// ---------------------------------------------------------------------------

/// Logs each batch instead of persisting it.
pub struct ConsoleGraphStore;

#[async_trait]
impl GraphStore for ConsoleGraphStore {
    async fn execute_batch(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<()> {
        if nodes.is_empty() && edges.is_empty() {
            return Ok(());
        }
        info!(nodes = nodes.len(), edges = edges.len(), "Graph batch");
        if let Some(n) = nodes.first() {
            debug!(label = %n.label, key = n.key.as_str(), "Sample node: MERGE (n:{} {{key: '{}'}})", n.label, n.key);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryGraphStore
// ---------------------------------------------------------------------------

/// One `execute_batch` call as received.
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Records every batch in memory. Can be told to fail the next N writes.
#[derive(Default)]
pub struct MemoryGraphStore {
    batches: Mutex<Vec<RecordedBatch>>,
    failures_remaining: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` writes (the batch is not recorded).
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Every recorded node, in write order.
    pub fn nodes(&self) -> Vec<GraphNode> {
        self.batches().into_iter().flat_map(|b| b.nodes).collect()
    }

    /// Every recorded edge, in write order.
    pub fn edges(&self) -> Vec<GraphEdge> {
        self.batches().into_iter().flat_map(|b| b.edges).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn execute_batch(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<()> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            anyhow::bail!("memory store: injected write failure");
        }

        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedBatch {
                nodes: nodes.to_vec(),
                edges: edges.to_vec(),
            });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeLabel;

    #[tokio::test]
    async fn memory_store_records_batches_in_order() {
        let store = MemoryGraphStore::new();
        store
            .execute_batch(&[GraphNode::new(NodeLabel::Domain, "a.test")], &[])
            .await
            .unwrap();
        store
            .execute_batch(&[GraphNode::new(NodeLabel::Domain, "b.test")], &[])
            .await
            .unwrap();

        let keys: Vec<String> = store.nodes().into_iter().map(|n| n.key).collect();
        assert_eq!(keys, vec!["a.test", "b.test"]);
        assert_eq!(store.batch_count(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryGraphStore::new();
        store.fail_next(1);
        let node = GraphNode::new(NodeLabel::Domain, "a.test");

        assert!(store.execute_batch(&[node.clone()], &[]).await.is_err());
        assert!(store.execute_batch(&[node], &[]).await.is_ok());
        assert_eq!(store.batch_count(), 1);
    }

    #[tokio::test]
    async fn factory_builds_memory_backend_without_network() {
        let config = Config {
            graph_backend: GraphBackend::Memory,
            ..Config::default()
        };
        let store = graph_store_from_config(&config).await.unwrap();
        store.execute_batch(&[], &[]).await.unwrap();
        store.close().await.unwrap();
    }
}
