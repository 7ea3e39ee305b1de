//! Graph projection of enriched scan artifacts.
//!
//! `decompose` turns one artifact into nodes and edges. The `Projector` owns
//! the buffers inside a single background task; appends, explicit flushes,
//! timer ticks and shutdown all arrive on one channel and are handled in
//! order, so size-triggered and periodic flushes never interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use phishvault_common::{extract_host, Config, EntityType, ScanArtifact};

use crate::model::{GraphEdge, GraphNode, NodeLabel, Relation};
use crate::store::GraphStore;

/// Upper bound on the confidence attached to a redirect hop.
const MAX_HOP_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// Flush once this many nodes are buffered.
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Bound on a single store write.
    pub flush_timeout: Duration,
    /// Appends queued ahead of the writer. Once full, new projections are
    /// dropped with a warning.
    pub queue_capacity: usize,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval: Duration::from_secs(2),
            flush_timeout: Duration::from_secs(10),
            queue_capacity: 1024,
        }
    }
}

impl From<&Config> for ProjectorConfig {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.graph_batch_size.max(1),
            flush_interval: config.graph_flush_interval,
            flush_timeout: config.graph_flush_timeout,
            queue_capacity: config.graph_queue_capacity.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Decomposition
// ---------------------------------------------------------------------------

/// Confidence of the redirect edge at `hop_index` (0-based).
pub fn hop_confidence(hop_index: usize) -> f64 {
    (0.5 + 0.1 * hop_index as f64).min(MAX_HOP_CONFIDENCE)
}

fn domain_node(host: &str, role: &str) -> GraphNode {
    GraphNode::new(NodeLabel::Domain, host).with("role", role)
}

fn domain_edge(source: &str, relation: Relation, target: &str) -> GraphEdge {
    GraphEdge::new(NodeLabel::Domain, source, relation, NodeLabel::Domain, target)
}

fn captured(scan_id: &str, host: &str) -> GraphEdge {
    GraphEdge::new(NodeLabel::ScanArtifact, scan_id, Relation::Captured, NodeLabel::Domain, host)
}

/// Decompose an artifact into graph primitives.
///
/// Edges come out in path order: `CAPTURED`, then one `REDIRECTS_TO` per hop,
/// then the closing hop to the origin (if any), then `PART_OF` and
/// `HOSTED_ON`.
pub fn decompose(artifact: &ScanArtifact) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    let verdict = artifact
        .verdict
        .map(|v| serde_json::Value::from(v.to_string()))
        .unwrap_or(serde_json::Value::Null);
    nodes.push(
        GraphNode::new(NodeLabel::ScanArtifact, &artifact.scan_id)
            .with("timestamp", artifact.timestamp.timestamp())
            .with("url", artifact.url.as_str())
            .with("source", artifact.ingestion_source.as_str())
            .with("verdict", verdict)
            .with("risk_score", artifact.risk_score),
    );

    // Hosts that could not be extracted are skipped; the first known host
    // on the path takes the CAPTURED edge.
    let mut previous: Option<String> = None;
    let lure = extract_host(&artifact.url);
    if !lure.is_empty() {
        nodes.push(domain_node(&lure, "Lure"));
        edges.push(captured(&artifact.scan_id, &lure));
        previous = Some(lure);
    }

    for (i, hop) in artifact.redirect_chain.iter().enumerate() {
        let host = extract_host(hop);
        if host.is_empty() {
            continue;
        }
        nodes.push(domain_node(&host, "Relay"));
        edges.push(match &previous {
            Some(prev) => domain_edge(prev, Relation::RedirectsTo, &host)
                .with("hop_index", i as u64)
                .with("confidence", hop_confidence(i)),
            None => captured(&artifact.scan_id, &host),
        });
        previous = Some(host);
    }

    let mut final_host = extract_host(&artifact.final_url);
    if final_host.is_empty() {
        final_host = previous.clone().unwrap_or_default();
    }
    if final_host.is_empty() {
        return (nodes, edges);
    }
    if previous.as_deref() != Some(final_host.as_str()) {
        nodes.push(domain_node(&final_host, "Origin"));
        edges.push(match &previous {
            Some(prev) => {
                domain_edge(prev, Relation::RedirectsTo, &final_host).with("terminal", true)
            }
            None => captured(&artifact.scan_id, &final_host),
        });
    }

    if let Some(campaign) = artifact.campaign_id.as_deref().filter(|c| !c.is_empty()) {
        nodes.push(
            GraphNode::new(NodeLabel::Campaign, campaign)
                .with("first_seen", artifact.timestamp.timestamp()),
        );
        edges.push(GraphEdge::new(
            NodeLabel::Domain,
            &final_host,
            Relation::PartOf,
            NodeLabel::Campaign,
            campaign,
        ));
    }

    for entity in artifact
        .entities
        .iter()
        .filter(|e| e.entity_type == EntityType::Asn)
    {
        nodes.push(GraphNode::new(NodeLabel::Asn, &entity.value));
        edges.push(GraphEdge::new(
            NodeLabel::Domain,
            &final_host,
            Relation::HostedOn,
            NodeLabel::Asn,
            &entity.value,
        ));
    }

    (nodes, edges)
}

// ---------------------------------------------------------------------------
// Projector actor
// ---------------------------------------------------------------------------

enum Command {
    Append {
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
    },
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Buffers projected artifacts and writes them to a [`GraphStore`] in batches.
pub struct Projector {
    tx: mpsc::Sender<Command>,
    worker: JoinHandle<()>,
}

impl Projector {
    /// Start the background flush task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn GraphStore>, config: ProjectorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = tokio::spawn(run(rx, store, config));
        Self { tx, worker }
    }

    /// Decompose `artifact` and buffer the result. Never blocks on the store;
    /// when the queue is full the projection is dropped.
    pub fn project(&self, artifact: &ScanArtifact) {
        let (nodes, edges) = decompose(artifact);
        match self.tx.try_send(Command::Append { nodes, edges }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(
                scan_id = artifact.scan_id.as_str(),
                capacity = self.tx.max_capacity(),
                "Projector queue full, dropping projection"
            ),
            Err(TrySendError::Closed(_)) => {
                warn!(scan_id = artifact.scan_id.as_str(), "Projector is stopped, dropping projection")
            }
        }
    }

    /// Flush whatever is buffered and wait for the store call to finish.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Stop the timer, flush the remaining buffer once and close the store.
    pub async fn close(self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Projector task ended abnormally");
        }
    }
}

#[derive(Default)]
struct Buffer {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

async fn run(
    mut rx: mpsc::Receiver<Command>,
    store: Arc<dyn GraphStore>,
    config: ProjectorConfig,
) {
    let mut buffer = Buffer::default();
    let mut ticker = time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Append { nodes, edges }) => {
                    buffer.nodes.extend(nodes);
                    buffer.edges.extend(edges);
                    if buffer.nodes.len() >= config.batch_size {
                        flush(&mut buffer, store.as_ref(), config.flush_timeout).await;
                    }
                }
                Some(Command::Flush(ack)) => {
                    flush(&mut buffer, store.as_ref(), config.flush_timeout).await;
                    let _ = ack.send(());
                }
                Some(Command::Shutdown(ack)) => {
                    shutdown(&mut buffer, store.as_ref(), config.flush_timeout).await;
                    let _ = ack.send(());
                    return;
                }
                // Every handle dropped without close().
                None => {
                    shutdown(&mut buffer, store.as_ref(), config.flush_timeout).await;
                    return;
                }
            },
            _ = ticker.tick() => {
                flush(&mut buffer, store.as_ref(), config.flush_timeout).await;
            }
        }
    }
}

async fn shutdown(buffer: &mut Buffer, store: &dyn GraphStore, timeout: Duration) {
    flush(buffer, store, timeout).await;
    if let Err(e) = store.close().await {
        warn!(error = %e, "Graph store close failed");
    }
    info!("Graph projector stopped");
}

/// At-most-once: the buffer is emptied before the write, whatever its outcome.
async fn flush(buffer: &mut Buffer, store: &dyn GraphStore, timeout: Duration) {
    if buffer.nodes.is_empty() && buffer.edges.is_empty() {
        return;
    }
    let nodes = std::mem::take(&mut buffer.nodes);
    let edges = std::mem::take(&mut buffer.edges);

    match time::timeout(timeout, store.execute_batch(&nodes, &edges)).await {
        Ok(Ok(())) => debug!(nodes = nodes.len(), edges = edges.len(), "Flushed graph batch"),
        Ok(Err(e)) => warn!(
            nodes = nodes.len(),
            edges = edges.len(),
            error = %e,
            "Graph batch write failed, batch dropped"
        ),
        Err(_) => warn!(
            nodes = nodes.len(),
            edges = edges.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Graph batch write timed out, batch dropped"
        ),
    }
}
