//! Projector buffering and flush behavior against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use phishvault_common::ScanArtifact;
use phishvault_graph::{MemoryGraphStore, NodeLabel, Projector, ProjectorConfig, Relation};

fn config(batch_size: usize, flush_interval: Duration) -> ProjectorConfig {
    with_capacity(batch_size, flush_interval, 1024)
}

fn with_capacity(batch_size: usize, flush_interval: Duration, queue_capacity: usize) -> ProjectorConfig {
    ProjectorConfig {
        batch_size,
        flush_interval,
        flush_timeout: Duration::from_secs(5),
        queue_capacity,
    }
}

fn two_hop_artifact(id: &str) -> ScanArtifact {
    let mut a = ScanArtifact::new(id, "http://login.secure-update.com/signin");
    a.final_url = "http://phish-origin.xyz/bad".to_string();
    a.redirect_chain = vec![
        "http://bit.ly/short".to_string(),
        "http://relay.test/hop".to_string(),
    ];
    a
}

#[tokio::test]
async fn close_flushes_partial_batch_once() {
    let store = Arc::new(MemoryGraphStore::new());
    let projector = Projector::spawn(store.clone(), config(100, Duration::from_secs(60)));

    projector.project(&two_hop_artifact("scan-1"));
    assert_eq!(store.batch_count(), 0);

    projector.close().await;

    assert_eq!(store.batch_count(), 1);
    assert!(store.is_closed());

    let domains = store
        .nodes()
        .into_iter()
        .filter(|n| n.label == NodeLabel::Domain)
        .count();
    assert!(domains >= 4);

    let relations: Vec<Relation> = store.edges().into_iter().map(|e| e.relation).collect();
    assert_eq!(
        relations,
        vec![
            Relation::Captured,
            Relation::RedirectsTo,
            Relation::RedirectsTo,
            Relation::RedirectsTo,
        ]
    );
}

#[tokio::test]
async fn reaching_batch_size_triggers_a_flush() {
    let store = Arc::new(MemoryGraphStore::new());
    // One two-hop artifact yields 5 nodes.
    let projector = Projector::spawn(store.clone(), config(5, Duration::from_secs(60)));

    projector.project(&two_hop_artifact("scan-1"));
    // Barrier: the flush command queues behind the append.
    projector.flush().await;
    assert_eq!(store.batch_count(), 1);

    projector.close().await;
    // Nothing was left to flush on close.
    assert_eq!(store.batch_count(), 1);
}

#[tokio::test]
async fn flushing_an_empty_buffer_makes_no_store_call() {
    let store = Arc::new(MemoryGraphStore::new());
    let projector = Projector::spawn(store.clone(), config(10, Duration::from_secs(60)));

    projector.flush().await;
    projector.flush().await;
    projector.close().await;

    assert_eq!(store.batch_count(), 0);
    assert!(store.is_closed());
}

#[tokio::test]
async fn failed_flush_still_clears_the_buffer() {
    let store = Arc::new(MemoryGraphStore::new());
    store.fail_next(1);
    let projector = Projector::spawn(store.clone(), config(100, Duration::from_secs(60)));

    projector.project(&two_hop_artifact("scan-1"));
    projector.flush().await;
    assert_eq!(store.batch_count(), 0);

    projector.project(&two_hop_artifact("scan-2"));
    projector.close().await;

    // Only the second artifact reached the store; the first was not retried.
    let batches = store.batches();
    assert_eq!(batches.len(), 1);
    assert!(batches[0]
        .nodes
        .iter()
        .any(|n| n.label == NodeLabel::ScanArtifact && n.key == "scan-2"));
    assert!(!batches[0].nodes.iter().any(|n| n.key == "scan-1"));
}

#[tokio::test]
async fn periodic_timer_flushes_without_reaching_batch_size() {
    let store = Arc::new(MemoryGraphStore::new());
    let projector = Projector::spawn(store.clone(), config(100, Duration::from_millis(50)));

    projector.project(&two_hop_artifact("scan-1"));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.batch_count(), 1);

    projector.close().await;
    assert_eq!(store.batch_count(), 1);
}

// The default test runtime is single-threaded: the writer task cannot drain
// the queue until this test first yields.
#[tokio::test]
async fn full_queue_drops_new_projections() {
    let store = Arc::new(MemoryGraphStore::new());
    let projector = Projector::spawn(store.clone(), with_capacity(100, Duration::from_secs(60), 2));

    for i in 0..5 {
        projector.project(&two_hop_artifact(&format!("scan-{i}")));
    }
    projector.close().await;

    let scans: Vec<String> = store
        .nodes()
        .into_iter()
        .filter(|n| n.label == NodeLabel::ScanArtifact)
        .map(|n| n.key)
        .collect();
    assert_eq!(scans, vec!["scan-0", "scan-1"]);
}
