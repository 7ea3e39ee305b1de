//! Campaign clustering engine: buffers feature vectors and runs DBSCAN over
//! each full batch. Clusters never span batches.

pub mod dbscan;

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

pub use dbscan::{distance, run_dbscan, Cluster, DbscanParams, FeatureVector};

pub struct ClusterEngine {
    buffer: Mutex<Vec<FeatureVector>>,
    batch_size: usize,
    params: DbscanParams,
}

impl ClusterEngine {
    pub fn new(batch_size: usize) -> Self {
        Self::with_params(batch_size, DbscanParams::default())
    }

    pub fn with_params(batch_size: usize, params: DbscanParams) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            buffer: Mutex::new(Vec::with_capacity(batch_size)),
            batch_size,
            params,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Buffer one vector. When the buffer reaches the batch size its contents
    /// are taken under the lock and clustered on the calling thread; the
    /// resulting clusters are returned (empty otherwise).
    pub fn add(&self, vector: FeatureVector) -> Vec<Cluster> {
        let batch = {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            buffer.push(vector);
            if buffer.len() < self.batch_size {
                return Vec::new();
            }
            std::mem::take(&mut *buffer)
        };
        self.cluster(batch)
    }

    /// Cluster whatever is buffered, full batch or not. No-op when empty.
    pub fn drain(&self) -> Vec<Cluster> {
        let batch = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        if batch.is_empty() {
            debug!("Cluster drain on empty buffer");
            return Vec::new();
        }
        self.cluster(batch)
    }

    fn cluster(&self, batch: Vec<FeatureVector>) -> Vec<Cluster> {
        let clusters = run_dbscan(&batch, &self.params);
        let clustered: usize = clusters.iter().map(|c| c.members.len()).sum();
        info!(
            points = batch.len(),
            clusters = clusters.len(),
            noise = batch.len() - clustered,
            "Clustering pass complete"
        );
        for cluster in &clusters {
            info!(
                cluster_id = cluster.id,
                size = cluster.members.len(),
                members = ?cluster.member_ids(),
                "Campaign cluster"
            );
        }
        clusters
    }
}
