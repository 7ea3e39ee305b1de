pub mod client;
pub mod model;
pub mod neo4j;
pub mod projector;
pub mod store;
#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use model::{GraphEdge, GraphNode, NodeLabel, Properties, Relation};
pub use neo4j::Neo4jGraphStore;
pub use projector::{decompose, Projector, ProjectorConfig};
pub use store::{graph_store_from_config, ConsoleGraphStore, GraphStore, MemoryGraphStore};
