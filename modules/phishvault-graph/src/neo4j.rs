//! Neo4j-backed graph store.
//!
//! Each batch is grouped by node label and by (source label, relation,
//! target label), then written with one `UNWIND ... MERGE` query per group.
//! Nodes are keyed on the `key` property, so replays are idempotent.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
};
use tracing::{debug, warn};

use crate::model::{GraphEdge, GraphNode, NodeLabel, Properties, Relation};
use crate::store::GraphStore;
use crate::GraphClient;

pub struct Neo4jGraphStore {
    client: GraphClient,
}

impl Neo4jGraphStore {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    async fn merge_nodes(&self, label: NodeLabel, nodes: &[&GraphNode]) -> Result<()> {
        let rows: Vec<BoltType> = nodes
            .iter()
            .map(|n| row(vec![("key", bolt_str(&n.key)), ("props", props_to_bolt(&n.properties))]))
            .collect();

        let q = query(&format!(
            "UNWIND $rows AS row
             MERGE (n:{label} {{key: row.key}})
             SET n += row.props"
        ))
        .param("rows", rows);

        let mut stream = self.client.graph.execute(q).await?;
        while stream.next().await?.is_some() {}
        Ok(())
    }

    async fn merge_edges(
        &self,
        (source, relation, target): (NodeLabel, Relation, NodeLabel),
        edges: &[&GraphEdge],
    ) -> Result<()> {
        let rows: Vec<BoltType> = edges
            .iter()
            .map(|e| {
                row(vec![
                    ("src", bolt_str(&e.source_key)),
                    ("tgt", bolt_str(&e.target_key)),
                    ("props", props_to_bolt(&e.properties)),
                ])
            })
            .collect();

        let q = query(&format!(
            "UNWIND $rows AS row
             MATCH (a:{source} {{key: row.src}})
             MATCH (b:{target} {{key: row.tgt}})
             MERGE (a)-[r:{relation}]->(b)
             SET r += row.props"
        ))
        .param("rows", rows);

        let mut stream = self.client.graph.execute(q).await?;
        while stream.next().await?.is_some() {}
        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn execute_batch(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<()> {
        if nodes.is_empty() && edges.is_empty() {
            return Ok(());
        }

        let mut by_label: BTreeMap<NodeLabel, Vec<&GraphNode>> = BTreeMap::new();
        for n in nodes {
            by_label.entry(n.label).or_default().push(n);
        }
        for (label, group) in &by_label {
            self.merge_nodes(*label, group)
                .await
                .with_context(|| format!("merging {} {label} nodes", group.len()))?;
        }

        let mut by_shape: BTreeMap<(NodeLabel, Relation, NodeLabel), Vec<&GraphEdge>> =
            BTreeMap::new();
        for e in edges {
            by_shape
                .entry((e.source_label, e.relation, e.target_label))
                .or_default()
                .push(e);
        }
        // An edge group failing (e.g. an endpoint missing) does not undo the nodes.
        for (shape, group) in &by_shape {
            if let Err(e) = self.merge_edges(*shape, group).await {
                warn!(relation = %shape.1, count = group.len(), error = %e, "Failed to merge edges");
            }
        }

        debug!(nodes = nodes.len(), edges = edges.len(), "Neo4j batch written");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // neo4rs releases pooled connections on drop.
        Ok(())
    }
}

fn bolt_str(s: &str) -> BoltType {
    BoltType::String(BoltString::from(s))
}

fn row(fields: Vec<(&str, BoltType)>) -> BoltType {
    BoltType::Map(BoltMap::from_iter(
        fields.into_iter().map(|(k, v)| (BoltString::from(k), v)),
    ))
}

fn props_to_bolt(props: &Properties) -> BoltType {
    BoltType::Map(BoltMap::from_iter(
        props.iter().map(|(k, v)| (BoltString::from(k.as_str()), json_to_bolt(v))),
    ))
}

/// Convert a JSON property value into its Bolt equivalent.
pub fn json_to_bolt(value: &serde_json::Value) -> BoltType {
    use serde_json::Value;

    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => bolt_str(s),
        Value::Array(items) => {
            BoltType::List(BoltList::from(items.iter().map(json_to_bolt).collect::<Vec<_>>()))
        }
        Value::Object(map) => BoltType::Map(BoltMap::from_iter(
            map.iter().map(|(k, v)| (BoltString::from(k.as_str()), json_to_bolt(v))),
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_scalars_map_to_bolt_scalars() {
        assert!(matches!(json_to_bolt(&json!("x")), BoltType::String(_)));
        assert!(matches!(json_to_bolt(&json!(3)), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(&json!(0.5)), BoltType::Float(_)));
        assert!(matches!(json_to_bolt(&json!(true)), BoltType::Boolean(_)));
        assert!(matches!(json_to_bolt(&json!(null)), BoltType::Null(_)));
    }

    #[test]
    fn json_containers_map_to_bolt_containers() {
        assert!(matches!(json_to_bolt(&json!(["a", 1])), BoltType::List(_)));
        assert!(matches!(json_to_bolt(&json!({"a": 1})), BoltType::Map(_)));
    }
}
