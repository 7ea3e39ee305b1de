//! Test utilities for spinning up a real Neo4j instance via testcontainers.

use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use crate::{GraphClient, Neo4jGraphStore};

/// Spin up a Neo4j container (auth `neo4j` / `test`) and return the handle
/// plus its bolt URI.
///
/// The container is stopped when `ContainerAsync` is dropped, so callers must
/// hold it for the duration of the test.
pub async fn neo4j_server() -> (ContainerAsync<GenericImage>, String) {
    let image = GenericImage::new("neo4j", "5.25.1-community")
        .with_exposed_port(ContainerPort::Tcp(7687))
        .with_wait_for(WaitFor::message_on_stdout("Started."))
        .with_env_var("NEO4J_AUTH", "neo4j/test");

    let container: ContainerAsync<GenericImage> = image
        .start()
        .await
        .expect("Failed to start Neo4j container");

    let host_port = container
        .get_host_port_ipv4(7687)
        .await
        .expect("Failed to get Neo4j host port");

    (container, format!("bolt://127.0.0.1:{host_port}"))
}

/// Same as [`neo4j_server`], with a connected client.
pub async fn neo4j_container() -> (ContainerAsync<GenericImage>, GraphClient) {
    let (container, uri) = neo4j_server().await;
    let client = GraphClient::connect(&uri, "neo4j", "test")
        .await
        .expect("Failed to connect to Neo4j");
    (container, client)
}

/// Same as [`neo4j_container`], wrapped as a graph store.
pub async fn neo4j_store() -> (ContainerAsync<GenericImage>, GraphClient, Neo4jGraphStore) {
    let (container, client) = neo4j_container().await;
    let store = Neo4jGraphStore::new(client.clone());
    (container, client, store)
}
