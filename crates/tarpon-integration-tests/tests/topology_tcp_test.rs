//! Cluster topology and module availability push over the TCP transport

use tarpon_api::PayloadCodec;
use tarpon_api::JsonPayloadCodec;
use tarpon_api::model::{ClusterNode, ModuleId};
use tarpon_api::protocol::{
    HEADER_CLUSTER_FORMED, HEADER_CLUSTER_NODES_ADDED, HEADER_CLUSTER_NODES_REMOVED,
    HEADER_CLUSTER_REMOVED, HEADER_CLUSTER_TOPOLOGY_COMPLETE, HEADER_MODULE_AVAILABLE,
    HEADER_MODULE_UNAVAILABLE,
};
use tarpon_integration_tests::{TestClient, start_test_server, unique_test_id};

fn node(name: &str) -> ClusterNode {
    ClusterNode {
        name: name.to_string(),
        address: format!("10.1.1.{}:4447", name.len()),
    }
}

#[tokio::test]
async fn test_complete_topology_precedes_incremental_updates() {
    let server = start_test_server().await;
    server
        .clusters
        .register_group("alpha", vec![node("a1"), node("a2")])
        .await;

    let mut client = TestClient::connect(server.addr).await;
    let (header, payload) = client.recv_frame().await;
    assert_eq!(header, HEADER_CLUSTER_TOPOLOGY_COMPLETE);
    let topology = JsonPayloadCodec.decode_cluster_topology(&payload).unwrap();
    assert_eq!(topology.clusters.len(), 1);
    assert_eq!(topology.clusters[0].group, "alpha");
    assert_eq!(topology.clusters[0].nodes.len(), 2);

    // a group registered after connect arrives as an incremental event
    server
        .clusters
        .register_group("beta", vec![node("b1")])
        .await;
    let payload = client.recv_frame_with_header(HEADER_CLUSTER_FORMED).await;
    let view = JsonPayloadCodec.decode_cluster_formed(&payload).unwrap();
    assert_eq!(view.group, "beta");
}

#[tokio::test]
async fn test_membership_change_sends_removed_then_added() {
    let server = start_test_server().await;
    let group = server
        .clusters
        .register_group("gamma", vec![node("g1"), node("g2")])
        .await;

    let mut client = TestClient::connect(server.addr).await;
    client
        .recv_frame_with_header(HEADER_CLUSTER_TOPOLOGY_COMPLETE)
        .await;

    // g2 leaves, g3 joins
    group.update_members(vec![node("g1"), node("g3")]).await;

    let removed = client
        .recv_frame_with_header(HEADER_CLUSTER_NODES_REMOVED)
        .await;
    let removed = JsonPayloadCodec.decode_cluster_membership(&removed).unwrap();
    assert_eq!(removed.group, "gamma");
    assert_eq!(removed.nodes.len(), 1);
    assert_eq!(removed.nodes[0].name, "g2");

    let added = client
        .recv_frame_with_header(HEADER_CLUSTER_NODES_ADDED)
        .await;
    let added = JsonPayloadCodec.decode_cluster_membership(&added).unwrap();
    assert_eq!(added.nodes.len(), 1);
    assert_eq!(added.nodes[0].name, "g3");
}

#[tokio::test]
async fn test_group_unregistered_sends_cluster_removed() {
    let server = start_test_server().await;
    server
        .clusters
        .register_group("delta", vec![node("d1")])
        .await;

    let mut client = TestClient::connect(server.addr).await;
    client
        .recv_frame_with_header(HEADER_CLUSTER_TOPOLOGY_COMPLETE)
        .await;

    assert!(server.clusters.unregister_group("delta").await);
    let payload = client.recv_frame_with_header(HEADER_CLUSTER_REMOVED).await;
    let removed = JsonPayloadCodec.decode_cluster_removed(&payload).unwrap();
    assert_eq!(removed.group, "delta");
}

#[tokio::test]
async fn test_availability_replay_and_updates() {
    let server = start_test_server().await;
    let preexisting = ModuleId::new(unique_test_id("app"), "orders");
    server.deployments.deploy(preexisting.clone()).await;

    let mut client = TestClient::connect(server.addr).await;
    let payload = client.recv_frame_with_header(HEADER_MODULE_AVAILABLE).await;
    let initial = JsonPayloadCodec.decode_module_availability(&payload).unwrap();
    assert_eq!(initial.modules, vec![preexisting.clone()]);

    let late = ModuleId::new(unique_test_id("app"), "billing");
    server.deployments.deploy(late.clone()).await;
    let payload = client.recv_frame_with_header(HEADER_MODULE_AVAILABLE).await;
    let deployed = JsonPayloadCodec.decode_module_availability(&payload).unwrap();
    assert_eq!(deployed.modules, vec![late.clone()]);

    server.deployments.undeploy(&late).await;
    let payload = client
        .recv_frame_with_header(HEADER_MODULE_UNAVAILABLE)
        .await;
    let undeployed = JsonPayloadCodec.decode_module_availability(&payload).unwrap();
    assert_eq!(undeployed.modules, vec![late]);
}

#[tokio::test]
async fn test_no_initial_availability_when_nothing_deployed() {
    let server = start_test_server().await;
    server
        .clusters
        .register_group("epsilon", vec![node("e1")])
        .await;

    let mut client = TestClient::connect(server.addr).await;
    // the first frame is the topology; no empty availability message precedes it
    let (header, _) = client.recv_frame().await;
    assert_eq!(header, HEADER_CLUSTER_TOPOLOGY_COMPLETE);
}
