//! End-to-end tenant object scenarios
//!
//! One class, three tenants, one object per tenant: every tenant's shard
//! must show exactly one object in the cluster status.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tenant_store::{
    ApiServer, ApiServerConfig, Class, ClusterStatus, Coordinator, DataType, NewObject, NodeInfo,
    RestRouter, StoreConfig,
};
use tokio::net::TcpListener;
use tower::ServiceExt;

const CLASS: &str = "MultiTenantClass";
const TENANTS: [&str; 3] = ["Tenant1", "Tenant2", "Tenant3"];

fn tenant_class() -> Class {
    Class::new(CLASS)
        .with_property("tenantName", DataType::Text)
        .with_multi_tenancy("tenantName")
}

fn tenant_names() -> Vec<String> {
    TENANTS.iter().map(|t| t.to_string()).collect()
}

fn assert_one_object_per_tenant(status: &ClusterStatus) {
    let shards: Vec<_> = status.nodes.iter().flat_map(|n| n.shards.iter()).collect();
    assert_eq!(shards.len(), TENANTS.len());

    let names: BTreeSet<&str> = shards.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, TENANTS.iter().copied().collect());

    for shard in shards {
        assert_eq!(shard.class, CLASS);
        assert_eq!(shard.object_count, 1, "shard {} should hold one object", shard.name);
    }
}

#[tokio::test]
async fn test_single_node_tenant_objects() {
    let coordinator = Coordinator::single_node("node-1").unwrap();
    coordinator.create_class(tenant_class()).await.unwrap();

    let outcomes = coordinator.create_tenants(CLASS, &tenant_names()).await.unwrap();
    assert!(outcomes.iter().all(|o| o.is_ok()));

    for tenant in TENANTS {
        let object = NewObject::new().with_property("tenantName", tenant);
        coordinator.write_object(CLASS, object).await.unwrap();
    }

    let status = coordinator.cluster_status(None).await.unwrap();
    assert_eq!(status.nodes.len(), 1);
    assert_eq!(status.nodes[0].name, "node-1");
    assert_eq!(status.nodes[0].stats.shard_count, 3);
    assert_eq!(status.nodes[0].stats.object_count, 3);
    assert!(!status.degraded);
    assert_one_object_per_tenant(&status);
}

async fn call(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_tenant_objects_over_rest() {
    let app = RestRouter::new(Coordinator::single_node("node-1").unwrap()).build();

    let class = json!({
        "class": CLASS,
        "properties": [{"name": "tenantName", "dataType": "text"}],
        "multiTenancyConfig": {"enabled": true, "tenantKey": "tenantName"}
    });
    let (status, _) = call(&app, "POST", "/v1/schema", Some(class)).await;
    assert_eq!(status, StatusCode::CREATED);

    let tenants: Vec<Value> = TENANTS.iter().map(|t| json!({"name": t})).collect();
    let uri = format!("/v1/schema/{}/tenants", CLASS);
    let (status, body) = call(&app, "POST", &uri, Some(Value::Array(tenants))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().iter().all(|r| r["created"] == true));

    for tenant in TENANTS {
        let object = json!({"class": CLASS, "properties": {"tenantName": tenant}});
        let (status, body) = call(&app, "POST", "/v1/objects", Some(object)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["class"], CLASS);
    }

    // A tenant that was never created is rejected
    let stray = json!({"class": CLASS, "properties": {"tenantName": "Tenant4"}});
    let (status, _) = call(&app, "POST", "/v1/objects", Some(stray)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "GET", "/v1/nodes", None).await;
    assert_eq!(status, StatusCode::OK);
    let report: ClusterStatus = serde_json::from_value(body).unwrap();
    assert_eq!(report.nodes.len(), 1);
    assert_one_object_per_tenant(&report);
}

async fn spawn_node(coordinator: Arc<Coordinator>) -> (Arc<ApiServer>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let server = Arc::new(ApiServer::new(ApiServerConfig::default(), coordinator));
    let running = server.clone();
    tokio::spawn(async move { running.serve(listener).await });
    (server, url)
}

#[tokio::test]
async fn test_two_node_cluster_over_http() {
    let node_2 = Coordinator::single_node("node-2").unwrap();
    let (server_2, url_2) = spawn_node(node_2.clone()).await;

    let node_1 = Coordinator::new(StoreConfig {
        node_name: "node-1".to_string(),
        peers: vec![NodeInfo::new("node-2").with_address(url_2)],
        ..Default::default()
    })
    .unwrap();

    node_1.create_class(tenant_class()).await.unwrap();
    let outcomes = node_1.create_tenants(CLASS, &tenant_names()).await.unwrap();
    assert!(outcomes.iter().all(|o| o.is_ok()));

    // Round-robin placement spreads the tenants over both nodes
    let tenants = node_1.list_tenants(CLASS).unwrap();
    let owners: BTreeSet<&str> = tenants.iter().map(|t| t.node.as_str()).collect();
    assert_eq!(owners, ["node-1", "node-2"].into_iter().collect());
    assert!(node_2.store().shard_count() > 0);

    let mut ids = Vec::new();
    for tenant in TENANTS {
        let object = NewObject::new().with_property("tenantName", tenant);
        ids.push((tenant, node_1.write_object(CLASS, object).await.unwrap()));
    }

    // Reads of remotely owned objects go through the peer
    for (tenant, id) in ids {
        let object = node_1.get_object(CLASS, id, Some(tenant)).await.unwrap();
        assert_eq!(object.tenant.as_deref(), Some(tenant));
    }

    let status = node_1.cluster_status(Some(CLASS)).await.unwrap();
    assert_eq!(status.nodes.len(), 2);
    assert!(status.node("node-1").is_some());
    assert!(status.node("node-2").is_some());
    assert_one_object_per_tenant(&status);

    // Deleting the class clears the peer's shards too
    node_1.delete_class(CLASS).await.unwrap();
    assert_eq!(node_2.store().shard_count(), 0);

    server_2.shutdown();
}

#[tokio::test]
async fn test_remote_tenant_with_reserved_url_characters() {
    let node_2 = Coordinator::single_node("node-2").unwrap();
    let (server_2, url_2) = spawn_node(node_2.clone()).await;

    let node_1 = Coordinator::new(StoreConfig {
        node_name: "node-1".to_string(),
        peers: vec![NodeInfo::new("node-2").with_address(url_2)],
        ..Default::default()
    })
    .unwrap();
    node_1.create_class(tenant_class()).await.unwrap();

    let names = vec!["a".to_string(), "team/x".to_string()];
    let outcomes = node_1.create_tenants(CLASS, &names).await.unwrap();
    assert!(outcomes.iter().all(|o| o.is_ok()));

    let tenants = node_1.list_tenants(CLASS).unwrap();
    let remote = tenants.iter().find(|t| t.name == "team/x").unwrap();
    assert_eq!(remote.node, "node-2");

    let object = NewObject::new().with_property("tenantName", "team/x");
    let id = node_1.write_object(CLASS, object).await.unwrap();
    let stored = node_1.get_object(CLASS, id, Some("team/x")).await.unwrap();
    assert_eq!(stored.tenant.as_deref(), Some("team/x"));

    let status = node_1.cluster_status(Some(CLASS)).await.unwrap();
    let shard = &status.node("node-2").unwrap().shards[0];
    assert_eq!(shard.name, "team/x");
    assert_eq!(shard.object_count, 1);

    let outcomes = node_1
        .delete_tenants(CLASS, &["team/x".to_string()])
        .await
        .unwrap();
    assert!(outcomes[0].is_ok());
    assert_eq!(node_2.store().shard_count(), 0);
    let remaining: Vec<_> = node_1
        .list_tenants(CLASS)
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(remaining, vec!["a"]);

    server_2.shutdown();
}
