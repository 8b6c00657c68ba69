#![forbid(unsafe_code)]

use std::sync::Mutex;

use roster_api::{bootstrap, InventoryApi, RosterError};
use roster_core::{DiscoveryError, InstanceKey, ResourceKindDescriptor, ResourceObject};
use roster_kubehub::{Catalog, FetchConfig, Lister};
use serde_json::json;

struct FakeCluster {
    kinds: Vec<ResourceKindDescriptor>,
    fail_discovery: bool,
    failing: Vec<&'static str>,
    objects: Vec<(&'static str, serde_json::Value)>,
    listed: Mutex<Vec<String>>,
}

impl FakeCluster {
    fn new(kinds: Vec<ResourceKindDescriptor>) -> Self {
        Self { kinds, fail_discovery: false, failing: Vec::new(), objects: Vec::new(), listed: Mutex::new(Vec::new()) }
    }

    fn with(mut self, resource: &'static str, raw: serde_json::Value) -> Self {
        self.objects.push((resource, raw));
        self
    }
}

#[async_trait::async_trait]
impl Catalog for FakeCluster {
    async fn enumerate_kinds(&self) -> Result<Vec<ResourceKindDescriptor>, DiscoveryError> {
        if self.fail_discovery {
            return Err(DiscoveryError::unreachable("/api", std::io::Error::other("connection refused")));
        }
        Ok(self.kinds.clone())
    }
}

#[async_trait::async_trait]
impl Lister for FakeCluster {
    async fn list_all(&self, gvr: &ResourceKindDescriptor) -> anyhow::Result<Vec<ResourceObject>> {
        self.listed.lock().unwrap().push(gvr.gvr_key());
        if self.failing.contains(&gvr.resource.as_str()) {
            anyhow::bail!("503 service unavailable");
        }
        Ok(self
            .objects
            .iter()
            .filter(|(r, _)| *r == gvr.resource)
            .map(|(_, raw)| ResourceObject::from_raw(raw.clone()))
            .collect())
    }
}

fn pod(ns: &str, name: &str, image: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": ns,
            "managedFields": [{ "manager": "kube-controller-manager", "operation": "Update" }]
        },
        "spec": { "containers": [{ "name": "main", "image": image }] }
    })
}

fn catalog() -> Vec<ResourceKindDescriptor> {
    vec![
        ResourceKindDescriptor::new("v1", "", "pods", "Pod", true),
        ResourceKindDescriptor::new("v1", "", "nodes", "Node", false),
        ResourceKindDescriptor::new("v1", "", "pods/log", "Pod", true),
    ]
}

#[tokio::test]
async fn only_namespaced_top_level_kinds_are_indexed() {
    let cluster = FakeCluster::new(catalog()).with("pods", pod("ns-a", "x", "nginx"));
    let (svc, report) = bootstrap(&cluster, &cluster, &FetchConfig::default()).await.expect("build");
    assert_eq!(svc.list_kinds(), vec!["pods".to_string()]);
    assert_eq!(report.discovered, 3);
    assert_eq!(report.eligible, 1);
    assert_eq!(report.objects, 1);
    // the core group was addressed as group-less v1
    assert_eq!(*cluster.listed.lock().unwrap(), vec!["v1/pods".to_string()]);
}

#[tokio::test]
async fn failed_kind_is_listed_but_empty() {
    let mut cluster = FakeCluster::new(vec![
        ResourceKindDescriptor::new("v1", "", "pods", "Pod", true),
        ResourceKindDescriptor::new("apps", "v1", "deployments", "Deployment", true),
    ])
    .with("deployments", json!({ "metadata": { "name": "web", "namespace": "shop" } }));
    cluster.failing.push("pods");

    let (svc, report) = bootstrap(&cluster, &cluster, &FetchConfig::default()).await.expect("build survives");
    assert_eq!(svc.list_kinds(), vec!["deployments".to_string(), "pods".to_string()]);
    assert_eq!(svc.list_instances("pods"), Ok(Vec::new()));
    assert_eq!(svc.list_instances("deployments"), Ok(vec![InstanceKey::new("shop", "web")]));
    assert_eq!(report.failed, vec!["pods".to_string()]);
    assert_eq!(report.fetched, 1);
}

#[tokio::test]
async fn never_discovered_kind_is_not_found() {
    let cluster = FakeCluster::new(catalog());
    let (svc, _) = bootstrap(&cluster, &cluster, &FetchConfig::default()).await.expect("build");
    assert!(matches!(svc.list_instances("services"), Err(RosterError::NotFound(_))));
    // filtered-out kinds were never indexed either
    assert!(matches!(svc.list_instances("nodes"), Err(RosterError::NotFound(_))));
}

#[tokio::test]
async fn same_name_across_namespaces_yields_distinct_documents() {
    let cluster = FakeCluster::new(catalog())
        .with("pods", pod("ns-a", "x", "nginx"))
        .with("pods", pod("ns-b", "x", "redis"));
    let (svc, _) = bootstrap(&cluster, &cluster, &FetchConfig::default()).await.expect("build");

    let a = svc.get_instance_detail("pods", "ns-a", "x").expect("ns-a");
    let b = svc.get_instance_detail("pods", "ns-b", "x").expect("ns-b");
    assert_ne!(a, b);
    assert!(a.contains("nginx"));
    assert!(b.contains("redis"));
    assert_eq!(
        svc.list_instances("pods").expect("pods"),
        vec![InstanceKey::new("ns-a", "x"), InstanceKey::new("ns-b", "x")]
    );
}

#[tokio::test]
async fn detail_never_contains_managed_fields() {
    let cluster = FakeCluster::new(catalog()).with("pods", pod("ns-a", "x", "nginx"));
    let (svc, _) = bootstrap(&cluster, &cluster, &FetchConfig::default()).await.expect("build");
    for _ in 0..2 {
        let text = svc.get_instance_detail("pods", "ns-a", "x").expect("detail");
        assert!(!text.contains("managedFields"));
        assert!(!text.contains("kube-controller-manager"));
        assert!(text.contains("name: x"));
    }
    assert!(matches!(svc.get_instance_detail("pods", "ns-a", "missing"), Err(RosterError::NotFound(_))));
}

#[tokio::test]
async fn discovery_failure_aborts_the_build() {
    let mut cluster = FakeCluster::new(catalog());
    cluster.fail_discovery = true;
    let err = bootstrap(&cluster, &cluster, &FetchConfig::default()).await.expect_err("must fail");
    assert!(matches!(err, RosterError::Discovery(_)));
    assert!(cluster.listed.lock().unwrap().is_empty());
}
