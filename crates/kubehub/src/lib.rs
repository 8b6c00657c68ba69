//! Roster kubehub: kind catalog discovery and the build-phase listing fan-out.
//!
//! The control plane is reached through two seams, [`Catalog`] and [`Lister`].
//! [`KubeHub`] implements both on top of a `kube::Client`; tests plug in memory
//! implementations.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::StreamExt;
use metrics::{counter, histogram};
use roster_core::{is_eligible, DiscoveryError, ResourceKindDescriptor, ResourceObject};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

mod hub;

pub use hub::{descriptors_from_list, KubeHub};

/// Reports which resource kinds the control plane serves.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn enumerate_kinds(&self) -> Result<Vec<ResourceKindDescriptor>, DiscoveryError>;
}

/// Lists every instance of one kind across all namespaces.
///
/// Callers pass an already normalized descriptor.
#[async_trait::async_trait]
pub trait Lister: Send + Sync {
    async fn list_all(&self, gvr: &ResourceKindDescriptor) -> Result<Vec<ResourceObject>>;
}

/// Build-phase tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchConfig {
    /// Listing calls in flight at once.
    pub concurrency: usize,
    /// Upper bound for one kind's listing call.
    pub timeout: Duration,
}

pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

impl Default for FetchConfig {
    fn default() -> Self {
        Self { concurrency: DEFAULT_FETCH_CONCURRENCY, timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS) }
    }
}

impl FetchConfig {
    pub fn new(concurrency: usize, timeout_secs: u64) -> Self {
        Self { concurrency: concurrency.max(1), timeout: Duration::from_secs(timeout_secs.max(1)) }
    }

    /// Read `ROSTER_FETCH_CONCURRENCY` / `ROSTER_FETCH_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Self {
        let concurrency = std::env::var("ROSTER_FETCH_CONCURRENCY").ok().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_FETCH_CONCURRENCY);
        let timeout_secs = std::env::var("ROSTER_FETCH_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        Self::new(concurrency, timeout_secs)
    }
}

/// Outcome of fetching one kind. `objects` is empty when `error` is set.
#[derive(Debug, Clone)]
pub struct KindFetch {
    pub descriptor: ResourceKindDescriptor,
    pub objects: Vec<ResourceObject>,
    pub error: Option<String>,
}

impl KindFetch {
    pub fn failed(&self) -> bool { self.error.is_some() }
}

/// Select the descriptors worth fetching: eligible kinds, one per `resource` name.
///
/// The index is keyed by `resource`, so when several groups serve the same plural
/// (core `events` and `events.k8s.io`), the first one in catalog order wins.
pub fn plan_fetches(catalog: &[ResourceKindDescriptor]) -> Vec<ResourceKindDescriptor> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for d in catalog.iter().filter(|d| is_eligible(d)) {
        if !seen.insert(d.resource.as_str()) {
            debug!(gvr = %d.gvr_key(), "duplicate resource name; keeping earlier group");
            continue;
        }
        out.push(d.clone());
    }
    out
}

/// Fetch all instances of one kind. Never fails: errors and timeouts are logged and
/// yield zero instances so the rest of the build can proceed.
pub async fn fetch_all(lister: &dyn Lister, descriptor: &ResourceKindDescriptor, timeout: Duration) -> KindFetch {
    let gvr = descriptor.normalized();
    let t0 = Instant::now();
    let res = match tokio::time::timeout(timeout, lister.list_all(&gvr)).await {
        Ok(r) => r,
        Err(_) => Err(anyhow::anyhow!("listing timed out after {:?}", timeout)),
    };
    match res {
        Ok(objects) => {
            debug!(gvr = %gvr.gvr_key(), items = objects.len(), took_ms = %t0.elapsed().as_millis(), "list ok");
            KindFetch { descriptor: descriptor.clone(), objects, error: None }
        }
        Err(e) => {
            warn!(kind = %gvr.resource, gvr = %gvr.gvr_key(), error = %format!("{:#}", e), "listing failed; kind left empty");
            counter!("roster_fetch_failures_total", 1, "kind" => gvr.resource.clone());
            KindFetch { descriptor: descriptor.clone(), objects: Vec::new(), error: Some(format!("{:#}", e)) }
        }
    }
}

/// Run [`fetch_all`] for every planned descriptor with at most `cfg.concurrency`
/// calls in flight. Resolves only once every kind has an outcome; results keep
/// the order of `plan`.
pub async fn fetch_catalog(lister: &dyn Lister, plan: &[ResourceKindDescriptor], cfg: &FetchConfig) -> Vec<KindFetch> {
    let t0 = Instant::now();
    let timeout = cfg.timeout;
    let mut results: Vec<(usize, KindFetch)> = futures::stream::iter(plan.iter().enumerate())
        .map(|(i, d)| async move { (i, fetch_all(lister, d, timeout).await) })
        .buffer_unordered(cfg.concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|(i, _)| *i);
    let failed = results.iter().filter(|(_, f)| f.failed()).count();
    let took = t0.elapsed();
    histogram!("roster_fetch_ms", took.as_secs_f64() * 1000.0);
    info!(kinds = plan.len(), failed, took_ms = %took.as_millis(), "fetch fan-out done");
    results.into_iter().map(|(_, f)| f).collect()
}
