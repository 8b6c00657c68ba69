//! Roster public API façade (in-process).
//!
//! Frontends (HTTP, CLI) depend on [`InventoryApi`]. [`bootstrap`] runs the build
//! phase exactly once and hands back a [`QueryService`] that owns the frozen index;
//! nothing in the serve phase can reach the control plane again.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use metrics::{gauge, histogram};
use roster_core::{normalize, render, InstanceKey, ResourceObject, SerializationError};
use roster_kubehub::{fetch_catalog, plan_fetches, Catalog, FetchConfig, Lister};
use roster_store::{IndexError, ResourceIndex};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub use roster_kubehub::KubeHub;

/// API errors. Frontends map `NotFound` to a not-found response and everything else
/// to an internal error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RosterError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("discovery: {0}")]
    Discovery(String),
}

pub type RosterResult<T> = Result<T, RosterError>;

impl From<IndexError> for RosterError {
    fn from(e: IndexError) -> Self { RosterError::NotFound(e.to_string()) }
}

impl From<SerializationError> for RosterError {
    fn from(e: SerializationError) -> Self { RosterError::Internal(e.to_string()) }
}

/// Read-only query surface over the inventory.
pub trait InventoryApi: Send + Sync {
    /// Indexed kinds, sorted.
    fn list_kinds(&self) -> Vec<String>;

    /// `(namespace, name)` of every instance of `kind`. Empty for a kind whose
    /// listing failed; `NotFound` for a kind that was never indexed.
    fn list_instances(&self, kind: &str) -> RosterResult<Vec<InstanceKey>>;

    /// One instance with managed fields stripped.
    fn get_instance(&self, kind: &str, namespace: &str, name: &str) -> RosterResult<ResourceObject>;

    /// One instance rendered as YAML, managed fields stripped.
    fn get_instance_detail(&self, kind: &str, namespace: &str, name: &str) -> RosterResult<String> {
        let obj = self.get_instance(kind, namespace, name)?;
        Ok(render(&obj)?)
    }
}

/// Serves queries from an immutable [`ResourceIndex`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueryService {
    index: Arc<ResourceIndex>,
}

impl QueryService {
    pub fn new(index: ResourceIndex) -> Self { Self { index: Arc::new(index) } }

    pub fn index(&self) -> &ResourceIndex { &self.index }
}

impl InventoryApi for QueryService {
    fn list_kinds(&self) -> Vec<String> {
        self.index.kinds().into_iter().collect()
    }

    fn list_instances(&self, kind: &str) -> RosterResult<Vec<InstanceKey>> {
        Ok(self.index.instance_keys(kind)?)
    }

    fn get_instance(&self, kind: &str, namespace: &str, name: &str) -> RosterResult<ResourceObject> {
        let obj = self.index.get(kind, namespace, name)?;
        Ok(normalize(obj))
    }
}

/// What the build phase saw.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildReport {
    /// Kinds reported by discovery, before filtering.
    pub discovered: usize,
    /// Kinds that passed the filter and were fetched.
    pub eligible: usize,
    /// Kinds whose listing succeeded.
    pub fetched: usize,
    /// Kinds whose listing failed; indexed with zero instances.
    pub failed: Vec<String>,
    pub objects: usize,
    pub took_ms: u64,
}

/// Build phase: discover, filter, fetch, index. Runs once.
///
/// Discovery failure aborts; a failing kind only empties that kind.
pub async fn bootstrap(catalog: &dyn Catalog, lister: &dyn Lister, cfg: &FetchConfig) -> RosterResult<(QueryService, BuildReport)> {
    let t0 = Instant::now();
    info!(concurrency = cfg.concurrency, timeout_ms = %cfg.timeout.as_millis(), "api: build start");
    let discovered = catalog.enumerate_kinds().await.map_err(|e| {
        error!(error = %e, "api: discovery failed");
        RosterError::Discovery(e.to_string())
    })?;
    let plan = plan_fetches(&discovered);
    gauge!("roster_kinds_eligible", plan.len() as f64);
    info!(discovered = discovered.len(), eligible = plan.len(), "api: catalog filtered");

    let results = fetch_catalog(lister, &plan, cfg).await;
    let failed: Vec<String> = results.iter().filter(|f| f.failed()).map(|f| f.descriptor.resource.clone()).collect();
    if !failed.is_empty() {
        warn!(failed = %failed.join(","), "api: some kinds could not be listed");
    }
    let index = ResourceIndex::build(results.into_iter().map(|f| (f.descriptor.resource, f.objects)));

    let took = t0.elapsed();
    let report = BuildReport {
        discovered: discovered.len(),
        eligible: plan.len(),
        fetched: plan.len() - failed.len(),
        failed,
        objects: index.object_count(),
        took_ms: took.as_millis() as u64,
    };
    histogram!("roster_build_ms", took.as_secs_f64() * 1000.0);
    info!(kinds = index.kind_count(), objects = report.objects, failed = report.failed.len(), took_ms = report.took_ms, "api: build ok");
    Ok((QueryService::new(index), report))
}
