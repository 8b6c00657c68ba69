use std::time::Instant;

use anyhow::{Context, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::{
    api::{Api, ListParams},
    core::{ApiResource, DynamicObject},
    Client,
};
use metrics::gauge;
use roster_core::{DiscoveryError, ResourceKindDescriptor, ResourceObject};
use tracing::{debug, info, warn};

use crate::{Catalog, Lister};

/// Control-plane access over an already authenticated `kube::Client`.
#[derive(Clone)]
pub struct KubeHub {
    client: Client,
}

impl KubeHub {
    pub fn new(client: Client) -> Self { Self { client } }

    /// Client from the ambient kubeconfig or in-cluster service account.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.context("building kube client")?;
        Ok(Self { client })
    }
}

/// Turn one discovery resource list into descriptors.
///
/// The group is taken verbatim from the list's group-version string, so the core
/// list (`"v1"`) yields raw group `"v1"`; normalization happens at fetch time.
pub fn descriptors_from_list(list: &APIResourceList) -> Result<Vec<ResourceKindDescriptor>, DiscoveryError> {
    let gv = list.group_version.as_str();
    if gv.is_empty() {
        return Err(DiscoveryError::Malformed("resource list without groupVersion".into()));
    }
    let (group, list_version) = match gv.split_once('/') {
        Some((g, v)) if !g.is_empty() && !v.is_empty() => (g, v),
        Some(_) => return Err(DiscoveryError::Malformed(format!("invalid groupVersion: {}", gv))),
        // core surface: the whole string is the group identifier
        None => (gv, ""),
    };
    let mut out = Vec::with_capacity(list.resources.len());
    for ar in &list.resources {
        if ar.name.is_empty() {
            return Err(DiscoveryError::Malformed(format!("unnamed resource in {}", gv)));
        }
        let version = ar.version.as_deref().filter(|v| !v.is_empty()).unwrap_or(list_version);
        out.push(ResourceKindDescriptor {
            group: group.to_string(),
            version: version.to_string(),
            resource: ar.name.clone(),
            kind: ar.kind.clone(),
            namespaced: ar.namespaced,
        });
    }
    Ok(out)
}

fn api_resource(gvr: &ResourceKindDescriptor) -> ApiResource {
    ApiResource {
        group: gvr.group.clone(),
        version: gvr.version.clone(),
        api_version: gvr.api_version(),
        kind: gvr.kind.clone(),
        plural: gvr.resource.clone(),
    }
}

#[async_trait::async_trait]
impl Catalog for KubeHub {
    async fn enumerate_kinds(&self) -> Result<Vec<ResourceKindDescriptor>, DiscoveryError> {
        let t0 = Instant::now();
        let mut out = Vec::new();

        let core = self.client.list_core_api_versions().await.map_err(|e| DiscoveryError::unreachable("/api", e))?;
        for v in &core.versions {
            let list = self
                .client
                .list_core_api_resources(v)
                .await
                .map_err(|e| DiscoveryError::unreachable(format!("/api/{}", v), e))?;
            out.extend(descriptors_from_list(&list)?);
        }

        let groups = self.client.list_api_groups().await.map_err(|e| DiscoveryError::unreachable("/apis", e))?;
        for g in &groups.groups {
            let Some(gv) = g.preferred_version.as_ref().or_else(|| g.versions.first()) else {
                debug!(group = %g.name, "group without versions; skipping");
                continue;
            };
            // an unavailable or garbled group drops only itself; the core list stays strict
            let list = match self.client.list_api_group_resources(&gv.group_version).await {
                Ok(list) => list,
                Err(e) => {
                    warn!(gv = %gv.group_version, error = %e, "group discovery failed; skipping group");
                    continue;
                }
            };
            match descriptors_from_list(&list) {
                Ok(found) => out.extend(found),
                Err(e) => warn!(gv = %gv.group_version, error = %e, "group resource list malformed; skipping group"),
            }
        }

        if out.is_empty() {
            return Err(DiscoveryError::Malformed("server reported no resources".into()));
        }
        gauge!("roster_kinds_discovered", out.len() as f64);
        info!(kinds = out.len(), took_ms = %t0.elapsed().as_millis(), "discovery ok");
        Ok(out)
    }
}

#[async_trait::async_trait]
impl Lister for KubeHub {
    async fn list_all(&self, gvr: &ResourceKindDescriptor) -> Result<Vec<ResourceObject>> {
        let ar = api_resource(gvr);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let list = api.list(&ListParams::default()).await.with_context(|| format!("listing {}", gvr.gvr_key()))?;
        let mut out = Vec::with_capacity(list.items.len());
        for obj in list.items {
            let mut raw = serde_json::to_value(&obj).context("serializing DynamicObject")?;
            // list items usually come back without type meta
            if let Some(map) = raw.as_object_mut() {
                map.entry("apiVersion").or_insert_with(|| ar.api_version.clone().into());
                map.entry("kind").or_insert_with(|| ar.kind.clone().into());
            }
            out.push(ResourceObject::from_raw(raw));
        }
        Ok(out)
    }
}
