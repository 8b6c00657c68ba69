//! Roster core types: kind descriptors, the kind filter, instance identity.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod document;
pub mod error;

pub use document::{normalize, render, MANAGED_FIELDS};
pub use error::{DiscoveryError, SerializationError};

/// Group identifier discovery reports for the built-in, group-less API surface.
pub const CORE_GROUP_ID: &str = "v1";

/// A served resource kind as reported by discovery.
///
/// `group` is the raw discovery group identifier. For the core surface that is the
/// literal `"v1"`; call [`ResourceKindDescriptor::normalized`] before addressing the
/// control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceKindDescriptor {
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `pods`. Also the index key for the kind.
    pub resource: String,
    /// CamelCase type name, e.g. `Pod`.
    #[serde(default)]
    pub kind: String,
    pub namespaced: bool,
}

impl ResourceKindDescriptor {
    pub fn new(group: &str, version: &str, resource: &str, kind: &str, namespaced: bool) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            kind: kind.to_string(),
            namespaced,
        }
    }

    /// Apply the core-group rule: group `"v1"` becomes `""` with version `"v1"`.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        if out.group == CORE_GROUP_ID {
            out.version = CORE_GROUP_ID.to_string();
            out.group = String::new();
        }
        out
    }

    /// `apiVersion` string of the normalized descriptor (`v1`, `apps/v1`).
    pub fn api_version(&self) -> String {
        let n = self.normalized();
        if n.group.is_empty() { n.version } else { format!("{}/{}", n.group, n.version) }
    }

    /// Human key: `v1/pods`, `apps/v1/deployments`.
    pub fn gvr_key(&self) -> String {
        format!("{}/{}", self.api_version(), self.resource)
    }

    /// Subresources (`pods/log`, `deployments/scale`) carry a path separator.
    pub fn is_subresource(&self) -> bool {
        self.resource.contains('/')
    }
}

/// Kind filter: only namespaced, non-subresource kinds are indexed.
pub fn is_eligible(d: &ResourceKindDescriptor) -> bool {
    !d.is_subresource() && d.namespaced
}

/// Identity of an instance within its kind.
///
/// Names are only unique per namespace, so both parts are always part of the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    pub namespace: String,
    pub name: String,
}

impl InstanceKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self { namespace: namespace.to_string(), name: name.to_string() }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One listed instance: identity pulled out of `metadata`, plus the full document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceObject {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    /// Unix seconds from `metadata.creationTimestamp`, when present and parseable.
    pub creation_ts: Option<i64>,
    /// The whole document as returned by the server.
    pub raw: serde_json::Value,
}

impl ResourceObject {
    pub fn from_raw(raw: serde_json::Value) -> Self {
        let meta = raw.get("metadata");
        let name = meta.and_then(|m| m.get("name")).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let namespace = meta.and_then(|m| m.get("namespace")).and_then(|v| v.as_str()).map(|s| s.to_string());
        let labels = meta.and_then(|m| m.get("labels")).and_then(|v| v.as_object()).map(|lbls| {
            lbls.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect::<BTreeMap<_, _>>()
        });
        let creation_ts = meta
            .and_then(|m| m.get("creationTimestamp"))
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp());
        Self { name, namespace, labels, creation_ts, raw }
    }

    pub fn key(&self) -> InstanceKey {
        InstanceKey { namespace: self.namespace.clone().unwrap_or_default(), name: self.name.clone() }
    }
}
