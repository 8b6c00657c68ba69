//! Roster store: the frozen two-level resource index.
//!
//! Built once from fetch results, then only read. There is no mutation API, so
//! an `Arc<ResourceIndex>` can be shared across any number of readers.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use metrics::gauge;
use roster_core::{InstanceKey, ResourceObject};
use rustc_hash::FxHashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("unknown kind: {0}")]
    UnknownKind(String),
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: InstanceKey },
}

/// kind (`resource` plural) -> (namespace, name) -> object.
#[derive(Debug, Default)]
pub struct ResourceIndex {
    kinds: FxHashMap<String, FxHashMap<InstanceKey, ResourceObject>>,
}

impl ResourceIndex {
    /// Index every instance under its kind. A kind with no instances is still
    /// recorded, which is what separates "empty" from "never indexed".
    pub fn build<I>(kind_to_instances: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<ResourceObject>)>,
    {
        let mut kinds: FxHashMap<String, FxHashMap<InstanceKey, ResourceObject>> = FxHashMap::default();
        for (kind, objects) in kind_to_instances {
            let bucket = kinds.entry(kind).or_default();
            for obj in objects {
                bucket.insert(obj.key(), obj);
            }
        }
        let me = Self { kinds };
        gauge!("roster_objects_indexed", me.object_count() as f64);
        debug!(kinds = me.kinds.len(), objects = me.object_count(), "index built");
        me
    }

    pub fn kinds(&self) -> BTreeSet<String> {
        self.kinds.keys().cloned().collect()
    }

    pub fn contains_kind(&self, kind: &str) -> bool { self.kinds.contains_key(kind) }

    /// Keys of all instances of `kind`, sorted by namespace then name.
    pub fn instance_keys(&self, kind: &str) -> Result<Vec<InstanceKey>, IndexError> {
        let bucket = self.kinds.get(kind).ok_or_else(|| IndexError::UnknownKind(kind.to_string()))?;
        let mut keys: Vec<InstanceKey> = bucket.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    pub fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<&ResourceObject, IndexError> {
        let bucket = self.kinds.get(kind).ok_or_else(|| IndexError::UnknownKind(kind.to_string()))?;
        let key = InstanceKey::new(namespace, name);
        match bucket.get(&key) {
            Some(obj) => Ok(obj),
            None => Err(IndexError::NotFound { kind: kind.to_string(), key }),
        }
    }

    pub fn kind_count(&self) -> usize { self.kinds.len() }

    pub fn object_count(&self) -> usize { self.kinds.values().map(|b| b.len()).sum() }
}
