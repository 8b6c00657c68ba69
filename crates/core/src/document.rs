//! Document normalizer: strip server bookkeeping, render to YAML.

use crate::{ResourceObject, SerializationError};

/// Server-side apply provenance under `metadata`. High churn, never useful to readers.
pub const MANAGED_FIELDS: &str = "managedFields";

fn strip_managed_fields(v: &mut serde_json::Value) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove(MANAGED_FIELDS);
        }
    }
}

/// Copy of `obj` without `metadata.managedFields`. The indexed original is left intact.
pub fn normalize(obj: &ResourceObject) -> ResourceObject {
    let mut out = obj.clone();
    strip_managed_fields(&mut out.raw);
    out
}

/// Render a normalized document as YAML.
///
/// Mapping keys come out sorted, so output is stable across calls and re-parseable.
pub fn render(obj: &ResourceObject) -> Result<String, SerializationError> {
    Ok(serde_yaml::to_string(&obj.raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod() -> ResourceObject {
        ResourceObject::from_raw(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "x",
                "namespace": "ns-a",
                "managedFields": [{ "manager": "kubectl", "operation": "Update" }],
                "labels": { "app": "x" }
            },
            "spec": { "containers": [{ "name": "c", "image": "busybox" }] }
        }))
    }

    #[test]
    fn normalize_drops_managed_fields_only() {
        let original = pod();
        let n = normalize(&original);
        assert!(n.raw["metadata"].get(MANAGED_FIELDS).is_none());
        assert_eq!(n.raw["metadata"]["labels"]["app"], "x");
        assert_eq!(n.raw["spec"], original.raw["spec"]);
        // source object untouched
        assert!(original.raw["metadata"].get(MANAGED_FIELDS).is_some());
    }

    #[test]
    fn normalize_tolerates_missing_metadata() {
        let o = ResourceObject::from_raw(json!({ "spec": {} }));
        assert_eq!(normalize(&o).raw, json!({ "spec": {} }));
    }

    #[test]
    fn render_is_stable_and_reparseable() {
        let n = normalize(&pod());
        let a = render(&n).expect("render");
        let b = render(&n).expect("render");
        assert_eq!(a, b);
        assert!(!a.contains(MANAGED_FIELDS));
        let back: serde_json::Value = serde_yaml::from_str(&a).expect("parse");
        assert_eq!(back, n.raw);
    }
}
