//! Satchel core types: the ResourceSet object model shared by the
//! admission and codec crates.

#![forbid(unsafe_code)]

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::{Deserialize, Serialize};

/// Annotation key recording whether a referenced resource's payload is
/// gzip-compressed. Wire values are the literal strings `"true"` and
/// `"false"`; an absent annotation reads as `false`.
pub const COMPRESSED_ANNOTATION: &str = "resourcesets.satchel.dev/compressed-data";

/// Reconciliation strategy for a ResourceSet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Apply each referenced resource to a matching target exactly once.
    ApplyOnce,
    /// Deprecated legacy name for [`Strategy::Reconcile`]; defaulting
    /// rewrites it away, so it only survives in already-persisted objects.
    ApplyAlways,
    /// Continuously re-apply referenced resources to matching targets.
    Reconcile,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::ApplyOnce => "ApplyOnce",
            Strategy::ApplyAlways => "ApplyAlways",
            Strategy::Reconcile => "Reconcile",
        }
    }
}

/// Reference to a resource carried by a ResourceSet. Kind and name only;
/// admission does not validate these beyond deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSetSpec {
    /// Label selector for the targets this set applies to. Must be
    /// well-formed and non-empty at creation; immutable afterwards.
    pub cluster_selector: LabelSelector,
    /// Unset on the wire means "not chosen yet"; defaulting fills it in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    /// Ordered list of referenced resources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceRef>,
}

/// The aggregation object validated by the admission crate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSet {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: ResourceSetSpec,
}

/// The closed set of resource kinds whose payload the codec understands.
///
/// Each kind maps to the object field holding its payload map. Adding a
/// kind means adding a variant here; the exhaustive matches below make the
/// compiler point at every site that needs updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    ConfigMap,
    Secret,
}

impl PayloadKind {
    /// Exact kind-name lookup; `None` for anything outside the closed set.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "ConfigMap" => Some(PayloadKind::ConfigMap),
            "Secret" => Some(PayloadKind::Secret),
            _ => None,
        }
    }

    /// Object field that holds the payload map for this kind.
    pub const fn data_field(self) -> &'static str {
        match self {
            PayloadKind::ConfigMap => "binaryData",
            PayloadKind::Secret => "data",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PayloadKind::ConfigMap => "ConfigMap",
            PayloadKind::Secret => "Secret",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_wire_names_are_exact() {
        assert_eq!(serde_json::to_value(Strategy::ApplyOnce).unwrap(), "ApplyOnce");
        assert_eq!(serde_json::to_value(Strategy::ApplyAlways).unwrap(), "ApplyAlways");
        assert_eq!(serde_json::to_value(Strategy::Reconcile).unwrap(), "Reconcile");
        let s: Strategy = serde_json::from_str("\"Reconcile\"").unwrap();
        assert_eq!(s, Strategy::Reconcile);
    }

    #[test]
    fn spec_omits_unset_strategy() {
        let spec = ResourceSetSpec::default();
        let v = serde_json::to_value(&spec).unwrap();
        assert!(v.get("strategy").is_none());
        assert!(v.get("clusterSelector").is_some());
    }

    #[test]
    fn payload_kind_lookup_and_fields() {
        assert_eq!(PayloadKind::from_kind("ConfigMap"), Some(PayloadKind::ConfigMap));
        assert_eq!(PayloadKind::from_kind("Secret"), Some(PayloadKind::Secret));
        assert_eq!(PayloadKind::from_kind("Foobar"), None);
        assert_eq!(PayloadKind::ConfigMap.data_field(), "binaryData");
        assert_eq!(PayloadKind::Secret.data_field(), "data");
    }
}
