use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dataset declares data to be cached: where it lives (mounts), how it
/// may be placed on nodes, and how its credentials are provided.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "orca.io",
    version = "v1alpha1",
    kind = "Dataset",
    plural = "datasets",
    namespaced,
    status = "DatasetStatus"
)]
pub struct DatasetSpec {
    /// Mount points to expose under the dataset root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,

    /// Mount options shared by every mount; a per-mount option with the
    /// same key takes precedence.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shared_options: BTreeMap<String, String>,

    /// Encrypted options shared by every mount.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_encrypt_options: Vec<EncryptOption>,

    /// Constrains which nodes may cache this dataset.
    pub node_affinity: Option<CacheableNodeAffinity>,

    /// Tolerations applied to every cache pod of this dataset.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<super::runtime::TolerationSpec>,

    /// Access modes of the generated volume (e.g. ReadOnlyMany).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,

    /// "exclusive" reserves cache nodes for this dataset, "share"
    /// allows co-location. Blank means exclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<String>,

    /// Where to restore a metadata backup from, either
    /// `pvc://<name>/<subpath>` or `local://<subpath>` plus a node name.
    pub data_restore_location: Option<DataRestoreLocation>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct Mount {
    /// Backing storage URI, e.g. `s3://bucket/dir`, `pvc://claim/sub`,
    /// `local:///mnt/data` or `https://host/path`.
    pub mount_point: String,

    /// Name of the mount; defaults to the dataset name for single-mount
    /// datasets.
    #[serde(default)]
    pub name: String,

    /// Plain mount options passed through to the cache runtime.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,

    /// Options whose values live in secrets (credentials).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encrypt_options: Vec<EncryptOption>,

    /// Alternative path under the dataset root; defaults to `/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default)]
    pub shared: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct EncryptOption {
    pub name: String,
    pub value_from: EncryptOptionSource,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct EncryptOptionSource {
    pub secret_key_ref: SecretKeySelector,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct DataRestoreLocation {
    /// `pvc://<pvcName>/<subpath>` or `local://<subpath>`.
    #[serde(default)]
    pub path: String,
    /// Required when `path` uses the `local://` scheme.
    #[serde(default)]
    pub node_name: String,
}

/// Mirror of the node-affinity tree of the pod spec, restricted to the
/// required term set the scheduler honors for cache workers.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct CacheableNodeAffinity {
    pub required: Option<NodeSelector>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct NodeSelector {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct NodeSelectorTerm {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct DatasetStatus {
    /// Total size of the backing storage: empty until the first
    /// metadata sync, `[Calculating]` while one is running, then a
    /// formatted byte size.
    #[serde(default)]
    pub ufs_total: String,

    /// Number of files in the backing storage, same lifecycle as
    /// `ufs_total`.
    #[serde(default)]
    pub file_num: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<DatasetPhase>,

    /// Flattened cache observability fields keyed by field name
    /// (cacheCapacity, cached, cacheHitRatio, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cache_states: BTreeMap<String, String>,

    /// Runtimes backing this dataset.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtimes: Vec<RuntimeRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<DatasetCondition>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum DatasetPhase {
    NotBound,
    Bound,
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct RuntimeRef {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub runtime_type: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct DatasetCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

impl Dataset {
    /// Placement defaults to exclusive when left blank.
    pub fn is_exclusive(&self) -> bool {
        !matches!(self.spec.placement.as_deref(), Some("share"))
    }
}
