use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// AlluxioRuntime declares the shape of one Alluxio cache cluster:
/// replica counts, tiered storage, per-component overrides and the
/// free-form engine property map.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "orca.io",
    version = "v1alpha1",
    kind = "AlluxioRuntime",
    plural = "alluxioruntimes",
    namespaced,
    status = "AlluxioRuntimeStatus"
)]
pub struct AlluxioRuntimeSpec {
    /// Desired number of cache workers.
    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub alluxio_version: VersionSpec,

    #[serde(default)]
    pub master: AlluxioCompTemplateSpec,

    #[serde(default)]
    pub job_master: AlluxioCompTemplateSpec,

    #[serde(default)]
    pub worker: AlluxioCompTemplateSpec,

    #[serde(default)]
    pub job_worker: AlluxioCompTemplateSpec,

    #[serde(default)]
    pub fuse: AlluxioFuseSpec,

    #[serde(default)]
    pub api_gateway: ApiGatewaySpec,

    #[serde(default)]
    pub tieredstore: TieredStore,

    /// Replication bound for cached data.
    #[serde(default)]
    pub data: DataSpec,

    /// Engine configuration knobs; always win over built-in defaults.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// JVM options shared by all components.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,

    /// Extra HDFS client configuration, named ConfigMap holding
    /// hdfs-site.xml/core-site.xml entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hadoop_config: Option<String>,

    /// Enables the scrape-target label on rendered workloads.
    #[serde(default)]
    pub monitoring: bool,

    /// Labels and annotations merged into every component pod.
    #[serde(default)]
    pub pod_metadata: PodMetadata,

    /// User the cache processes and fuse daemon run as; root when
    /// omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as: Option<UserSpec>,

    /// Opaque volumes handed through to the rendered workloads;
    /// referenced by name from component `volume_mounts`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Value>,

    #[serde(default)]
    pub management: RuntimeManagement,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct VersionSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(default)]
    pub image_pull_policy: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct AlluxioCompTemplateSpec {
    #[serde(default)]
    pub replicas: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Explicit port assignments, keyed by port role (rpc, web,
    /// embedded, data). Overrides pool allocation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, u16>,

    /// "HostNetwork" (default) or "ContainerNetwork".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMountSpec>,

    #[serde(default)]
    pub pod_metadata: PodMetadata,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct AlluxioFuseSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(default)]
    pub image_pull_policy: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Fully custom fuse launch arguments; when set, defaulting is
    /// bypassed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Deploy fuse on every eligible node rather than only where the
    /// application pods run.
    #[serde(default)]
    pub global: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMountSpec>,

    #[serde(default)]
    pub pod_metadata: PodMetadata,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct ApiGatewaySpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, u16>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct TieredStore {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<Level>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct Level {
    /// Storage medium: MEM, SSD or HDD.
    #[serde(default)]
    pub mediumtype: String,

    /// "hostPath" (persistent across pods) or "emptyDir" (ephemeral).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,

    /// Comma separated list of cache directories for this level.
    #[serde(default)]
    pub path: String,

    /// Quota applied to every directory of the level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<String>,

    /// Per-directory quotas; wins over `quota` when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_list: Option<String>,

    /// Eviction watermarks in [0, 1].
    #[serde(default)]
    pub high: String,
    #[serde(default)]
    pub low: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct DataSpec {
    #[serde(default)]
    pub replicas: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct UserSpec {
    pub uid: i64,
    pub gid: i64,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct ResourcesSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct VolumeMountSpec {
    pub name: String,
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct TolerationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct PodMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct RuntimeManagement {
    /// "None" disables the automatic metadata sync; anything else
    /// (including absence) keeps it on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_sync_policy: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct AlluxioRuntimeStatus {
    #[serde(default)]
    pub master_phase: RuntimePhase,
    #[serde(default)]
    pub worker_phase: RuntimePhase,
    #[serde(default)]
    pub fuse_phase: RuntimePhase,

    #[serde(default)]
    pub desired_master_number_scheduled: i32,
    #[serde(default)]
    pub master_number_ready: i32,
    #[serde(default)]
    pub desired_worker_number_scheduled: i32,
    #[serde(default)]
    pub worker_number_ready: i32,
    #[serde(default)]
    pub worker_number_available: i32,

    /// Flattened cache observability fields keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cache_states: BTreeMap<String, String>,

    /// When the cluster first reached Ready and mounts were applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_time: Option<String>,

    /// Name of the ConfigMap holding the rendered deployment values.
    #[serde(default)]
    pub value_file: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq,
)]
#[serde(rename_all = "PascalCase")]
pub enum RuntimePhase {
    #[default]
    None,
    NotReady,
    PartialReady,
    Ready,
}

impl AlluxioCompTemplateSpec {
    pub fn uses_host_network(&self) -> bool {
        !matches!(self.network_mode.as_deref(), Some("ContainerNetwork"))
    }
}

impl AlluxioFuseSpec {
    pub fn uses_host_network(&self) -> bool {
        !matches!(self.network_mode.as_deref(), Some("ContainerNetwork"))
    }
}

impl Level {
    /// emptyDir-backed levels are ephemeral: the cache path is not
    /// guaranteed to be the same file on master and worker pods.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self.volume_type.as_deref(), Some("emptyDir"))
    }
}
