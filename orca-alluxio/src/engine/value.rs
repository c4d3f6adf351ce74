//! The fully-resolved deployment configuration handed to the release
//! manager and persisted in the values ConfigMap. Field names serialize
//! camelCase to stay byte-compatible with the chart values the
//! port-release path parses back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::crd::dataset::CacheableNodeAffinity;
use crate::crd::{ResourcesSpec, TolerationSpec, VolumeMountSpec};

fn is_zero(port: &u16) -> bool {
    *port == 0
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlluxioValue {
    pub fullname_override: String,

    pub image: String,
    pub image_tag: String,
    pub image_pull_policy: String,

    pub user: i64,
    pub group: i64,
    pub fs_group: i64,

    /// Engine property map. Stage 1 of the pipeline initializes it and
    /// every later stage assumes it is present.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,

    pub master: MasterValue,
    pub job_master: JobMasterValue,
    pub worker: WorkerValue,
    pub job_worker: JobWorkerValue,
    pub fuse: FuseValue,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_gateway: Option<ApiGatewayValue>,

    pub tieredstore: TieredStoreValue,
    pub journal: JournalValue,
    pub short_circuit: ShortCircuitValue,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub monitoring: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<TolerationSpec>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub placement: String,

    /// Host-path mounts surfaced by `local://` dataset mounts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ufs_paths: Vec<UfsPath>,

    /// Claim-backed mounts surfaced by `pvc://` dataset mounts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ufs_volumes: Vec<UfsVolume>,

    /// Present only when at least one host-path mount exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<CacheableNodeAffinity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hadoop_config: Option<HadoopConfigValue>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MasterValue {
    pub replicas: i32,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    pub ports: MasterPorts,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub backup_path: String,

    pub restore: RestoreValue,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    pub host_network: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMountSpec>,

    /// Rendered descriptors of the non-native mounts applied at
    /// startup when mounts are shipped via ConfigMap.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub non_native_mounts: Vec<NonNativeMount>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerValue {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    pub ports: WorkerPorts,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    pub host_network: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMountSpec>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobMasterValue {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    pub ports: JobMasterPorts,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobWorkerValue {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    pub ports: JobWorkerPorts,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FuseValue {
    pub image: String,
    pub image_tag: String,
    pub image_pull_policy: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub mount_path: String,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    pub host_network: bool,
    pub global: bool,
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMountSpec>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiGatewayValue {
    pub enabled: bool,
    pub ports: ApiGatewayPorts,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MasterPorts {
    pub rpc: u16,
    pub web: u16,
    #[serde(skip_serializing_if = "is_zero")]
    pub embedded: u16,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerPorts {
    pub rpc: u16,
    pub web: u16,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobMasterPorts {
    pub rpc: u16,
    pub web: u16,
    #[serde(skip_serializing_if = "is_zero")]
    pub embedded: u16,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobWorkerPorts {
    pub rpc: u16,
    pub web: u16,
    pub data: u16,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiGatewayPorts {
    pub rest: u16,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreValue {
    pub enabled: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pvc_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TieredStoreValue {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<LevelValue>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LevelValue {
    pub alias: String,
    pub level: i32,
    #[serde(rename = "type")]
    pub volume_type: String,
    pub path: String,
    pub mediumtype: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub quota: String,
    pub high: String,
    pub low: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JournalValue {
    pub volume_type: String,
    pub size: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShortCircuitValue {
    pub enable: bool,
    pub policy: String,
    pub volume_type: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UfsPath {
    pub name: String,
    pub host_path: String,
    pub container_path: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UfsVolume {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sub_path: String,
    pub container_path: String,
}

/// One non-native mount as applied at master startup.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NonNativeMount {
    pub name: String,
    pub mount_point: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    pub read_only: bool,
    pub shared: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HadoopConfigValue {
    pub config_map: String,
    pub include_hdfs_site: bool,
    pub include_core_site: bool,
}

impl AlluxioValue {
    pub fn new(fullname_override: impl Into<String>) -> Self {
        Self {
            fullname_override: fullname_override.into(),
            ..Default::default()
        }
    }
}
