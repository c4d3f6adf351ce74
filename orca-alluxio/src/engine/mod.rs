//! The Alluxio engine: translates a `Dataset` + `AlluxioRuntime` pair
//! into a fully-resolved deployment configuration, refreshes cache
//! observability state from the running cluster's report output, and
//! drives scale-down and asynchronous metadata sync.

pub mod cache;
pub mod error;
pub mod metadata;
pub mod ops;
pub mod ports;
pub mod report;
pub mod scale;
pub mod setup;
pub mod shutdown;
pub mod status;
pub mod transform;
pub mod ufs;
pub mod units;
pub mod value;

use std::sync::Arc;

use crate::client::{
    CommandRunner, ObjectStore, PortPool, ReleaseManager, SecretStore,
};
use crate::config::EngineConfig;
use crate::crd::{AlluxioRuntime, Dataset};
use crate::engine::error::Result;

pub use cache::{CacheHitStates, CacheStates};
pub use error::EngineError;
pub use metadata::SyncTask;

pub const RUNTIME_TYPE: &str = "alluxio";

/// Label carried by rendered workloads when monitoring is enabled.
pub const RUNTIME_METRICS_LABEL: &str = "alluxio_runtime_metrics";

/// In-container directory aggregating non-native mounts when the
/// dataset has zero or multiple of them.
pub const LOCAL_STORAGE_DIRECTORY: &str = "/underFSStorage";

/// One engine instance exists per dataset/runtime pair and lives in the
/// hosting controller's cache of active resources. The reconcile loop
/// calls it one operation at a time; the only internal concurrency is
/// the metadata sync background task.
pub struct AlluxioEngine {
    pub name: String,
    pub namespace: String,
    pub config: EngineConfig,

    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) releases: Arc<dyn ReleaseManager>,
    pub(crate) port_pool: Arc<dyn PortPool>,
    pub(crate) secrets: Arc<dyn SecretStore>,

    /// Last computed hit-ratio snapshot, reused within the minimum
    /// query interval and on fetch failure.
    pub(crate) last_cache_hit_states: Option<CacheHitStates>,

    /// At most one metadata sync task is in flight at any time.
    pub(crate) sync_task: SyncTask,

    pub(crate) retry_shutdown: u32,
    pub(crate) graceful_shutdown_limits: u32,
}

impl AlluxioEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        config: EngineConfig,
        store: Arc<dyn ObjectStore>,
        runner: Arc<dyn CommandRunner>,
        releases: Arc<dyn ReleaseManager>,
        port_pool: Arc<dyn PortPool>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            config,
            store,
            runner,
            releases,
            port_pool,
            secrets,
            last_cache_hit_states: None,
            sync_task: SyncTask::Idle,
            retry_shutdown: 0,
            graceful_shutdown_limits: 3,
        }
    }

    pub(crate) async fn dataset(&self) -> Result<Dataset> {
        Ok(self.store.get_dataset(&self.namespace, &self.name).await?)
    }

    pub(crate) async fn runtime(&self) -> Result<AlluxioRuntime> {
        Ok(self.store.get_runtime(&self.namespace, &self.name).await?)
    }

    // ---- workload and object names -------------------------------------

    pub fn master_statefulset_name(&self) -> String {
        format!("{}-master", self.name)
    }

    pub fn worker_statefulset_name(&self) -> String {
        format!("{}-worker", self.name)
    }

    /// Pod and container the operational CLI runs in.
    pub fn master_pod_info(&self) -> (String, String) {
        (format!("{}-master-0", self.name), "alluxio-master".to_string())
    }

    /// ConfigMap holding the rendered deployment values; read back by
    /// the port-release path.
    pub fn values_config_map_name(&self) -> String {
        format!("{}-{}-values", self.name, RUNTIME_TYPE)
    }

    /// Journal backup archive written next to (and restored from) the
    /// backup root.
    pub fn metadata_backup_file_name(&self) -> String {
        format!("metadata-backup-{}-{}.tar.gz", self.name, self.namespace)
    }

    /// Sidecar file recording the backing-storage totals captured at
    /// backup time.
    pub fn metadata_info_file_name(&self) -> String {
        format!("{}-{}.yaml", self.name, self.namespace)
    }

    pub fn config_map_name(&self) -> String {
        format!("{}-config", self.name)
    }

    /// Host directory backing the fuse mount point.
    pub fn mount_path(&self) -> String {
        format!(
            "{}/{}/{}/{}/alluxio-fuse",
            self.config.mount_root, RUNTIME_TYPE, self.namespace, self.name
        )
    }

    // ---- node label names ----------------------------------------------

    /// Generic "this node serves this dataset" label.
    pub fn common_label_name(&self) -> String {
        format!("orca.io/s-{}-{}", self.namespace, self.name)
    }

    /// Runtime-typed assignment label.
    pub fn runtime_label_name(&self) -> String {
        format!("orca.io/s-{}-{}-{}", RUNTIME_TYPE, self.namespace, self.name)
    }

    /// Human-readable storage contribution labels; `kind` is one of
    /// `t` (total), `m` (memory), `d` (disk).
    pub fn storage_label_name(&self, kind: &str) -> String {
        format!(
            "orca.io/s-h-{}-{}-{}-{}",
            RUNTIME_TYPE, kind, self.namespace, self.name
        )
    }

    /// Shared counter of datasets served by a node.
    pub fn dataset_num_label_name(&self) -> &'static str {
        "orca.io/dataset-num"
    }

    pub fn exclusive_label_name(&self) -> &'static str {
        "orca.io/exclusive"
    }

    pub fn exclusive_label_value(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }

    /// Mounted-as-root storage location inside the cluster: a single
    /// non-native mount becomes the root itself, anything else is
    /// aggregated under the fixed local directory.
    pub fn root_ufs(&self, dataset: &Dataset) -> String {
        let non_native: Vec<_> = dataset
            .spec
            .mounts
            .iter()
            .filter(|m| !transform::mounts::is_native_scheme(&m.mount_point))
            .collect();
        if non_native.len() == 1 && dataset.spec.mounts.len() == 1 {
            non_native[0].mount_point.clone()
        } else {
            LOCAL_STORAGE_DIRECTORY.to_string()
        }
    }
}
