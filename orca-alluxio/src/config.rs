use envconfig::Envconfig;

/// Engine-level environment configuration. One instance is loaded at
/// controller startup and shared by every engine the controller hosts.
#[derive(Envconfig, Clone, Debug)]
pub struct EngineConfig {
    /// Root working directory for journal backups produced by masters.
    /// Env: ORCA_WORKDIR
    #[envconfig(from = "ORCA_WORKDIR", default = "/tmp")]
    pub workdir: String,

    /// Host directory under which fuse mount points are created,
    /// laid out as `<mount_root>/<runtime-type>/<namespace>/<name>`.
    /// Env: ORCA_MOUNT_ROOT
    #[envconfig(from = "ORCA_MOUNT_ROOT", default = "/runtime-mnt")]
    pub mount_root: String,

    /// How non-native mounts reach the cluster: "configmap" ships
    /// rendered mount descriptors with the deployment, anything else
    /// leaves mounting to the post-start exec path.
    /// Env: ORCA_MOUNT_CONFIG_STORAGE
    #[envconfig(from = "ORCA_MOUNT_CONFIG_STORAGE", default = "configmap")]
    pub mount_config_storage: String,

    #[envconfig(nested)]
    pub image: ImageConfig,

    #[envconfig(nested)]
    pub sync: SyncConfig,
}

/// Built-in image defaults, overridable per runtime via the CRD.
#[derive(Envconfig, Clone, Debug)]
pub struct ImageConfig {
    #[envconfig(from = "ORCA_ALLUXIO_IMAGE", default = "alluxio/alluxio")]
    pub runtime_image: String,

    #[envconfig(from = "ORCA_ALLUXIO_IMAGE_TAG", default = "release-2.8.1-SNAPSHOT")]
    pub runtime_image_tag: String,

    #[envconfig(from = "ORCA_ALLUXIO_FUSE_IMAGE", default = "alluxio/alluxio-fuse")]
    pub fuse_image: String,

    #[envconfig(from = "ORCA_ALLUXIO_FUSE_IMAGE_TAG", default = "release-2.8.1-SNAPSHOT")]
    pub fuse_image_tag: String,

    #[envconfig(from = "ORCA_IMAGE_PULL_POLICY", default = "IfNotPresent")]
    pub pull_policy: String,
}

/// Knobs for the asynchronous status/metadata machinery.
#[derive(Envconfig, Clone, Debug)]
pub struct SyncConfig {
    /// Bounded wait applied when polling the in-flight metadata sync
    /// task so the reconcile loop is never stalled.
    /// Env: ORCA_METADATA_SYNC_POLL_TIMEOUT_MILLIS
    #[envconfig(from = "ORCA_METADATA_SYNC_POLL_TIMEOUT_MILLIS", default = "500")]
    pub metadata_poll_timeout_millis: u64,

    /// Minimum interval between two cache-hit metric queries, in
    /// minutes. Within the interval the last computed state is reused.
    /// Env: ORCA_CACHE_HIT_QUERY_INTERVAL_MIN
    #[envconfig(from = "ORCA_CACHE_HIT_QUERY_INTERVAL_MIN", default = "1")]
    pub cache_hit_query_interval_min: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workdir: "/tmp".into(),
            mount_root: "/runtime-mnt".into(),
            mount_config_storage: "configmap".into(),
            image: ImageConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            runtime_image: "alluxio/alluxio".into(),
            runtime_image_tag: "release-2.8.1-SNAPSHOT".into(),
            fuse_image: "alluxio/alluxio-fuse".into(),
            fuse_image_tag: "release-2.8.1-SNAPSHOT".into(),
            pull_policy: "IfNotPresent".into(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            metadata_poll_timeout_millis: 500,
            cache_hit_query_interval_min: 1.0,
        }
    }
}
