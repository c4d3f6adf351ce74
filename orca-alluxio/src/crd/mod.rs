pub mod dataset;
pub mod runtime;

pub use dataset::{
    CacheableNodeAffinity, Dataset, DatasetCondition, DatasetPhase,
    DatasetSpec, DatasetStatus, EncryptOption, Mount, RuntimeRef,
};
pub use runtime::{
    AlluxioCompTemplateSpec, AlluxioFuseSpec, AlluxioRuntime,
    AlluxioRuntimeSpec, AlluxioRuntimeStatus, ApiGatewaySpec, Level,
    ResourcesSpec, RuntimePhase, TieredStore, TolerationSpec, UserSpec,
    VersionSpec, VolumeMountSpec,
};

/// Sentinel stored in `Dataset.status.ufs_total` while the asynchronous
/// metadata sync is still running.
pub const METADATA_SYNC_NOT_DONE_MSG: &str = "[Calculating]";
