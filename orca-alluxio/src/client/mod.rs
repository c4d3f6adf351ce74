//! Collaborator interfaces the engine consumes. Everything that talks
//! to the cluster control plane, executes commands inside pods, or
//! manages templated releases lives behind one of these traits; the
//! engine itself only transforms data.

pub mod retry;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::crd::{AlluxioRuntime, Dataset};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Optimistic-concurrency failure: the object changed between the
    /// read and the write. Retried locally, never surfaced raw.
    #[error("conflict writing {0}")]
    Conflict(String),

    #[error("object store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Observed state of a stateful workload (master statefulset, worker
/// statefulset), reduced to the counters the engine needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub replicas: i32,
    pub ready_replicas: i32,
}

/// Typed access to cluster objects with optimistic-concurrency update
/// semantics: updates fail with [`StoreError::Conflict`] on stale reads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_dataset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Dataset, StoreError>;

    async fn update_dataset_status(
        &self,
        dataset: &Dataset,
    ) -> Result<(), StoreError>;

    async fn get_runtime(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<AlluxioRuntime, StoreError>;

    async fn update_runtime_status(
        &self,
        runtime: &AlluxioRuntime,
    ) -> Result<(), StoreError>;

    /// Nodes matching the label selector, e.g. `orca.io/s-default-demo=true`.
    async fn list_nodes(
        &self,
        label_selector: &str,
    ) -> Result<Vec<Node>, StoreError>;

    async fn get_node(&self, name: &str) -> Result<Node, StoreError>;

    async fn update_node(&self, node: &Node) -> Result<(), StoreError>;

    /// `Ok(None)` when the ConfigMap does not exist; absence is an
    /// expected state for never-deployed runtimes.
    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, StoreError>;

    async fn delete_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError>;

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadStatus, StoreError>;
}

#[derive(Error, Debug)]
pub enum CommandError {
    /// The command ran but exited non-zero.
    #[error("command {command:?} failed: {stderr}")]
    Failed {
        command: Vec<String>,
        stdout: String,
        stderr: String,
    },

    #[error("exec transport error: {0}")]
    Transport(String),
}

/// Output of a command executed inside a pod container.
#[derive(Clone, Debug, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes a command inside a named pod/container. The sole source of
/// the raw text the report parsers consume.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecOutput, CommandError>;
}

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("release {name} in {namespace}: {reason}")]
    Failed {
        name: String,
        namespace: String,
        reason: String,
    },
}

/// Opaque templated-release manager (install/uninstall of the rendered
/// cache cluster).
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    async fn check_release(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<bool, ReleaseError>;

    async fn install_release(
        &self,
        name: &str,
        namespace: &str,
        values: &serde_json::Value,
    ) -> Result<(), ReleaseError>;

    async fn delete_release(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<(), ReleaseError>;
}

#[derive(Error, Debug)]
#[error("port pool cannot supply {requested} ports: {reason}")]
pub struct PortPoolError {
    pub requested: usize,
    pub reason: String,
}

/// Shared host-port pool. The pool serializes its own operations; the
/// engine treats each call as atomic.
pub trait PortPool: Send + Sync {
    fn get_available_ports(
        &self,
        count: usize,
    ) -> Result<Vec<u16>, PortPoolError>;

    fn release_reserved_ports(&self, ports: Vec<u16>);
}

/// Access to secret data for mount-option decryption.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, StoreError>;
}
