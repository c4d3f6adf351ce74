//! In-memory collaborator fakes shared by the integration tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node};

use orca_alluxio::client::{
    CommandError, CommandRunner, ExecOutput, ObjectStore, PortPool,
    PortPoolError, ReleaseError, ReleaseManager, SecretStore, StoreError,
    WorkloadStatus,
};
use orca_alluxio::config::EngineConfig;
use orca_alluxio::crd::{AlluxioRuntime, Dataset};
use orca_alluxio::engine::AlluxioEngine;

#[derive(Default)]
pub struct MemState {
    pub dataset: Option<Dataset>,
    pub runtime: Option<AlluxioRuntime>,
    pub nodes: BTreeMap<String, Node>,
    pub config_maps: BTreeMap<String, ConfigMap>,
    pub workloads: BTreeMap<String, WorkloadStatus>,
}

/// Object store over plain in-memory state, with optional injected
/// write conflicts to exercise the retry paths.
#[derive(Default)]
pub struct MemStore {
    pub state: Mutex<MemState>,
    pub node_update_conflicts: Mutex<u32>,
    pub status_update_conflicts: Mutex<u32>,
}

impl MemStore {
    pub fn with_state(state: MemState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            ..Default::default()
        })
    }

    fn take_conflict(counter: &Mutex<u32>, what: &str) -> Option<StoreError> {
        let mut remaining = counter.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            Some(StoreError::Conflict(what.to_string()))
        } else {
            None
        }
    }
}

#[async_trait]
impl ObjectStore for MemStore {
    async fn get_dataset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Dataset, StoreError> {
        self.state.lock().unwrap().dataset.clone().ok_or(
            StoreError::NotFound {
                kind: "Dataset",
                namespace: namespace.into(),
                name: name.into(),
            },
        )
    }

    async fn update_dataset_status(
        &self,
        dataset: &Dataset,
    ) -> Result<(), StoreError> {
        if let Some(err) =
            Self::take_conflict(&self.status_update_conflicts, "dataset")
        {
            return Err(err);
        }
        self.state.lock().unwrap().dataset = Some(dataset.clone());
        Ok(())
    }

    async fn get_runtime(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<AlluxioRuntime, StoreError> {
        self.state.lock().unwrap().runtime.clone().ok_or(
            StoreError::NotFound {
                kind: "AlluxioRuntime",
                namespace: namespace.into(),
                name: name.into(),
            },
        )
    }

    async fn update_runtime_status(
        &self,
        runtime: &AlluxioRuntime,
    ) -> Result<(), StoreError> {
        if let Some(err) =
            Self::take_conflict(&self.status_update_conflicts, "runtime")
        {
            return Err(err);
        }
        self.state.lock().unwrap().runtime = Some(runtime.clone());
        Ok(())
    }

    async fn list_nodes(
        &self,
        label_selector: &str,
    ) -> Result<Vec<Node>, StoreError> {
        let state = self.state.lock().unwrap();
        let wanted = label_selector
            .split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()));
        Ok(state
            .nodes
            .values()
            .filter(|node| match &wanted {
                None => true,
                Some((key, value)) => node
                    .metadata
                    .labels
                    .as_ref()
                    .map(|l| l.get(key) == Some(value))
                    .unwrap_or(false),
            })
            .cloned()
            .collect())
    }

    async fn get_node(&self, name: &str) -> Result<Node, StoreError> {
        self.state.lock().unwrap().nodes.get(name).cloned().ok_or(
            StoreError::NotFound {
                kind: "Node",
                namespace: String::new(),
                name: name.into(),
            },
        )
    }

    async fn update_node(&self, node: &Node) -> Result<(), StoreError> {
        if let Some(err) =
            Self::take_conflict(&self.node_update_conflicts, "node")
        {
            return Err(err);
        }
        let name = node.metadata.name.clone().unwrap_or_default();
        self.state.lock().unwrap().nodes.insert(name, node.clone());
        Ok(())
    }

    async fn get_config_map(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, StoreError> {
        Ok(self.state.lock().unwrap().config_maps.get(name).cloned())
    }

    async fn delete_config_map(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.state.lock().unwrap().config_maps.remove(name);
        Ok(())
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadStatus, StoreError> {
        self.state.lock().unwrap().workloads.get(name).copied().ok_or(
            StoreError::NotFound {
                kind: "StatefulSet",
                namespace: namespace.into(),
                name: name.into(),
            },
        )
    }
}

/// Command runner answering from a script keyed by the joined command
/// line; unknown commands fail like a broken master.
#[derive(Default)]
pub struct ScriptedRunner {
    pub outputs: Mutex<BTreeMap<String, String>>,
    pub calls: Mutex<Vec<String>>,
    /// Extra latency per call; lets tests hold the metadata sync task
    /// in flight across polls.
    pub delay: Mutex<Option<std::time::Duration>>,
}

impl ScriptedRunner {
    pub fn with_output(&self, command: &str, output: &str) {
        self.outputs
            .lock()
            .unwrap()
            .insert(command.to_string(), output.to_string());
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn exec(
        &self,
        _namespace: &str,
        _pod: &str,
        _container: &str,
        command: &[String],
    ) -> Result<ExecOutput, CommandError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let joined = command.join(" ");
        self.calls.lock().unwrap().push(joined.clone());
        match self.outputs.lock().unwrap().get(&joined) {
            Some(output) => Ok(ExecOutput {
                stdout: output.clone(),
                stderr: String::new(),
            }),
            None => Err(CommandError::Failed {
                command: command.to_vec(),
                stdout: String::new(),
                stderr: "Unable to reach the Alluxio master".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct MemReleases {
    pub installed: Mutex<Option<serde_json::Value>>,
}

#[async_trait]
impl ReleaseManager for MemReleases {
    async fn check_release(
        &self,
        _name: &str,
        _namespace: &str,
    ) -> Result<bool, ReleaseError> {
        Ok(self.installed.lock().unwrap().is_some())
    }

    async fn install_release(
        &self,
        _name: &str,
        _namespace: &str,
        values: &serde_json::Value,
    ) -> Result<(), ReleaseError> {
        *self.installed.lock().unwrap() = Some(values.clone());
        Ok(())
    }

    async fn delete_release(
        &self,
        _name: &str,
        _namespace: &str,
    ) -> Result<(), ReleaseError> {
        *self.installed.lock().unwrap() = None;
        Ok(())
    }
}

/// Sequential port pool starting at 20000, recording releases.
#[derive(Default)]
pub struct TestPool {
    pub next: Mutex<u16>,
    pub released: Mutex<Vec<u16>>,
}

impl TestPool {
    pub fn starting_at(port: u16) -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new(port),
            released: Mutex::new(vec![]),
        })
    }
}

impl PortPool for TestPool {
    fn get_available_ports(
        &self,
        count: usize,
    ) -> Result<Vec<u16>, PortPoolError> {
        let mut next = self.next.lock().unwrap();
        let ports = (*next..*next + count as u16).collect();
        *next += count as u16;
        Ok(ports)
    }

    fn release_reserved_ports(&self, ports: Vec<u16>) {
        self.released.lock().unwrap().extend(ports);
    }
}

#[derive(Default)]
pub struct MemSecrets {
    pub secrets: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

#[async_trait]
impl SecretStore for MemSecrets {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        self.secrets.lock().unwrap().get(name).cloned().ok_or(
            StoreError::NotFound {
                kind: "Secret",
                namespace: namespace.into(),
                name: name.into(),
            },
        )
    }
}

/// Bundles the fakes so tests can both drive the engine and inspect
/// what it did.
pub struct TestHarness {
    pub store: Arc<MemStore>,
    pub runner: Arc<ScriptedRunner>,
    pub releases: Arc<MemReleases>,
    pub pool: Arc<TestPool>,
    pub secrets: Arc<MemSecrets>,
}

impl TestHarness {
    pub fn new(state: MemState) -> Self {
        Self {
            store: MemStore::with_state(state),
            runner: Arc::new(ScriptedRunner::default()),
            releases: Arc::new(MemReleases::default()),
            pool: TestPool::starting_at(20000),
            secrets: Arc::new(MemSecrets::default()),
        }
    }

    pub fn engine(&self) -> AlluxioEngine {
        self.engine_with_config(EngineConfig::default())
    }

    pub fn engine_with_config(&self, config: EngineConfig) -> AlluxioEngine {
        AlluxioEngine::new(
            "demo",
            "big-data",
            config,
            self.store.clone(),
            self.runner.clone(),
            self.releases.clone(),
            self.pool.clone(),
            self.secrets.clone(),
        )
    }
}
