//! Runtime status refresh: replica phases from observed workloads plus
//! the cache snapshot, merged into persisted status.

use chrono::Utc;
use tracing::{error, info};

use super::cache::CacheStates;
use super::error::Result;
use super::AlluxioEngine;
use crate::client::retry::{retry_on_conflict, ConflictRetry};
use crate::client::WorkloadStatus;
use crate::crd::RuntimePhase;

/// Phase from desired vs ready counters.
pub fn phase_of(desired: i32, ready: i32) -> RuntimePhase {
    if desired <= 0 {
        RuntimePhase::None
    } else if ready >= desired {
        RuntimePhase::Ready
    } else if ready > 0 {
        RuntimePhase::PartialReady
    } else {
        RuntimePhase::NotReady
    }
}

impl AlluxioEngine {
    /// Recomputes the observable status of the cluster and persists it
    /// when it changed. Returns whether the cluster is serving (master
    /// ready and at least one worker ready).
    pub async fn check_and_update_runtime_status(&mut self) -> Result<bool> {
        let master: WorkloadStatus = self
            .store
            .get_workload(&self.namespace, &self.master_statefulset_name())
            .await?;
        let worker: WorkloadStatus = self
            .store
            .get_workload(&self.namespace, &self.worker_statefulset_name())
            .await?;

        let runtime = self.runtime().await?;
        let desired_workers = runtime.spec.replicas;

        let master_phase = phase_of(master.replicas, master.ready_replicas);
        let worker_phase = phase_of(desired_workers, worker.ready_replicas);
        let serving = master_phase == RuntimePhase::Ready
            && worker.ready_replicas > 0;

        // the cache snapshot needs a living cluster; skip it (and keep
        // the previous persisted snapshot) while nothing serves
        let cache_states: Option<CacheStates> = if serving {
            match self.query_cache_status().await {
                Ok(states) => Some(states),
                Err(err) => {
                    error!(error = %err, "failed to query cache status during status refresh");
                    None
                }
            }
        } else {
            None
        };
        let cache_map = cache_states.map(|s| s.as_status_map());

        let this: &AlluxioEngine = &*self;
        retry_on_conflict(ConflictRetry::default(), || {
            let cache_map = cache_map.clone();
            async move {
                let current = this
                    .store
                    .get_runtime(&this.namespace, &this.name)
                    .await?;
                let mut to_update = current.clone();
                let status =
                    to_update.status.get_or_insert_with(Default::default);

                status.master_phase = master_phase;
                status.worker_phase = worker_phase;
                status.desired_master_number_scheduled = master.replicas;
                status.master_number_ready = master.ready_replicas;
                status.desired_worker_number_scheduled = desired_workers;
                status.worker_number_ready = worker.ready_replicas;
                status.worker_number_available = worker.ready_replicas;
                status.value_file = this.values_config_map_name();
                if let Some(map) = cache_map {
                    status.cache_states = map;
                }
                if serving && status.mount_time.is_none() {
                    status.mount_time = Some(Utc::now().to_rfc3339());
                }

                let changed = match &current.status {
                    Some(existing) => {
                        serde_json::to_value(existing).ok()
                            != serde_json::to_value(&*status).ok()
                    }
                    None => true,
                };
                if changed {
                    this.store.update_runtime_status(&to_update).await?;
                }
                Ok(())
            }
        })
        .await?;

        if serving {
            info!(
                masters = master.ready_replicas,
                workers = worker.ready_replicas,
                "runtime is serving"
            );
        }
        Ok(serving)
    }
}
