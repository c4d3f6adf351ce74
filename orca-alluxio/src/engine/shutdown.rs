//! Tear-down of a cache cluster: drain the cache, drop the workers'
//! node labels, delete the release, hand reserved ports back to the
//! pool and remove the persisted configuration.

use tracing::{info, warn};

use super::error::{EngineError, Result};
use super::metadata::SyncTask;
use super::{ports, units, AlluxioEngine};
use crate::client::CommandError;

impl AlluxioEngine {
    /// Shuts the cluster down. Cache cleanup is best-effort: after a
    /// bounded number of failed attempts the teardown proceeds without
    /// it rather than wedging deletion forever.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.retry_shutdown < self.graceful_shutdown_limits {
            if let Err(err) = self.cleanup_cache().await {
                self.retry_shutdown += 1;
                info!(
                    error = %err,
                    retries = self.retry_shutdown,
                    "cache cleanup failed, will retry"
                );
                return Err(err);
            }
        }

        // an in-flight metadata sync is abandoned, not cancelled; the
        // task finishes on its own and its result is simply dropped
        if let SyncTask::Running(_) =
            std::mem::replace(&mut self.sync_task, SyncTask::Idle)
        {
            info!("abandoning in-flight metadata sync task");
        }

        self.destroy_workers(-1).await?;
        self.destroy_master().await?;
        self.release_reserved_ports().await?;
        self.clean_all().await
    }

    /// Frees every cached block before the workers disappear. Returns
    /// an error until a later status poll confirms the cache is empty,
    /// which drives the retry loop above.
    async fn cleanup_cache(&mut self) -> Result<()> {
        let states = self.query_cache_status().await?;
        if states.cached.is_empty() {
            return Ok(());
        }
        info!(
            cached = %states.cached,
            cached_percentage = %states.cached_percentage,
            "cache before cleanup"
        );

        let cached = units::parse_human_size(&states.cached)?;
        if cached == 0 {
            return Ok(());
        }

        self.invoke_clean_cache("/").await?;
        // freeing is asynchronous on the cluster side; force another
        // look before tearing down
        Err(EngineError::NotReady("cache drain".to_string()))
    }

    /// Runs the free command when a master is around to serve it; a
    /// missing or unready master means there is nothing to clean.
    pub(crate) async fn invoke_clean_cache(&self, path: &str) -> Result<()> {
        let master = match self
            .store
            .get_workload(&self.namespace, &self.master_statefulset_name())
            .await
        {
            Ok(master) => master,
            Err(err) if err.is_not_found() => {
                info!("master is gone, skipping cache cleanup");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        if master.ready_replicas == 0 {
            info!("master is not ready, skipping cache cleanup");
            return Ok(());
        }

        match self.file_utils().clean_cache(path).await {
            Ok(()) => Ok(()),
            Err(EngineError::Command(CommandError::Failed {
                stderr, ..
            })) if stderr.contains("not found")
                || stderr.contains("does not have a host assigned") =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn destroy_master(&self) -> Result<()> {
        let found = self
            .releases
            .check_release(&self.name, &self.namespace)
            .await?;
        if found {
            self.releases
                .delete_release(&self.name, &self.namespace)
                .await?;
            info!(release = %self.name, "release deleted");
        }
        Ok(())
    }

    /// Reads the reserved ports back out of the persisted values and
    /// returns them to the pool. A missing values ConfigMap means the
    /// cluster never allocated any.
    pub async fn release_reserved_ports(&self) -> Result<()> {
        let config_map = self
            .store
            .get_config_map(&self.namespace, &self.values_config_map_name())
            .await?;
        let Some(config_map) = config_map else {
            return Ok(());
        };
        let reserved = ports::parse_ports_from_config_map(&config_map)?;
        if !reserved.is_empty() {
            info!(?reserved, "releasing reserved ports");
            self.port_pool.release_reserved_ports(reserved);
        }
        Ok(())
    }

    async fn clean_all(&self) -> Result<()> {
        for name in
            [self.values_config_map_name(), self.config_map_name()]
        {
            match self.store.delete_config_map(&self.namespace, &name).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!(error = %err, config_map = %name, "failed to delete config map");
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }
}
