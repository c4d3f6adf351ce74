//! Asynchronous metadata sync: load the backing-storage namespace and
//! learn its total size without ever stalling the reconcile loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::error::{EngineError, Result};
use super::ops::AlluxioFileUtils;
use super::transform::master::parse_backup_restore_path;
use super::{units, AlluxioEngine};
use crate::client::retry::{retry_on_conflict, ConflictRetry};
use crate::crd::METADATA_SYNC_NOT_DONE_MSG;

/// Outcome of one background sync run.
#[derive(Debug)]
pub struct MetadataSyncResult {
    pub done: bool,
    pub started_at: DateTime<Utc>,
    pub ufs_total: String,
    pub file_num: String,
    pub err: Option<EngineError>,
}

/// At most one background task runs per engine instance; the state is
/// exactly this enum, mutated only by the single reconcile caller.
pub enum SyncTask {
    Idle,
    Running(JoinHandle<MetadataSyncResult>),
}

impl AlluxioEngine {
    /// Periodic entry point. Triggers a sync when the dataset's totals
    /// are unknown, restoring them from a backup when one is declared.
    /// Asynchronous: call again on later ticks to collect the result.
    pub async fn sync_metadata(&mut self) -> Result<()> {
        if !self.should_sync_metadata().await? {
            return Ok(());
        }
        if self.should_restore_metadata().await.unwrap_or(false)
            && self.restore_metadata().await.is_ok()
        {
            return Ok(());
        }
        self.sync_metadata_internal().await
    }

    /// Totals already known (and not the in-progress sentinel) mean
    /// nothing to do.
    async fn should_sync_metadata(&self) -> Result<bool> {
        if matches!(
            self.runtime().await?.spec.management.metadata_sync_policy.as_deref(),
            Some("None")
        ) {
            return Ok(false);
        }
        let dataset = self.dataset().await?;
        let ufs_total = dataset
            .status
            .as_ref()
            .map(|s| s.ufs_total.clone())
            .unwrap_or_default();
        if !ufs_total.is_empty() && ufs_total != METADATA_SYNC_NOT_DONE_MSG {
            debug!(%ufs_total, "dataset totals already known");
            return Ok(false);
        }
        Ok(true)
    }

    async fn should_restore_metadata(&self) -> Result<bool> {
        let dataset = self.dataset().await?;
        Ok(dataset.spec.data_restore_location.is_some())
    }

    /// Reads the totals captured at backup time instead of re-scanning
    /// the backing storage. Failures fall back to a regular sync.
    async fn restore_metadata(&self) -> Result<()> {
        let dataset = self.dataset().await?;
        let location = dataset
            .spec
            .data_restore_location
            .as_ref()
            .ok_or_else(|| {
                EngineError::Invalid("no restore location".to_string())
            })?;
        let (pvc_name, path) = parse_backup_restore_path(&location.path)?;
        let info_file = match pvc_name {
            Some(_) => {
                format!("/pvc{}{}", path, self.metadata_info_file_name())
            }
            None => format!("/host/{}", self.metadata_info_file_name()),
        };

        let utils = self.file_utils();
        let ufs_total_raw = utils
            .query_metadata_info_from_file("ufstotal", &info_file)
            .await?;
        let ufs_total_bytes: f64 =
            ufs_total_raw.trim().parse().map_err(|_| {
                EngineError::Parse(format!(
                    "restored total {ufs_total_raw:?} is not a number"
                ))
            })?;
        let ufs_total = units::format_bytes(ufs_total_bytes as i64);
        let file_num = utils
            .query_metadata_info_from_file("filenum", &info_file)
            .await?;

        self.persist_dataset_totals(ufs_total, file_num).await
    }

    /// The Idle/Running state machine. Idle: persist the in-progress
    /// sentinel and start exactly one background task, returning
    /// immediately. Running: wait a bounded window for the result;
    /// timing out means "still working" and is success.
    async fn sync_metadata_internal(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.sync_task, SyncTask::Idle) {
            SyncTask::Running(mut handle) => {
                let window = Duration::from_millis(
                    self.config.sync.metadata_poll_timeout_millis,
                );
                match tokio::time::timeout(window, &mut handle).await {
                    Ok(Ok(result)) => {
                        info!(done = result.done, "metadata sync task finished");
                        if result.done {
                            info!(
                                elapsed = ?(Utc::now() - result.started_at),
                                "metadata sync succeeded"
                            );
                            self.persist_dataset_totals(
                                result.ufs_total,
                                result.file_num,
                            )
                            .await
                        } else {
                            let err = result.err.unwrap_or_else(|| {
                                EngineError::Invalid(
                                    "metadata sync failed".to_string(),
                                )
                            });
                            error!(error = %err, "metadata sync failed");
                            Err(err)
                        }
                    }
                    Ok(Err(join_err)) => Err(EngineError::Invalid(format!(
                        "metadata sync task aborted: {join_err}"
                    ))),
                    Err(_elapsed) => {
                        debug!("metadata sync still in progress");
                        self.sync_task = SyncTask::Running(handle);
                        Ok(())
                    }
                }
            }
            SyncTask::Idle => {
                self.persist_dataset_totals(
                    METADATA_SYNC_NOT_DONE_MSG.to_string(),
                    METADATA_SYNC_NOT_DONE_MSG.to_string(),
                )
                .await?;

                let (pod, container) = self.master_pod_info();
                let utils = AlluxioFileUtils::new(
                    pod,
                    container,
                    self.namespace.clone(),
                    Arc::clone(&self.runner),
                );
                let namespace = self.namespace.clone();
                let name = self.name.clone();

                let handle = tokio::spawn(async move {
                    run_sync_task(utils, namespace, name).await
                });
                self.sync_task = SyncTask::Running(handle);
                Ok(())
            }
        }
    }

    /// Conflict-retried dataset status write; skipped when nothing
    /// would change.
    async fn persist_dataset_totals(
        &self,
        ufs_total: String,
        file_num: String,
    ) -> Result<()> {
        retry_on_conflict(ConflictRetry::default(), || async {
            let dataset = self
                .store
                .get_dataset(&self.namespace, &self.name)
                .await?;
            let unchanged = dataset
                .status
                .as_ref()
                .map(|s| s.ufs_total == ufs_total && s.file_num == file_num)
                .unwrap_or(false);
            if unchanged {
                return Ok(());
            }
            let mut to_update = dataset.clone();
            let status =
                to_update.status.get_or_insert_with(Default::default);
            status.ufs_total = ufs_total.clone();
            status.file_num = file_num.clone();
            self.store.update_dataset_status(&to_update).await
        })
        .await?;
        Ok(())
    }
}

/// The background unit of work: load metadata recursively, then learn
/// total size and file count. Never cancelled; an abandoned task just
/// finishes into a channel nobody reads.
async fn run_sync_task(
    utils: AlluxioFileUtils,
    namespace: String,
    name: String,
) -> MetadataSyncResult {
    let started_at = Utc::now();
    info!(%namespace, %name, "metadata sync starts");

    let mut result = MetadataSyncResult {
        done: false,
        started_at,
        ufs_total: String::new(),
        file_num: String::new(),
        err: None,
    };

    if let Err(err) = utils.load_metadata("/").await {
        error!(error = %err, %namespace, %name, "loadMetadata failed while syncing metadata");
        result.err = Some(err);
        return result;
    }
    result.done = true;

    match utils.total_storage_bytes("/").await {
        Ok(bytes) => result.ufs_total = units::format_bytes(bytes),
        Err(err) => {
            error!(error = %err, "failed to get total storage size while syncing metadata");
            result.done = false;
        }
    }
    match utils.file_count().await {
        Ok(count) => result.file_num = count.to_string(),
        Err(err) => {
            error!(error = %err, "failed to get file count while syncing metadata");
            result.done = false;
        }
    }

    if !result.done {
        result.err = Some(EngineError::Invalid(
            "failed to collect metadata info".to_string(),
        ));
    }
    result
}
