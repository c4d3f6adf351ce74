//! Backing-storage preparation: wait for the master, then apply the
//! declared non-native mounts with fully resolved credentials.

use chrono::Utc;
use tracing::{debug, info};

use super::error::{EngineError, Result};
use super::transform::mounts::{
    effective_mount_name, gen_ufs_mount_options, is_native_scheme,
};
use super::{AlluxioEngine, LOCAL_STORAGE_DIRECTORY};
use crate::client::retry::{retry_on_conflict, ConflictRetry};

impl AlluxioEngine {
    /// True once the master statefulset has a ready replica and the
    /// operational CLI answers.
    pub async fn check_master_ready(&self) -> Result<bool> {
        let master = self
            .store
            .get_workload(&self.namespace, &self.master_statefulset_name())
            .await?;
        if master.ready_replicas == 0 {
            return Ok(false);
        }
        Ok(self.file_utils().ready().await)
    }

    /// Applies every declared non-native mount that is not in the mount
    /// table yet, then stamps the mount time. A single non-native mount
    /// was already wired as the root storage by the transform and needs
    /// no mount call.
    pub async fn prepare_ufs(&self) -> Result<()> {
        let dataset = self.dataset().await?;
        if self.root_ufs(&dataset) != LOCAL_STORAGE_DIRECTORY {
            debug!("single mount serves as root storage, nothing to mount");
            return self.record_mount_time().await;
        }

        let utils = self.file_utils();
        if !utils.ready().await {
            return Err(EngineError::NotReady("alluxio master".to_string()));
        }

        for mount in &dataset.spec.mounts {
            if is_native_scheme(&mount.mount_point) {
                continue;
            }
            let name = effective_mount_name(mount, &self.name);
            let alluxio_path = format!("/{name}");
            if utils.is_mounted(&alluxio_path).await? {
                debug!(%alluxio_path, "already mounted");
                continue;
            }

            let options = gen_ufs_mount_options(
                mount,
                &dataset.spec.shared_options,
                &dataset.spec.shared_encrypt_options,
                self.secrets.as_ref(),
                &self.namespace,
                true,
            )
            .await?;

            utils
                .mount(
                    &alluxio_path,
                    &mount.mount_point,
                    &options,
                    mount.read_only,
                    mount.shared,
                )
                .await?;
            info!(%alluxio_path, mount_point = %mount.mount_point, "mounted backing storage");
        }

        self.record_mount_time().await
    }

    async fn record_mount_time(&self) -> Result<()> {
        retry_on_conflict(ConflictRetry::default(), || async {
            let runtime = self
                .store
                .get_runtime(&self.namespace, &self.name)
                .await?;
            if runtime
                .status
                .as_ref()
                .map(|s| s.mount_time.is_some())
                .unwrap_or(false)
            {
                return Ok(());
            }
            let mut to_update = runtime.clone();
            to_update
                .status
                .get_or_insert_with(Default::default)
                .mount_time = Some(Utc::now().to_rfc3339());
            self.store.update_runtime_status(&to_update).await
        })
        .await?;
        Ok(())
    }
}
