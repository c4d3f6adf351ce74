//! Stage 3: master component transform.

use serde_json::Value;
use tracing::error;

use super::mounts::{
    self, SECRET_MOUNT_ROOT, effective_mount_name, gen_ufs_mount_options,
};
use super::TransformContext;
use crate::crd::runtime::AlluxioCompTemplateSpec;
use crate::crd::VolumeMountSpec;
use crate::engine::error::{EngineError, Result};
use crate::engine::value::{AlluxioValue, NonNativeMount};
use crate::engine::AlluxioEngine;

impl AlluxioEngine {
    pub(super) async fn transform_masters(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> Result<AlluxioValue> {
        let spec = &ctx.spec.master;

        value.master.backup_path = format!(
            "{}/alluxio-backup/{}/{}",
            self.config.workdir, self.namespace, self.name
        );

        value.master.replicas =
            if spec.replicas == 0 { 1 } else { spec.replicas };

        value.master.jvm_options = if spec.jvm_options.is_empty() {
            vec![
                "-Xmx16G".to_string(),
                "-XX:+UnlockExperimentalVMOptions".to_string(),
            ]
        } else {
            spec.jvm_options.clone()
        };

        value.master.env = spec.env.clone();
        value.master.env.insert(
            "ALLUXIO_WORKER_TIEREDSTORE_LEVEL0_DIRS_PATH".to_string(),
            self.tiered_store_level0_path(&value),
        );

        value.master.properties = spec.properties.clone();
        value.master.node_selector = spec.node_selector.clone();
        value.master.host_network = spec.uses_host_network();
        value.master.resources = spec.resources.clone();

        let (volumes, volume_mounts) =
            select_component_volumes(ctx, spec)?;
        value.master.volumes = volumes;
        value.master.volume_mounts = volume_mounts;

        self.transform_restore(ctx, &mut value);

        if self.config.mount_config_storage == "configmap" {
            value = self.transform_non_native_mounts(ctx, value).await?;
        }

        Ok(value)
    }

    /// Restore-from-backup has three shapes: a claim-backed path, a
    /// node-local path, or something unparseable. The last one is
    /// logged and skipped; a broken restore hint must not block the
    /// deployment.
    fn transform_restore(
        &self,
        ctx: &TransformContext<'_>,
        value: &mut AlluxioValue,
    ) {
        let Some(location) = &ctx.dataset.spec.data_restore_location else {
            return;
        };
        if location.path.is_empty() {
            return;
        }

        match parse_backup_restore_path(&location.path) {
            Ok((Some(pvc_name), path)) => {
                value.master.restore.enabled = true;
                value.master.restore.pvc_name = pvc_name;
                value.master.restore.path = path.clone();
                value.master.env.insert(
                    "JOURNAL_BACKUP".to_string(),
                    format!("/pvc{}{}", path, self.metadata_backup_file_name()),
                );
            }
            Ok((None, path)) if !location.node_name.is_empty() => {
                value.master.restore.enabled = true;
                value.master.restore.path = path;
                value.master.node_selector.insert(
                    "kubernetes.io/hostname".to_string(),
                    location.node_name.clone(),
                );
                value.master.env.insert(
                    "JOURNAL_BACKUP".to_string(),
                    format!("/host/{}", self.metadata_backup_file_name()),
                );
            }
            Ok((None, _)) => {
                error!(
                    path = %location.path,
                    "restore path is node-local but no node name is given, skipping restore"
                );
            }
            Err(err) => {
                error!(
                    error = %err,
                    path = %location.path,
                    "restore path cannot be analysed, skipping restore"
                );
            }
        }
    }

    /// Non-native mounts shipped via ConfigMap: render one descriptor
    /// per mount with secret references left as file paths, and project
    /// each referenced secret into the master pod.
    async fn transform_non_native_mounts(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> Result<AlluxioValue> {
        let dataset_spec = &ctx.dataset.spec;
        let mut secret_names: Vec<String> = Vec::new();

        for mount in &dataset_spec.mounts {
            if mounts::is_native_scheme(&mount.mount_point) {
                continue;
            }
            let options = gen_ufs_mount_options(
                mount,
                &dataset_spec.shared_options,
                &dataset_spec.shared_encrypt_options,
                self.secrets.as_ref(),
                &self.namespace,
                false,
            )
            .await?;

            let name = effective_mount_name(mount, &self.name);
            value.master.non_native_mounts.push(NonNativeMount {
                name: name.clone(),
                mount_point: mount.mount_point.clone(),
                options,
                read_only: mount.read_only,
                shared: mount.shared,
            });

            for encrypted in dataset_spec
                .shared_encrypt_options
                .iter()
                .chain(mount.encrypt_options.iter())
            {
                let secret = &encrypted.value_from.secret_key_ref.name;
                if !secret_names.contains(secret) {
                    secret_names.push(secret.clone());
                }
            }
        }

        for secret in secret_names {
            let volume_name = format!("orca-secret-{secret}");
            value.master.volumes.push(serde_json::json!({
                "name": volume_name,
                "secret": { "secretName": secret, "defaultMode": 0o400 }
            }));
            value.master.volume_mounts.push(VolumeMountSpec {
                name: volume_name,
                mount_path: format!("{SECRET_MOUNT_ROOT}/{secret}"),
                sub_path: None,
                read_only: true,
            });
        }

        Ok(value)
    }
}

/// Picks the declared volumes a component's mounts reference. A mount
/// naming an undeclared volume fails the pipeline.
pub(super) fn select_component_volumes(
    ctx: &TransformContext<'_>,
    spec: &AlluxioCompTemplateSpec,
) -> Result<(Vec<Value>, Vec<VolumeMountSpec>)> {
    let mut volumes = Vec::new();
    for mount in &spec.volume_mounts {
        let declared = ctx.spec.volumes.iter().find(|v| {
            v.get("name").and_then(Value::as_str) == Some(&mount.name)
        });
        match declared {
            Some(volume) => {
                if !volumes.contains(volume) {
                    volumes.push(volume.clone());
                }
            }
            None => {
                return Err(EngineError::Invalid(format!(
                    "volume mount {} references an undeclared volume",
                    mount.name
                )));
            }
        }
    }
    Ok((volumes, spec.volume_mounts.clone()))
}

/// Splits a restore location into its claim name (when claim-backed)
/// and normalized sub path with leading and trailing slashes.
pub(crate) fn parse_backup_restore_path(
    path: &str,
) -> Result<(Option<String>, String)> {
    let normalize = |p: &str| {
        let trimmed = p.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}/")
        }
    };

    if let Some(rest) = path.strip_prefix("pvc://") {
        let (pvc, sub) = match rest.split_once('/') {
            Some((pvc, sub)) => (pvc, sub),
            None => (rest, ""),
        };
        if pvc.is_empty() {
            return Err(EngineError::Parse(format!(
                "restore path {path:?} names no claim"
            )));
        }
        return Ok((Some(pvc.to_string()), normalize(sub)));
    }
    if let Some(rest) = path.strip_prefix("local://") {
        return Ok((None, normalize(rest)));
    }
    Err(EngineError::Parse(format!(
        "restore path {path:?} has an unsupported scheme"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_claim_backed_restore_paths() {
        let (pvc, path) =
            parse_backup_restore_path("pvc://backups/alluxio/demo").unwrap();
        assert_eq!(pvc.as_deref(), Some("backups"));
        assert_eq!(path, "/alluxio/demo/");

        let (pvc, path) = parse_backup_restore_path("pvc://backups").unwrap();
        assert_eq!(pvc.as_deref(), Some("backups"));
        assert_eq!(path, "/");
    }

    #[test]
    fn parses_node_local_restore_paths() {
        let (pvc, path) =
            parse_backup_restore_path("local://var/backup").unwrap();
        assert_eq!(pvc, None);
        assert_eq!(path, "/var/backup/");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(parse_backup_restore_path("s3://bucket/backup").is_err());
        assert!(parse_backup_restore_path("pvc://").is_err());
    }
}
