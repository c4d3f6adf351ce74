//! Mount classification and option resolution, plus the stage 6/7
//! transforms that depend on them.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::TransformContext;
use crate::client::SecretStore;
use crate::crd::dataset::{EncryptOption, Mount};
use crate::engine::error::{EngineError, Result};
use crate::engine::value::{AlluxioValue, HadoopConfigValue, UfsPath, UfsVolume};
use crate::engine::{AlluxioEngine, LOCAL_STORAGE_DIRECTORY};

const LOCAL_SCHEME: &str = "local://";
const PVC_SCHEME: &str = "pvc://";

/// In-container directory where per-mount credential secrets are
/// projected when mounts are shipped via ConfigMap.
pub const SECRET_MOUNT_ROOT: &str = "/etc/orca/secrets";

/// Where a mount's data actually comes from, decided once by URI scheme
/// instead of scattering prefix checks across stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountSource {
    /// `local://<host path>` — a directory on the node.
    LocalPath { path: String },
    /// `pvc://<claim>[/<sub path>]` — an existing volume claim.
    VolumeClaim { claim: String, sub_path: String },
    /// Anything else — a remote storage URI mounted by the runtime.
    DirectUfs { uri: String },
}

pub fn classify_mount(mount_point: &str) -> MountSource {
    if let Some(path) = mount_point.strip_prefix(LOCAL_SCHEME) {
        // a third slash survives into the host path: local:///mnt/x
        return MountSource::LocalPath {
            path: format!("/{}", path.trim_start_matches('/')),
        };
    }
    if let Some(rest) = mount_point.strip_prefix(PVC_SCHEME) {
        let (claim, sub_path) = match rest.split_once('/') {
            Some((claim, sub)) => (claim.to_string(), sub.to_string()),
            None => (rest.to_string(), String::new()),
        };
        return MountSource::VolumeClaim { claim, sub_path };
    }
    MountSource::DirectUfs {
        uri: mount_point.to_string(),
    }
}

/// Native schemes are provisioned as volumes rather than mounted
/// through the runtime's own mount table.
pub fn is_native_scheme(mount_point: &str) -> bool {
    mount_point.starts_with(LOCAL_SCHEME)
        || mount_point.starts_with(PVC_SCHEME)
}

pub fn is_http_scheme(mount_point: &str) -> bool {
    mount_point.starts_with("http://") || mount_point.starts_with("https://")
}

/// Resolves the effective option map of one mount: shared options under
/// per-mount options, then encrypted options from both levels. A key
/// reached twice through the encrypted channel (or already present as a
/// plain option) is ambiguous intent and fails the whole resolution.
///
/// With `extract_encrypt_options` the secret values are fetched and
/// inlined (command-line mount path); without it the value becomes the
/// in-container file path the secret is projected to.
pub async fn gen_ufs_mount_options(
    mount: &Mount,
    shared_options: &BTreeMap<String, String>,
    shared_encrypt_options: &[EncryptOption],
    secrets: &dyn SecretStore,
    namespace: &str,
    extract_encrypt_options: bool,
) -> Result<BTreeMap<String, String>> {
    let mut options = shared_options.clone();
    options.extend(mount.options.clone());

    for encrypted in shared_encrypt_options
        .iter()
        .chain(mount.encrypt_options.iter())
    {
        if options.contains_key(&encrypted.name) {
            return Err(EngineError::ConfigurationConflict(
                encrypted.name.clone(),
            ));
        }
        let secret_ref = &encrypted.value_from.secret_key_ref;
        let value = if extract_encrypt_options {
            let data = secrets.get_secret(namespace, &secret_ref.name).await?;
            data.get(&secret_ref.key).cloned().ok_or_else(|| {
                EngineError::Invalid(format!(
                    "secret {}/{} has no key {}",
                    namespace, secret_ref.name, secret_ref.key
                ))
            })?
        } else {
            format!(
                "{}/{}/{}",
                SECRET_MOUNT_ROOT, secret_ref.name, secret_ref.key
            )
        };
        options.insert(encrypted.name.clone(), value);
    }

    Ok(options)
}

/// The in-cluster path a named mount appears at.
pub fn mount_container_path(name: &str) -> String {
    format!("{LOCAL_STORAGE_DIRECTORY}/{name}")
}

impl AlluxioEngine {
    /// Stage 6a: wire an extra HDFS client configuration ConfigMap into
    /// the deployment when the runtime asks for one.
    pub(super) async fn transform_hadoop_config(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> Result<AlluxioValue> {
        let Some(config_map_name) = ctx.spec.hadoop_config.as_deref() else {
            return Ok(value);
        };

        let config_map = self
            .store
            .get_config_map(&self.namespace, config_map_name)
            .await?
            .ok_or_else(|| {
                EngineError::Invalid(format!(
                    "hadoopConfig references missing config map {config_map_name}"
                ))
            })?;

        let keys = config_map.data.unwrap_or_default();
        let include_hdfs_site = keys.contains_key("hdfs-site.xml");
        let include_core_site = keys.contains_key("core-site.xml");
        if !include_hdfs_site && !include_core_site {
            return Err(EngineError::Invalid(format!(
                "hadoopConfig config map {config_map_name} holds neither hdfs-site.xml nor core-site.xml"
            )));
        }

        value.hadoop_config = Some(HadoopConfigValue {
            config_map: config_map_name.to_string(),
            include_hdfs_site,
            include_core_site,
        });
        Ok(value)
    }

    /// Stage 6b: ephemeral tier paths are not guaranteed identical
    /// across master and worker pods, so local short-circuit reads must
    /// be off whenever any level is emptyDir-backed.
    pub(super) fn transform_short_circuit(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> AlluxioValue {
        if ctx.spec.tieredstore.levels.iter().any(|l| l.is_ephemeral()) {
            debug!("ephemeral tier level found, disabling short circuit");
            value.short_circuit.enable = false;
            value.properties.insert(
                "alluxio.user.short.circuit.enabled".to_string(),
                "false".to_string(),
            );
        }
        value
    }

    /// Stage 7: native mounts become host-path or claim-backed volume
    /// mappings; node affinity travels with the deployment only when a
    /// host path pins data to specific nodes.
    pub(super) fn transform_dataset_to_volume(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> AlluxioValue {
        for mount in &ctx.dataset.spec.mounts {
            let name = effective_mount_name(mount, &self.name);
            match classify_mount(&mount.mount_point) {
                MountSource::LocalPath { path } => {
                    value.ufs_paths.push(UfsPath {
                        name: name.clone(),
                        host_path: path,
                        container_path: mount_container_path(&name),
                    });
                }
                MountSource::VolumeClaim { claim, sub_path } => {
                    value.ufs_volumes.push(UfsVolume {
                        name: claim,
                        sub_path,
                        container_path: mount_container_path(&name),
                    });
                }
                MountSource::DirectUfs { .. } => {}
            }
        }

        if !value.ufs_paths.is_empty() {
            if let Some(affinity) = &ctx.dataset.spec.node_affinity {
                value.node_affinity = Some(affinity.clone());
            } else {
                warn!(
                    "dataset has host-path mounts but no node affinity; cache placement is unconstrained"
                );
            }
        }
        value
    }
}

/// A blank mount name falls back to the dataset name; single-mount
/// datasets routinely leave it out.
pub fn effective_mount_name(mount: &Mount, dataset_name: &str) -> String {
    if mount.name.is_empty() {
        dataset_name.to_string()
    } else {
        mount.name.clone()
    }
}
