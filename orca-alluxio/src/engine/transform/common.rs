//! Stage 1 (common part) and stage 2 (pod metadata).

use std::collections::BTreeMap;

use tracing::debug;

use super::TransformContext;
use crate::engine::error::Result;
use crate::engine::value::{
    AlluxioValue, JournalValue, LevelValue, ShortCircuitValue,
    TieredStoreValue,
};
use crate::engine::{AlluxioEngine, RUNTIME_METRICS_LABEL};
use crate::crd::runtime::{Level, PodMetadata};

/// Medium rank drives the numeric tier index: memory above SSD above
/// spinning disk.
fn medium_rank(medium: &str) -> usize {
    match medium {
        "MEM" => 0,
        "SSD" => 1,
        _ => 2,
    }
}

/// Converts a Kubernetes quantity into the runtime's own unit dialect,
/// which spells binary sizes with plain decimal-looking labels:
/// `2Gi` becomes `2GB`.
pub fn quota_to_runtime_unit(quota: &str) -> String {
    let trimmed = quota.trim();
    if let Some(stripped) = trimmed.strip_suffix('i') {
        format!("{stripped}B")
    } else {
        trimmed.to_string()
    }
}

/// Per-directory quotas for one level: the explicit quota list wins,
/// otherwise the single quota is repeated per path.
fn level_quotas(level: &Level, path_count: usize) -> Vec<String> {
    if let Some(list) = level
        .quota_list
        .as_deref()
        .filter(|l| !l.trim().is_empty())
    {
        return list
            .split(',')
            .map(|q| quota_to_runtime_unit(q))
            .collect();
    }
    let single = level
        .quota
        .as_deref()
        .map(quota_to_runtime_unit)
        .unwrap_or_default();
    vec![single; path_count.max(1)]
}

impl AlluxioEngine {
    /// Stage 1: image resolution, the property map (from here on the
    /// map is always present), replication bound, root storage mount,
    /// tiered-store levels, journal/short-circuit defaults, monitoring
    /// label and dataset tolerations.
    pub(super) fn transform_common_part(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> Result<AlluxioValue> {
        let version = &ctx.spec.alluxio_version;
        value.image = if version.image.is_empty() {
            self.config.image.runtime_image.clone()
        } else {
            version.image.clone()
        };
        value.image_tag = if version.image_tag.is_empty() {
            self.config.image.runtime_image_tag.clone()
        } else {
            version.image_tag.clone()
        };
        value.image_pull_policy = if version.image_pull_policy.is_empty() {
            self.config.image.pull_policy.clone()
        } else {
            version.image_pull_policy.clone()
        };

        value.user = 0;
        value.group = 0;
        value.fs_group = 0;

        value.properties = ctx.spec.properties.clone();

        let data_replicas = if ctx.spec.data.replicas <= 0 {
            1
        } else {
            ctx.spec.data.replicas
        };
        value.properties.insert(
            "alluxio.user.file.replication.max".to_string(),
            data_replicas.to_string(),
        );
        value.properties.insert(
            "alluxio.master.mount.table.root.ufs".to_string(),
            self.root_ufs(ctx.dataset),
        );

        value.jvm_options = ctx.spec.jvm_options.clone();

        value.tieredstore = self.transform_tiered_store(ctx);
        value.journal = JournalValue {
            volume_type: "emptyDir".to_string(),
            size: "30Gi".to_string(),
        };
        value.short_circuit = ShortCircuitValue {
            enable: true,
            policy: "local".to_string(),
            volume_type: "emptyDir".to_string(),
        };

        if ctx.spec.monitoring {
            value.monitoring = RUNTIME_METRICS_LABEL.to_string();
        }

        // tolerationSeconds is intentionally dropped: cache pods share
        // the pod-level eviction grace period
        value.tolerations = ctx
            .dataset
            .spec
            .tolerations
            .iter()
            .cloned()
            .map(|mut t| {
                t.toleration_seconds = None;
                t
            })
            .collect();

        Ok(value)
    }

    fn transform_tiered_store(
        &self,
        ctx: &TransformContext<'_>,
    ) -> TieredStoreValue {
        let mut mediums: Vec<&str> = ctx
            .spec
            .tieredstore
            .levels
            .iter()
            .map(|l| l.mediumtype.as_str())
            .collect();
        mediums.sort_by_key(|m| medium_rank(m));
        mediums.dedup();

        let mut levels = Vec::new();
        for level in &ctx.spec.tieredstore.levels {
            let paths: Vec<String> = level
                .path
                .split(',')
                .filter(|p| !p.trim().is_empty())
                .map(|p| {
                    format!(
                        "{}/{}/{}",
                        p.trim_end_matches('/'),
                        self.namespace,
                        self.name
                    )
                })
                .collect();
            let quotas = level_quotas(level, paths.len());
            let mediumtypes =
                vec![level.mediumtype.clone(); paths.len().max(1)];

            let tier_index = mediums
                .iter()
                .position(|m| *m == level.mediumtype)
                .unwrap_or_default() as i32;

            levels.push(LevelValue {
                alias: level.mediumtype.clone(),
                level: tier_index,
                volume_type: level
                    .volume_type
                    .clone()
                    .unwrap_or_else(|| "hostPath".to_string()),
                path: paths.join(","),
                mediumtype: mediumtypes.join(","),
                quota: quotas.join(","),
                high: level.high.clone(),
                low: level.low.clone(),
            });
        }
        TieredStoreValue { levels }
    }

    /// Stage 2: three-way union of labels and annotations, the more
    /// component-specific source winning on key collisions.
    pub(super) fn transform_pod_metadata(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> AlluxioValue {
        let common = &ctx.spec.pod_metadata;

        let (labels, annotations) =
            merge_pod_metadata(common, &ctx.spec.master.pod_metadata);
        value.master.labels = labels;
        value.master.annotations = annotations;

        let (labels, annotations) =
            merge_pod_metadata(common, &ctx.spec.worker.pod_metadata);
        value.worker.labels = labels;
        value.worker.annotations = annotations;

        let (labels, annotations) =
            merge_pod_metadata(common, &ctx.spec.fuse.pod_metadata);
        value.fuse.labels = labels;
        value.fuse.annotations = annotations;

        debug!("pod metadata merged for master/worker/fuse");
        value
    }

    /// Stage 1 helper shared with the metadata-sync path: the path of
    /// the first (hottest) tier, exported to worker environments for
    /// path alignment.
    pub(crate) fn tiered_store_level0_path(
        &self,
        value: &AlluxioValue,
    ) -> String {
        value
            .tieredstore
            .levels
            .first()
            .map(|l| l.path.clone())
            .unwrap_or_default()
    }
}

fn merge_pod_metadata(
    common: &PodMetadata,
    specific: &PodMetadata,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut labels = common.labels.clone();
    labels.extend(specific.labels.clone());
    let mut annotations = common.annotations.clone();
    annotations.extend(specific.annotations.clone());
    (labels, annotations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_relabels_binary_suffix() {
        assert_eq!(quota_to_runtime_unit("2Gi"), "2GB");
        assert_eq!(quota_to_runtime_unit("512Mi"), "512MB");
        assert_eq!(quota_to_runtime_unit("4G"), "4G");
        assert_eq!(quota_to_runtime_unit(" 1Ti "), "1TB");
    }

    #[test]
    fn quota_list_wins_over_single_quota() {
        let level = Level {
            mediumtype: "MEM".into(),
            quota: Some("1Gi".into()),
            quota_list: Some("2Gi,3Gi".into()),
            ..Default::default()
        };
        assert_eq!(level_quotas(&level, 2), vec!["2GB", "3GB"]);

        let level = Level {
            mediumtype: "MEM".into(),
            quota: Some("1Gi".into()),
            quota_list: None,
            ..Default::default()
        };
        assert_eq!(level_quotas(&level, 2), vec!["1GB", "1GB"]);
    }

    #[test]
    fn medium_rank_orders_tiers() {
        let mut mediums = vec!["HDD", "MEM", "SSD"];
        mediums.sort_by_key(|m| medium_rank(m));
        assert_eq!(mediums, vec!["MEM", "SSD", "HDD"]);
    }
}
