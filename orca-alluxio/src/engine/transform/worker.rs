//! Stage 4: worker component transform.

use super::master::select_component_volumes;
use super::TransformContext;
use crate::engine::error::Result;
use crate::engine::units;
use crate::engine::value::AlluxioValue;
use crate::engine::AlluxioEngine;

impl AlluxioEngine {
    pub(super) fn transform_workers(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> Result<AlluxioValue> {
        let spec = &ctx.spec.worker;

        value.worker.jvm_options = if spec.jvm_options.is_empty() {
            vec![
                "-Xmx12G".to_string(),
                "-XX:+UnlockExperimentalVMOptions".to_string(),
                "-XX:MaxDirectMemorySize=32g".to_string(),
            ]
        } else {
            spec.jvm_options.clone()
        };

        // workers are scheduled purely by the dataset assignment label
        value.worker.node_selector = spec.node_selector.clone();
        value
            .worker
            .node_selector
            .insert(self.common_label_name(), "true".to_string());

        value.worker.properties = spec.properties.clone();

        value.worker.env = spec.env.clone();
        value.worker.env.insert(
            "ALLUXIO_WORKER_TIEREDSTORE_LEVEL0_DIRS_PATH".to_string(),
            self.tiered_store_level0_path(&value),
        );

        value.worker.host_network = spec.uses_host_network();

        value.worker.resources = self.transform_worker_resources(ctx);

        let (volumes, volume_mounts) = select_component_volumes(ctx, spec)?;
        value.worker.volumes = volumes;
        value.worker.volume_mounts = volume_mounts;

        Ok(value)
    }

    /// The worker must be able to hold the memory tier in RAM, so its
    /// memory request is raised to at least the memory-tier quota.
    fn transform_worker_resources(
        &self,
        ctx: &TransformContext<'_>,
    ) -> Option<crate::crd::ResourcesSpec> {
        let mut resources =
            ctx.spec.worker.resources.clone().unwrap_or_default();

        let memory_tier_bytes: i64 = ctx
            .spec
            .tieredstore
            .levels
            .iter()
            .filter(|l| l.mediumtype == "MEM")
            .filter_map(|l| l.quota.as_deref())
            .filter_map(|q| units::parse_human_size(q).ok())
            .sum();

        if memory_tier_bytes > 0 {
            let requested = resources
                .requests
                .get("memory")
                .and_then(|q| units::parse_human_size(q).ok())
                .unwrap_or_default();
            if requested < memory_tier_bytes {
                let quota = ctx
                    .spec
                    .tieredstore
                    .levels
                    .iter()
                    .find(|l| l.mediumtype == "MEM")
                    .and_then(|l| l.quota.clone())
                    .unwrap_or_default();
                resources.requests.insert("memory".to_string(), quota);
            }
        }

        if resources.requests.is_empty() && resources.limits.is_empty() {
            ctx.spec.worker.resources.clone()
        } else {
            Some(resources)
        }
    }
}
