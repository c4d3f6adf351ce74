//! The ordered configuration-assembly pipeline: thirteen stages over an
//! accumulated [`AlluxioValue`], each taking the value by move and
//! handing back the enriched one, so stage ordering and the
//! cross-stage data dependencies are visible right here in the driver.

pub mod common;
pub mod fuse;
pub mod master;
pub mod mounts;
pub mod optimization;
pub mod worker;

use tracing::{info, instrument};

use super::error::Result;
use super::value::AlluxioValue;
use super::{AlluxioEngine, ports};
use crate::crd::{AlluxioRuntime, AlluxioRuntimeSpec, Dataset};

/// Read-only inputs shared by every stage.
pub struct TransformContext<'a> {
    pub runtime: &'a AlluxioRuntime,
    pub spec: &'a AlluxioRuntimeSpec,
    pub dataset: &'a Dataset,
}

impl<'a> TransformContext<'a> {
    pub fn new(runtime: &'a AlluxioRuntime, dataset: &'a Dataset) -> Self {
        Self {
            runtime,
            spec: &runtime.spec,
            dataset,
        }
    }
}

impl AlluxioEngine {
    /// Maps the runtime + dataset pair to a deployment configuration.
    /// Stage order is a contract: port allocation (11) must see the
    /// API-gateway and network decisions of earlier stages, and the
    /// property backfill (12) must see every allocated port.
    #[instrument(skip_all, fields(ns = %self.namespace, name = %self.name))]
    pub async fn transform(
        &self,
        runtime: &AlluxioRuntime,
    ) -> Result<AlluxioValue> {
        let dataset = self.dataset().await?;
        let ctx = TransformContext::new(runtime, &dataset);

        let value = AlluxioValue::new(self.name.clone());
        let value = self.transform_common_part(&ctx, value)?; // 1
        let value = self.transform_pod_metadata(&ctx, value); // 2
        let value = self.transform_masters(&ctx, value).await?; // 3
        let value = self.transform_workers(&ctx, value)?; // 4
        let value = self.transform_fuse(&ctx, value)?; // 5
        let value = self.transform_hadoop_config(&ctx, value).await?; // 6
        let value = self.transform_short_circuit(&ctx, value); // 6
        let value = self.transform_dataset_to_volume(&ctx, value); // 7
        let value = self.transform_permission(&ctx, value); // 8
        let value = self.optimize_default_properties(&ctx, value); // 9
        let value = self.optimize_properties_for_http(&ctx, value); // 10
        let value = self.allocate_cluster_ports(&ctx, value)?; // 11
        let value = self.set_port_properties(&ctx, value); // 12
        let value = self.transform_api_gateway_and_placement(&ctx, value); // 13

        info!(properties = value.properties.len(), "transform complete");
        Ok(value)
    }

    /// Stage 11: branch on host networking. Without it every port gets
    /// its fixed default; with it the shared pool fills whatever the
    /// properties and spec overrides left open.
    fn allocate_cluster_ports(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> Result<AlluxioValue> {
        let ha_master = value.master.replicas > 1;
        let keys =
            ports::port_keys(ctx.spec.api_gateway.enabled, ha_master);

        let assigned = if !value.master.host_network
            && !value.worker.host_network
        {
            ports::static_ports(&keys)
        } else {
            let overrides = ports::spec_port_overrides(ctx.spec);
            ports::allocate_ports(
                &keys,
                &value.properties,
                &overrides,
                self.port_pool.as_ref(),
            )?
        };

        for (key, port) in assigned {
            match key {
                ports::PortKey::MasterRpc => value.master.ports.rpc = port,
                ports::PortKey::MasterWeb => value.master.ports.web = port,
                ports::PortKey::WorkerRpc => value.worker.ports.rpc = port,
                ports::PortKey::WorkerWeb => value.worker.ports.web = port,
                ports::PortKey::JobMasterRpc => {
                    value.job_master.ports.rpc = port
                }
                ports::PortKey::JobMasterWeb => {
                    value.job_master.ports.web = port
                }
                ports::PortKey::JobWorkerRpc => {
                    value.job_worker.ports.rpc = port
                }
                ports::PortKey::JobWorkerWeb => {
                    value.job_worker.ports.web = port
                }
                ports::PortKey::JobWorkerData => {
                    value.job_worker.ports.data = port
                }
                ports::PortKey::GatewayRest => {
                    value
                        .api_gateway
                        .get_or_insert_with(Default::default)
                        .ports
                        .rest = port;
                }
                ports::PortKey::MasterEmbedded => {
                    value.master.ports.embedded = port
                }
                ports::PortKey::JobMasterEmbedded => {
                    value.job_master.ports.embedded = port
                }
            }
        }
        Ok(value)
    }

    /// Stage 12: every allocated port is mirrored into its named
    /// property so downstream templating sees ports uniformly,
    /// whichever allocation path ran.
    fn set_port_properties(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> AlluxioValue {
        let mut pairs: Vec<(ports::PortKey, u16)> = vec![
            (ports::PortKey::MasterRpc, value.master.ports.rpc),
            (ports::PortKey::MasterWeb, value.master.ports.web),
            (ports::PortKey::WorkerRpc, value.worker.ports.rpc),
            (ports::PortKey::WorkerWeb, value.worker.ports.web),
            (ports::PortKey::JobMasterRpc, value.job_master.ports.rpc),
            (ports::PortKey::JobMasterWeb, value.job_master.ports.web),
            (ports::PortKey::JobWorkerRpc, value.job_worker.ports.rpc),
            (ports::PortKey::JobWorkerWeb, value.job_worker.ports.web),
            (ports::PortKey::JobWorkerData, value.job_worker.ports.data),
        ];
        if ctx.spec.api_gateway.enabled {
            if let Some(gateway) = &value.api_gateway {
                pairs.push((ports::PortKey::GatewayRest, gateway.ports.rest));
            }
        }
        if value.master.ports.embedded != 0
            && value.job_master.ports.embedded != 0
        {
            pairs.push((
                ports::PortKey::MasterEmbedded,
                value.master.ports.embedded,
            ));
            pairs.push((
                ports::PortKey::JobMasterEmbedded,
                value.job_master.ports.embedded,
            ));
        }
        for (key, port) in pairs {
            value
                .properties
                .entry(key.property().to_string())
                .or_insert_with(|| port.to_string());
        }

        // HA masters address each other through the embedded journal
        if value.master.replicas > 1 {
            let addresses: Vec<String> = (0..value.master.replicas)
                .map(|i| {
                    format!(
                        "{}-master-{}:{}",
                        value.fullname_override,
                        i,
                        value.master.ports.embedded
                    )
                })
                .collect();
            value
                .properties
                .entry(
                    "alluxio.master.embedded.journal.addresses".to_string(),
                )
                .or_insert_with(|| addresses.join(","));
        }
        value
    }

    /// Stage 13: gateway enablement passthrough and placement-mode
    /// defaulting.
    fn transform_api_gateway_and_placement(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> AlluxioValue {
        if ctx.spec.api_gateway.enabled {
            value
                .api_gateway
                .get_or_insert_with(Default::default)
                .enabled = true;
        }
        value.placement = ctx
            .dataset
            .spec
            .placement
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "exclusive".to_string());
        value
    }
}
