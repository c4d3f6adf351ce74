//! Host-port resolution for the cache cluster. Ports come from three
//! sources with strict precedence: a property the user (or a previous
//! reconcile) already set, an explicit per-component override in the
//! runtime spec, and finally the shared pool.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use tracing::debug;

use super::error::{EngineError, Result};
use crate::client::PortPool;
use crate::crd::AlluxioRuntimeSpec;

/// Named ports of the cluster in their fixed enumeration order. Pool
/// slots map positionally onto this order, so the order is part of the
/// persisted contract (release parses properties back in the same
/// order).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortKey {
    MasterRpc,
    MasterWeb,
    WorkerRpc,
    WorkerWeb,
    JobMasterRpc,
    JobMasterWeb,
    JobWorkerRpc,
    JobWorkerWeb,
    JobWorkerData,
    GatewayRest,
    MasterEmbedded,
    JobMasterEmbedded,
}

impl PortKey {
    pub fn property(self) -> &'static str {
        match self {
            PortKey::MasterRpc => "alluxio.master.rpc.port",
            PortKey::MasterWeb => "alluxio.master.web.port",
            PortKey::WorkerRpc => "alluxio.worker.rpc.port",
            PortKey::WorkerWeb => "alluxio.worker.web.port",
            PortKey::JobMasterRpc => "alluxio.job.master.rpc.port",
            PortKey::JobMasterWeb => "alluxio.job.master.web.port",
            PortKey::JobWorkerRpc => "alluxio.job.worker.rpc.port",
            PortKey::JobWorkerWeb => "alluxio.job.worker.web.port",
            PortKey::JobWorkerData => "alluxio.job.worker.data.port",
            PortKey::GatewayRest => "alluxio.proxy.web.port",
            PortKey::MasterEmbedded => "alluxio.master.embedded.journal.port",
            PortKey::JobMasterEmbedded => {
                "alluxio.job.master.embedded.journal.port"
            }
        }
    }

    /// Fixed assignment used when no component runs with host
    /// networking and the shared pool is not involved.
    fn static_default(self) -> u16 {
        match self {
            PortKey::MasterRpc => 19998,
            PortKey::MasterWeb => 19999,
            PortKey::WorkerRpc => 29999,
            PortKey::WorkerWeb => 30000,
            PortKey::JobMasterRpc => 20001,
            PortKey::JobMasterWeb => 20002,
            PortKey::JobWorkerRpc => 30001,
            PortKey::JobWorkerWeb => 30003,
            PortKey::JobWorkerData => 30002,
            PortKey::GatewayRest => 39999,
            PortKey::MasterEmbedded => 19200,
            PortKey::JobMasterEmbedded => 20003,
        }
    }
}

/// Enumeration order of the ports a deployment needs. The embedded
/// journal ports exist only for HA masters, the gateway port only when
/// the API gateway is enabled.
pub fn port_keys(api_gateway: bool, ha_master: bool) -> Vec<PortKey> {
    let mut keys = vec![
        PortKey::MasterRpc,
        PortKey::MasterWeb,
        PortKey::WorkerRpc,
        PortKey::WorkerWeb,
        PortKey::JobMasterRpc,
        PortKey::JobMasterWeb,
        PortKey::JobWorkerRpc,
        PortKey::JobWorkerWeb,
        PortKey::JobWorkerData,
    ];
    if api_gateway {
        keys.push(PortKey::GatewayRest);
    }
    if ha_master {
        keys.push(PortKey::MasterEmbedded);
        keys.push(PortKey::JobMasterEmbedded);
    }
    keys
}

/// Per-component port overrides declared in the runtime spec, keyed by
/// the named port they stand in for.
pub fn spec_port_overrides(
    spec: &AlluxioRuntimeSpec,
) -> BTreeMap<PortKey, u16> {
    let mut overrides = BTreeMap::new();
    let mut put = |key: PortKey, source: &BTreeMap<String, u16>, role: &str| {
        if let Some(port) = source.get(role) {
            overrides.insert(key, *port);
        }
    };
    put(PortKey::MasterRpc, &spec.master.ports, "rpc");
    put(PortKey::MasterWeb, &spec.master.ports, "web");
    put(PortKey::MasterEmbedded, &spec.master.ports, "embedded");
    put(PortKey::WorkerRpc, &spec.worker.ports, "rpc");
    put(PortKey::WorkerWeb, &spec.worker.ports, "web");
    put(PortKey::JobMasterRpc, &spec.job_master.ports, "rpc");
    put(PortKey::JobMasterWeb, &spec.job_master.ports, "web");
    put(
        PortKey::JobMasterEmbedded,
        &spec.job_master.ports,
        "embedded",
    );
    put(PortKey::JobWorkerRpc, &spec.job_worker.ports, "rpc");
    put(PortKey::JobWorkerWeb, &spec.job_worker.ports, "web");
    put(PortKey::JobWorkerData, &spec.job_worker.ports, "data");
    put(PortKey::GatewayRest, &spec.api_gateway.ports, "rest");
    overrides
}

/// Resolves every requested port. The pool is asked once for the full
/// count up front; slots shadowed by an explicit property or a spec
/// override are skipped positionally and deliberately never handed
/// back mid-allocation.
pub fn allocate_ports(
    keys: &[PortKey],
    explicit_properties: &BTreeMap<String, String>,
    overrides: &BTreeMap<PortKey, u16>,
    pool: &dyn PortPool,
) -> Result<BTreeMap<PortKey, u16>> {
    let pooled = pool.get_available_ports(keys.len())?;
    let mut assigned = BTreeMap::new();
    for (idx, key) in keys.iter().enumerate() {
        if let Some(port) = explicit_properties
            .get(key.property())
            .and_then(|v| v.trim().parse::<u16>().ok())
        {
            debug!(port, property = key.property(), "reusing preset port");
            assigned.insert(*key, port);
            continue;
        }
        if let Some(port) = overrides.get(key) {
            debug!(port, property = key.property(), "using spec port override");
            assigned.insert(*key, *port);
            continue;
        }
        assigned.insert(*key, pooled[idx]);
    }
    Ok(assigned)
}

/// The non-host-network assignment: every port gets its documented
/// fixed default and the pool is never consulted.
pub fn static_ports(keys: &[PortKey]) -> BTreeMap<PortKey, u16> {
    keys.iter().map(|k| (*k, k.static_default())).collect()
}

/// Reads the reserved ports back out of the persisted values ConfigMap
/// so the pool can reclaim them. Ports absent from the properties map
/// are skipped; an undecodable payload is a parse error.
pub fn parse_ports_from_config_map(
    config_map: &ConfigMap,
) -> Result<Vec<u16>> {
    let payload = config_map
        .data
        .as_ref()
        .and_then(|d| d.get("data"))
        .ok_or_else(|| {
            EngineError::Parse(
                "values config map has no data entry".to_string(),
            )
        })?;
    let doc: serde_yaml::Value =
        serde_yaml::from_str(payload).map_err(|e| {
            EngineError::Parse(format!("undecodable values payload: {e}"))
        })?;

    let mut ports = Vec::new();
    if let Some(serde_yaml::Value::Mapping(properties)) =
        doc.get("properties")
    {
        for key in port_keys(true, true) {
            let value = properties
                .iter()
                .find(|(k, _)| k.as_str() == Some(key.property()))
                .map(|(_, v)| v);
            let parsed = match value {
                Some(serde_yaml::Value::String(s)) => s.trim().parse().ok(),
                Some(serde_yaml::Value::Number(n)) => {
                    n.as_u64().and_then(|v| u16::try_from(v).ok())
                }
                _ => None,
            };
            if let Some(port) = parsed {
                ports.push(port);
            }
        }
    }
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PortPoolError;
    use std::sync::Mutex;

    struct CountingPool {
        next: Mutex<u16>,
        handed_out: Mutex<usize>,
    }

    impl CountingPool {
        fn new(start: u16) -> Self {
            Self {
                next: Mutex::new(start),
                handed_out: Mutex::new(0),
            }
        }
    }

    impl PortPool for CountingPool {
        fn get_available_ports(
            &self,
            count: usize,
        ) -> std::result::Result<Vec<u16>, PortPoolError> {
            let mut next = self.next.lock().unwrap();
            *self.handed_out.lock().unwrap() += count;
            let ports = (*next..*next + count as u16).collect();
            *next += count as u16;
            Ok(ports)
        }

        fn release_reserved_ports(&self, _ports: Vec<u16>) {}
    }

    struct EmptyPool;

    impl PortPool for EmptyPool {
        fn get_available_ports(
            &self,
            count: usize,
        ) -> std::result::Result<Vec<u16>, PortPoolError> {
            Err(PortPoolError {
                requested: count,
                reason: "pool exhausted".into(),
            })
        }

        fn release_reserved_ports(&self, _ports: Vec<u16>) {}
    }

    #[test]
    fn enumeration_order_is_fixed() {
        let keys = port_keys(false, false);
        assert_eq!(keys.len(), 9);
        assert_eq!(keys[0], PortKey::MasterRpc);
        assert_eq!(keys[8], PortKey::JobWorkerData);
        let all = port_keys(true, true);
        assert_eq!(all.len(), 12);
        assert_eq!(all[9], PortKey::GatewayRest);
        assert_eq!(all[11], PortKey::JobMasterEmbedded);
    }

    #[test]
    fn pool_slots_are_positional() {
        let pool = CountingPool::new(20000);
        let keys = port_keys(false, false);
        let assigned =
            allocate_ports(&keys, &BTreeMap::new(), &BTreeMap::new(), &pool)
                .unwrap();
        assert_eq!(assigned[&PortKey::MasterRpc], 20000);
        assert_eq!(assigned[&PortKey::JobWorkerData], 20008);
        assert_eq!(*pool.handed_out.lock().unwrap(), 9);
    }

    #[test]
    fn explicit_property_wins_and_skips_pool_slot() {
        let pool = CountingPool::new(20000);
        let keys = port_keys(false, false);
        let mut props = BTreeMap::new();
        props.insert(
            "alluxio.master.rpc.port".to_string(),
            "19998".to_string(),
        );
        let mut overrides = BTreeMap::new();
        overrides.insert(PortKey::WorkerRpc, 31000u16);

        let assigned =
            allocate_ports(&keys, &props, &overrides, &pool).unwrap();
        assert_eq!(assigned[&PortKey::MasterRpc], 19998);
        assert_eq!(assigned[&PortKey::WorkerRpc], 31000);
        // positional: slot 1 still goes to MasterWeb, slots 0 and 2 are
        // simply wasted
        assert_eq!(assigned[&PortKey::MasterWeb], 20001);
        assert_eq!(assigned[&PortKey::WorkerWeb], 20003);
        // the pool is still asked for the full count exactly once
        assert_eq!(*pool.handed_out.lock().unwrap(), 9);
    }

    #[test]
    fn exhausted_pool_aborts_allocation() {
        let keys = port_keys(true, true);
        let res = allocate_ports(
            &keys,
            &BTreeMap::new(),
            &BTreeMap::new(),
            &EmptyPool,
        );
        assert!(matches!(res, Err(EngineError::Allocation(_))));
    }

    #[test]
    fn static_mode_uses_documented_constants() {
        let assigned = static_ports(&port_keys(false, false));
        assert_eq!(assigned[&PortKey::MasterRpc], 19998);
        assert_eq!(assigned[&PortKey::MasterWeb], 19999);
        assert_eq!(assigned[&PortKey::WorkerRpc], 29999);
        assert_eq!(assigned[&PortKey::JobWorkerData], 30002);
    }

    #[test]
    fn parses_reserved_ports_from_values_payload() {
        let payload = r#"
fullnameOverride: demo
properties:
  alluxio.master.rpc.port: "20000"
  alluxio.master.web.port: "20001"
  alluxio.worker.rpc.port: "20002"
  alluxio.worker.web.port: "20003"
  alluxio.job.master.rpc.port: "20004"
  alluxio.job.master.web.port: "20005"
  alluxio.job.worker.rpc.port: "20006"
  alluxio.job.worker.web.port: "20007"
  alluxio.job.worker.data.port: "20008"
  alluxio.master.journal.type: UFS
"#;
        let cm = ConfigMap {
            data: Some(
                [("data".to_string(), payload.to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        let ports = parse_ports_from_config_map(&cm).unwrap();
        assert_eq!(
            ports,
            vec![20000, 20001, 20002, 20003, 20004, 20005, 20006, 20007, 20008]
        );
    }

    #[test]
    fn undecodable_values_payload_is_a_parse_error() {
        let cm = ConfigMap {
            data: Some(
                [("data".to_string(), ":\nnot yaml: [".to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        assert!(matches!(
            parse_ports_from_config_map(&cm),
            Err(EngineError::Parse(_))
        ));
    }
}
