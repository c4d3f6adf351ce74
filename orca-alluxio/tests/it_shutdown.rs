//! Tear-down: cache drain gating, port release and object cleanup.

mod common;

use common::{MemState, TestHarness};
use k8s_openapi::api::core::v1::ConfigMap;
use orca_alluxio::client::WorkloadStatus;
use orca_alluxio::crd::runtime::AlluxioRuntimeSpec;
use orca_alluxio::crd::{AlluxioRuntime, Dataset, DatasetSpec};

const VALUES_PAYLOAD: &str = r#"
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
"#;

const EMPTY_SUMMARY: &str = "Alluxio cluster summary: \n\
    \x20   Total Capacity: 19.07MB\n\
    \x20   Used Capacity: 0B\n";

fn values_config_map() -> ConfigMap {
    ConfigMap {
        data: Some(
            [("data".to_string(), VALUES_PAYLOAD.to_string())]
                .into_iter()
                .collect(),
        ),
        ..Default::default()
    }
}

fn harness() -> TestHarness {
    let mut state = MemState {
        dataset: Some(Dataset::new("demo", DatasetSpec::default())),
        runtime: Some(AlluxioRuntime::new(
            "demo",
            AlluxioRuntimeSpec::default(),
        )),
        ..Default::default()
    };
    state
        .config_maps
        .insert("demo-alluxio-values".to_string(), values_config_map());
    state
        .config_maps
        .insert("demo-config".to_string(), ConfigMap::default());
    TestHarness::new(state)
}

#[tokio::test]
async fn clean_shutdown_releases_ports_and_objects() {
    let h = harness();
    h.runner
        .with_output("alluxio fsadmin report summary", EMPTY_SUMMARY);
    h.runner.with_output("alluxio fsadmin report metrics", "");
    let mut engine = h.engine();
    // have a release installed to delete
    h.releases
        .installed
        .lock()
        .unwrap()
        .replace(serde_json::json!({}));

    engine.shutdown().await.unwrap();

    assert!(h.releases.installed.lock().unwrap().is_none());
    assert_eq!(
        *h.pool.released.lock().unwrap(),
        vec![20000, 20001, 20002, 20003, 20004, 20005, 20006, 20007, 20008]
    );
    let state = h.store.state.lock().unwrap();
    assert!(state.config_maps.is_empty());
}

#[tokio::test]
async fn shutdown_waits_for_cache_drain() {
    let h = harness();
    h.runner.with_output(
        "alluxio fsadmin report summary",
        "Alluxio cluster summary: \n\
         \x20   Total Capacity: 19.07MB\n\
         \x20   Used Capacity: 9.69MB\n",
    );
    h.runner.with_output("alluxio fsadmin report metrics", "");
    h.runner.with_output("alluxio fs free -f /", "freed");
    {
        let mut state = h.store.state.lock().unwrap();
        state.workloads.insert(
            "demo-master".to_string(),
            WorkloadStatus {
                replicas: 1,
                ready_replicas: 1,
            },
        );
    }
    let mut engine = h.engine();

    // cache still holds data: the free command runs and shutdown asks
    // to be retried
    let err = engine.shutdown().await.unwrap_err();
    assert!(err.to_string().contains("not ready"));
    assert!(h
        .runner
        .calls
        .lock()
        .unwrap()
        .iter()
        .any(|c| c == "alluxio fs free -f /"));
    // nothing was torn down yet
    assert!(!h.store.state.lock().unwrap().config_maps.is_empty());

    // once the cache reads empty the teardown completes
    h.runner
        .with_output("alluxio fsadmin report summary", EMPTY_SUMMARY);
    engine.shutdown().await.unwrap();
    assert!(h.store.state.lock().unwrap().config_maps.is_empty());
}

#[tokio::test]
async fn never_deployed_runtime_shuts_down_without_ports() {
    let h = harness();
    h.runner
        .with_output("alluxio fsadmin report summary", EMPTY_SUMMARY);
    h.runner.with_output("alluxio fsadmin report metrics", "");
    {
        let mut state = h.store.state.lock().unwrap();
        state.config_maps.remove("demo-alluxio-values");
    }
    let mut engine = h.engine();

    engine.shutdown().await.unwrap();
    assert!(h.pool.released.lock().unwrap().is_empty());
}
