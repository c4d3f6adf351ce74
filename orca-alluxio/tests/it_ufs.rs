//! Backing-storage mount application and the install path.

mod common;

use common::{MemState, TestHarness};
use orca_alluxio::crd::dataset::Mount;
use orca_alluxio::crd::runtime::AlluxioRuntimeSpec;
use orca_alluxio::crd::{AlluxioRuntime, Dataset, DatasetSpec};

fn two_mount_dataset() -> Dataset {
    Dataset::new(
        "demo",
        DatasetSpec {
            mounts: vec![
                Mount {
                    mount_point: "s3://bucket/a".to_string(),
                    name: "a".to_string(),
                    ..Default::default()
                },
                Mount {
                    mount_point: "s3://bucket/b".to_string(),
                    name: "b".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        },
    )
}

fn harness() -> TestHarness {
    TestHarness::new(MemState {
        dataset: Some(two_mount_dataset()),
        runtime: Some(AlluxioRuntime::new(
            "demo",
            AlluxioRuntimeSpec::default(),
        )),
        ..Default::default()
    })
}

#[tokio::test]
async fn prepare_ufs_mounts_only_missing_mount_points() {
    let h = harness();
    h.runner.with_output("alluxio fsadmin report", "ok");
    // /a is already in the mount table, /b is not
    h.runner.with_output(
        "alluxio fs mount",
        "s3://bucket/a  on  /a (properties)\n\
         /underFSStorage  on  / (properties)\n",
    );
    h.runner.with_output("alluxio fs mount /b s3://bucket/b", "Mounted");
    let engine = h.engine();

    engine.prepare_ufs().await.unwrap();

    let calls = h.runner.calls.lock().unwrap();
    assert!(calls.iter().any(|c| c == "alluxio fs mount /b s3://bucket/b"));
    assert!(!calls.iter().any(|c| c.starts_with("alluxio fs mount /a")));

    let state = h.store.state.lock().unwrap();
    let mount_time = state
        .runtime
        .as_ref()
        .and_then(|r| r.status.as_ref())
        .and_then(|s| s.mount_time.clone());
    assert!(mount_time.is_some());
}

#[tokio::test]
async fn prepare_ufs_requires_a_ready_master() {
    let h = harness();
    // no scripted commands at all: the readiness probe fails
    let engine = h.engine();
    let err = engine.prepare_ufs().await.unwrap_err();
    assert!(err.to_string().contains("not ready"));
}

#[tokio::test]
async fn setup_installs_once_and_skips_when_present() {
    let h = harness();
    let engine = h.engine();
    let runtime = h.store.state.lock().unwrap().runtime.clone().unwrap();

    let installed = engine.setup_cluster(&runtime).await.unwrap();
    assert!(installed);
    let values = h.releases.installed.lock().unwrap().clone().unwrap();
    assert_eq!(values["fullnameOverride"], "demo");
    assert!(values["properties"]["alluxio.master.rpc.port"].is_string());

    // second reconcile finds the release and leaves it alone
    let installed_again = engine.setup_cluster(&runtime).await.unwrap();
    assert!(!installed_again);
}
