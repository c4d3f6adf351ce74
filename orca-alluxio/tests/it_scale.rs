//! Scale-down label surgery and scale-up labeling against the
//! in-memory object store.

mod common;

use std::collections::BTreeMap;

use common::{MemState, TestHarness};
use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeStatus};
use kube::api::ObjectMeta;
use orca_alluxio::crd::runtime::{AlluxioRuntimeSpec, Level, TieredStore};
use orca_alluxio::crd::{AlluxioRuntime, Dataset, DatasetSpec};

const COMMON_LABEL: &str = "orca.io/s-big-data-demo";
const RUNTIME_LABEL: &str = "orca.io/s-alluxio-big-data-demo";
const TOTAL_LABEL: &str = "orca.io/s-h-alluxio-t-big-data-demo";
const MEM_LABEL: &str = "orca.io/s-h-alluxio-m-big-data-demo";
const NUM_LABEL: &str = "orca.io/dataset-num";
const EXCLUSIVE_LABEL: &str = "orca.io/exclusive";

fn worker_node(name: &str, ip: &str, dataset_num: &str) -> Node {
    let mut labels = BTreeMap::new();
    labels.insert(COMMON_LABEL.to_string(), "true".to_string());
    labels.insert(RUNTIME_LABEL.to_string(), "true".to_string());
    labels.insert(TOTAL_LABEL.to_string(), "2GiB".to_string());
    labels.insert(MEM_LABEL.to_string(), "2GiB".to_string());
    labels.insert(NUM_LABEL.to_string(), dataset_num.to_string());
    labels.insert(EXCLUSIVE_LABEL.to_string(), "big-data_demo".to_string());
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        status: Some(NodeStatus {
            addresses: Some(vec![NodeAddress {
                type_: "InternalIP".to_string(),
                address: ip.to_string(),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn capacity_report() -> &'static str {
    "Capacity information for all workers: \n\
     \x20   Total Capacity: 4096.00MB\n\
     \x20   Used Capacity: 443.89MB\n\
     \n\
     Worker Name      Last Heartbeat   Storage       MEM\n\
     10.0.0.1         0                capacity      2048.00MB\n\
     \x20                                used          443.89MB (21%)\n\
     10.0.0.2         0                capacity      2048.00MB\n\
     \x20                                used          0B (0%)\n"
}

fn harness_with_nodes(nodes: Vec<Node>) -> TestHarness {
    let mut state = MemState {
        dataset: Some(Dataset::new("demo", DatasetSpec::default())),
        runtime: Some(AlluxioRuntime::new(
            "demo",
            AlluxioRuntimeSpec::default(),
        )),
        ..Default::default()
    };
    for node in nodes {
        let name = node.metadata.name.clone().unwrap();
        state.nodes.insert(name, node);
    }
    TestHarness::new(state)
}

#[tokio::test]
async fn shrink_to_target_removes_least_cached_node_first() {
    let h = harness_with_nodes(vec![
        worker_node("n1", "10.0.0.1", "2"),
        worker_node("n2", "10.0.0.2", "1"),
    ]);
    h.runner
        .with_output("alluxio fsadmin report capacity", capacity_report());
    let engine = h.engine();

    let remaining = engine.destroy_workers(1).await.unwrap();
    assert_eq!(remaining, 1);

    let state = h.store.state.lock().unwrap();
    // n2 held no cached data and goes first
    let n2_labels = state.nodes["n2"].metadata.labels.as_ref().unwrap();
    assert!(!n2_labels.contains_key(COMMON_LABEL));
    assert!(!n2_labels.contains_key(RUNTIME_LABEL));
    assert!(!n2_labels.contains_key(TOTAL_LABEL));
    assert!(!n2_labels.contains_key(MEM_LABEL));
    // count was 1, so the key is gone rather than left at "0"
    assert!(!n2_labels.contains_key(NUM_LABEL));
    assert!(!n2_labels.contains_key(EXCLUSIVE_LABEL));

    // n1 keeps serving the dataset untouched
    let n1_labels = state.nodes["n1"].metadata.labels.as_ref().unwrap();
    assert_eq!(n1_labels[COMMON_LABEL], "true");
    assert_eq!(n1_labels[NUM_LABEL], "2");
}

#[tokio::test]
async fn shrink_decrements_shared_counter_for_shared_nodes() {
    let mut node = worker_node("n1", "10.0.0.1", "3");
    // node is shared with another dataset, not ours exclusively
    node.metadata
        .labels
        .as_mut()
        .unwrap()
        .insert(EXCLUSIVE_LABEL.to_string(), "other-ns_other".to_string());
    let h = harness_with_nodes(vec![node]);
    let engine = h.engine();

    let remaining = engine.destroy_workers(0).await.unwrap();
    assert_eq!(remaining, 0);

    let state = h.store.state.lock().unwrap();
    let labels = state.nodes["n1"].metadata.labels.as_ref().unwrap();
    assert_eq!(labels[NUM_LABEL], "2");
    // someone else's exclusivity marker must survive
    assert_eq!(labels[EXCLUSIVE_LABEL], "other-ns_other");
}

#[tokio::test]
async fn shrink_is_noop_when_target_not_below_current() {
    let h = harness_with_nodes(vec![worker_node("n1", "10.0.0.1", "1")]);
    let engine = h.engine();

    let remaining = engine.destroy_workers(5).await.unwrap();
    assert_eq!(remaining, 1);
    let state = h.store.state.lock().unwrap();
    assert!(state.nodes["n1"]
        .metadata
        .labels
        .as_ref()
        .unwrap()
        .contains_key(COMMON_LABEL));
}

#[tokio::test]
async fn label_surgery_retries_through_write_conflicts() {
    let h = harness_with_nodes(vec![worker_node("n1", "10.0.0.1", "1")]);
    *h.store.node_update_conflicts.lock().unwrap() = 2;
    let engine = h.engine();

    let remaining = engine.destroy_workers(0).await.unwrap();
    assert_eq!(remaining, 0);
    let state = h.store.state.lock().unwrap();
    assert!(!state.nodes["n1"]
        .metadata
        .labels
        .as_ref()
        .unwrap()
        .contains_key(COMMON_LABEL));
}

#[tokio::test]
async fn capacity_lookup_failure_keeps_input_order() {
    // no scripted capacity report: the sort preference is skipped and
    // nodes are removed in listing order
    let h = harness_with_nodes(vec![
        worker_node("a1", "10.0.0.1", "1"),
        worker_node("a2", "10.0.0.2", "1"),
    ]);
    let engine = h.engine();

    let remaining = engine.destroy_workers(1).await.unwrap();
    assert_eq!(remaining, 1);
    let state = h.store.state.lock().unwrap();
    assert!(!state.nodes["a1"]
        .metadata
        .labels
        .as_ref()
        .unwrap()
        .contains_key(COMMON_LABEL));
    assert!(state.nodes["a2"]
        .metadata
        .labels
        .as_ref()
        .unwrap()
        .contains_key(COMMON_LABEL));
}

#[tokio::test]
async fn assign_labels_fresh_nodes_up_to_desired_count() {
    let fresh = |name: &str| Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let h = harness_with_nodes(vec![fresh("n1"), fresh("n2"), fresh("n3")]);
    {
        let mut state = h.store.state.lock().unwrap();
        let runtime = state.runtime.as_mut().unwrap();
        runtime.spec.tieredstore = TieredStore {
            levels: vec![Level {
                mediumtype: "MEM".to_string(),
                quota: Some("2Gi".to_string()),
                path: "/dev/shm".to_string(),
                ..Default::default()
            }],
        };
    }
    let engine = h.engine();

    let assigned = engine.assign_nodes_to_cache(2).await.unwrap();
    assert_eq!(assigned, 2);

    let state = h.store.state.lock().unwrap();
    let labeled: Vec<_> = state
        .nodes
        .values()
        .filter(|n| {
            n.metadata
                .labels
                .as_ref()
                .map(|l| l.contains_key(COMMON_LABEL))
                .unwrap_or(false)
        })
        .collect();
    assert_eq!(labeled.len(), 2);
    let labels = labeled[0].metadata.labels.as_ref().unwrap();
    assert_eq!(labels[NUM_LABEL], "1");
    assert_eq!(labels[MEM_LABEL], "2GiB");
    assert_eq!(labels[TOTAL_LABEL], "2GiB");
    // blank placement means exclusive
    assert_eq!(labels[EXCLUSIVE_LABEL], "big-data_demo");
}
