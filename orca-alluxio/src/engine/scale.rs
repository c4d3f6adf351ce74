//! Scale-down: pick the cheapest workers to evict and peel this
//! dataset's labels off their nodes.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::Node;
use tracing::{debug, info, warn};

use super::error::Result;
use super::{report, AlluxioEngine};
use crate::client::retry::{retry_on_conflict, ConflictRetry};
use crate::client::StoreError;

impl AlluxioEngine {
    /// Shrinks the labeled node set until `expected_workers` remain;
    /// `-1` removes every worker. Returns how many workers are left.
    /// Candidates are visited least-cached-first so eviction loses as
    /// little cache as possible.
    pub async fn destroy_workers(
        &self,
        expected_workers: i32,
    ) -> Result<i32> {
        let selector = format!("{}=true", self.common_label_name());
        let mut nodes = self.store.list_nodes(&selector).await?;
        let mut current_workers = nodes.len() as i32;

        if expected_workers >= current_workers {
            debug!(
                expected_workers,
                current_workers, "no need to scale in, skipping"
            );
            return Ok(current_workers);
        }

        // preference only: capacity lookup failures leave the input
        // order untouched
        if expected_workers >= 0 && nodes.len() >= 2 {
            match self.worker_used_capacity().await {
                Ok(used) => sort_nodes_by_used_capacity(&mut nodes, &used),
                Err(err) => {
                    info!(error = %err, "can't get worker used capacity when scaling in");
                }
            }
        }

        for node in &nodes {
            if expected_workers == current_workers {
                break;
            }
            let Some(node_name) = node.metadata.name.as_deref() else {
                continue;
            };
            let has_labels = node
                .metadata
                .labels
                .as_ref()
                .map(|l| !l.is_empty())
                .unwrap_or(false);
            if !has_labels {
                // nothing of ours (or anyone's) on this node
                continue;
            }

            retry_on_conflict(ConflictRetry::default(), || {
                self.remove_cache_labels_once(node_name)
            })
            .await?;
            info!(node = %node_name, dataset = %self.name, "removed cache worker labels");
            current_workers -= 1;
        }

        Ok(current_workers)
    }

    /// One optimistic attempt at the full label surgery for a node:
    /// re-read, strip every label group belonging to this dataset, and
    /// write back. Conflicts restart the whole attempt so the multi-key
    /// update stays all-or-nothing.
    async fn remove_cache_labels_once(
        &self,
        node_name: &str,
    ) -> std::result::Result<(), StoreError> {
        let node = self.store.get_node(node_name).await?;
        let mut to_update = node.clone();
        let labels = to_update
            .metadata
            .labels
            .get_or_insert_with(Default::default);

        for label in [
            self.runtime_label_name(),
            self.storage_label_name("t"),
            self.storage_label_name("d"),
            self.storage_label_name("m"),
            self.common_label_name(),
        ] {
            labels.remove(&label);
        }

        let exclusive_key = self.exclusive_label_name();
        if labels.get(exclusive_key)
            == Some(&self.exclusive_label_value())
        {
            labels.remove(exclusive_key);
        }

        decrement_count_label(labels, self.dataset_num_label_name());

        if node.metadata.labels.as_ref() != Some(&*labels) {
            self.store.update_node(&to_update).await?;
        }
        Ok(())
    }

    pub(crate) async fn worker_used_capacity(
        &self,
    ) -> Result<HashMap<String, i64>> {
        let capacity_report = self.file_utils().report_capacity().await?;
        report::parse_capacity_report(&capacity_report)
    }

    /// Scale-up counterpart: label eligible nodes until `desired`
    /// carry this dataset. Returns how many are assigned afterwards.
    pub async fn assign_nodes_to_cache(&self, desired: i32) -> Result<i32> {
        let dataset = self.dataset().await?;
        let runtime = self.runtime().await?;
        let selector = format!("{}=true", self.common_label_name());
        let scheduled = self.store.list_nodes(&selector).await?;
        let mut assigned: Vec<String> = scheduled
            .iter()
            .filter_map(|n| n.metadata.name.clone())
            .collect();

        let all_nodes = self.store.list_nodes("").await?;
        for node in &all_nodes {
            if assigned.len() as i32 >= desired {
                break;
            }
            let Some(node_name) = node.metadata.name.as_deref() else {
                continue;
            };
            if assigned.iter().any(|n| n == node_name) {
                debug!(node = %node_name, "node already assigned, skipping");
                continue;
            }
            if !self.node_can_be_assigned(node, dataset.is_exclusive()) {
                continue;
            }

            retry_on_conflict(ConflictRetry::default(), || {
                self.label_cache_node_once(node_name, &runtime)
            })
            .await?;
            info!(node = %node_name, dataset = %self.name, "labeled cache node");
            assigned.push(node_name.to_string());
        }

        Ok(assigned.len() as i32)
    }

    /// A node already reserved by another dataset is off limits, and an
    /// exclusive dataset refuses nodes that serve anyone else.
    fn node_can_be_assigned(&self, node: &Node, exclusive: bool) -> bool {
        let Some(labels) = node.metadata.labels.as_ref() else {
            return true;
        };
        if labels.contains_key(self.exclusive_label_name()) {
            return false;
        }
        if exclusive && labels.contains_key(self.dataset_num_label_name()) {
            return false;
        }
        true
    }

    async fn label_cache_node_once(
        &self,
        node_name: &str,
        runtime: &crate::crd::AlluxioRuntime,
    ) -> std::result::Result<(), StoreError> {
        let node = self.store.get_node(node_name).await?;
        let mut to_update = node.clone();
        let labels = to_update
            .metadata
            .labels
            .get_or_insert_with(Default::default);

        labels.insert(self.runtime_label_name(), "true".to_string());
        labels.insert(self.common_label_name(), "true".to_string());

        let (memory_bytes, disk_bytes) = tiered_quota_bytes(runtime);
        if memory_bytes > 0 {
            labels.insert(
                self.storage_label_name("m"),
                crate::engine::units::format_bytes(memory_bytes),
            );
        }
        if disk_bytes > 0 {
            labels.insert(
                self.storage_label_name("d"),
                crate::engine::units::format_bytes(disk_bytes),
            );
        }
        labels.insert(
            self.storage_label_name("t"),
            crate::engine::units::format_bytes(memory_bytes + disk_bytes),
        );

        increment_count_label(labels, self.dataset_num_label_name());

        let dataset = self
            .store
            .get_dataset(&self.namespace, &self.name)
            .await?;
        if dataset.is_exclusive() {
            labels.insert(
                self.exclusive_label_name().to_string(),
                self.exclusive_label_value(),
            );
        }

        self.store.update_node(&to_update).await
    }
}

/// Sum of tier quotas split into memory and disk contributions.
fn tiered_quota_bytes(
    runtime: &crate::crd::AlluxioRuntime,
) -> (i64, i64) {
    let mut memory = 0i64;
    let mut disk = 0i64;
    for level in &runtime.spec.tieredstore.levels {
        let quota = level
            .quota
            .as_deref()
            .and_then(|q| crate::engine::units::parse_human_size(q).ok())
            .unwrap_or_default();
        if level.mediumtype == "MEM" {
            memory += quota;
        } else {
            disk += quota;
        }
    }
    (memory, disk)
}

fn increment_count_label(
    labels: &mut std::collections::BTreeMap<String, String>,
    key: &str,
) {
    let next = labels
        .get(key)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or_default()
        + 1;
    labels.insert(key.to_string(), next.to_string());
}

/// Ascending by used capacity; nodes the cluster reports nothing about
/// sort as zero and go first. The sort is stable, so ties keep their
/// input order.
pub fn sort_nodes_by_used_capacity(
    nodes: &mut [Node],
    used_capacity: &HashMap<String, i64>,
) {
    nodes.sort_by_key(|node| node_used_capacity(node, used_capacity));
}

/// The report keys workers by IP or hostname; try both node addresses.
fn node_used_capacity(
    node: &Node,
    used_capacity: &HashMap<String, i64>,
) -> i64 {
    let addresses = node
        .status
        .as_ref()
        .and_then(|s| s.addresses.as_ref());
    let Some(addresses) = addresses else {
        return 0;
    };

    for wanted in ["InternalIP", "InternalDNS"] {
        for address in addresses {
            if address.type_ == wanted {
                if let Some(used) = used_capacity.get(&address.address) {
                    return *used;
                }
            }
        }
    }
    // the cluster knows nothing about this worker: evict it first
    0
}

/// Shared counter semantics: decrementing to zero removes the key
/// entirely. The label is never written as `"0"` and never goes
/// negative; an unparseable value is dropped rather than propagated.
fn decrement_count_label(
    labels: &mut std::collections::BTreeMap<String, String>,
    key: &str,
) {
    match labels.get(key).map(|v| v.parse::<u64>()) {
        Some(Ok(count)) if count > 1 => {
            labels.insert(key.to_string(), (count - 1).to_string());
        }
        Some(Ok(_)) => {
            labels.remove(key);
        }
        Some(Err(_)) => {
            warn!(%key, "unparseable dataset counter label, removing it");
            labels.remove(key);
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeAddress, NodeStatus};
    use kube::api::ObjectMeta;

    fn node(name: &str, ip: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
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

    #[test]
    fn sorts_least_cached_first() {
        let mut nodes = vec![
            node("n1", "10.0.0.1"),
            node("n2", "10.0.0.2"),
            node("n3", "10.0.0.3"),
        ];
        let used: HashMap<String, i64> = [
            ("10.0.0.1".to_string(), 500),
            ("10.0.0.2".to_string(), 100),
            // 10.0.0.3 unknown to the cluster
        ]
        .into_iter()
        .collect();
        sort_nodes_by_used_capacity(&mut nodes, &used);
        let order: Vec<_> = nodes
            .iter()
            .map(|n| n.metadata.name.as_deref().unwrap())
            .collect();
        assert_eq!(order, vec!["n3", "n2", "n1"]);
    }

    #[test]
    fn tie_order_is_stable() {
        let mut nodes = vec![node("a", "10.0.0.1"), node("b", "10.0.0.2")];
        sort_nodes_by_used_capacity(&mut nodes, &HashMap::new());
        let order: Vec<_> = nodes
            .iter()
            .map(|n| n.metadata.name.as_deref().unwrap())
            .collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn count_label_decrements_and_disappears_at_zero() {
        let mut labels: std::collections::BTreeMap<String, String> =
            [("orca.io/dataset-num".to_string(), "3".to_string())]
                .into_iter()
                .collect();
        decrement_count_label(&mut labels, "orca.io/dataset-num");
        assert_eq!(labels["orca.io/dataset-num"], "2");
        decrement_count_label(&mut labels, "orca.io/dataset-num");
        assert_eq!(labels["orca.io/dataset-num"], "1");
        decrement_count_label(&mut labels, "orca.io/dataset-num");
        assert!(!labels.contains_key("orca.io/dataset-num"));
        // absent stays absent, never "0" and never negative
        decrement_count_label(&mut labels, "orca.io/dataset-num");
        assert!(!labels.contains_key("orca.io/dataset-num"));
    }

    #[test]
    fn garbage_count_label_is_removed() {
        let mut labels: std::collections::BTreeMap<String, String> =
            [("orca.io/dataset-num".to_string(), "lots".to_string())]
                .into_iter()
                .collect();
        decrement_count_label(&mut labels, "orca.io/dataset-num");
        assert!(!labels.contains_key("orca.io/dataset-num"));
    }
}
