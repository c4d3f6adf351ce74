//! Stages 8-10: security property defaults, the engine-tuning default
//! table, and the widened defaults for all-HTTP datasets.

use std::collections::BTreeMap;

use tracing::debug;

use super::mounts::is_http_scheme;
use super::TransformContext;
use crate::engine::value::AlluxioValue;
use crate::engine::AlluxioEngine;

/// Engine-tuning defaults applied when the spec does not pin the key.
/// Values are fixed, empirically chosen constants, applied by one
/// fill-absent pass rather than a call site per key.
const DEFAULT_PROPERTIES: &[(&str, &str)] = &[
    ("alluxio.fuse.jnifuse.enabled", "true"),
    ("alluxio.master.metastore", "ROCKS"),
    ("alluxio.web.ui.enabled", "false"),
    ("alluxio.user.update.file.accesstime.disabled", "true"),
    ("alluxio.user.client.cache.enabled", "false"),
    ("alluxio.master.metastore.inode.cache.max.size", "10000000"),
    ("alluxio.master.journal.log.size.bytes.max", "500MB"),
    ("alluxio.master.metadata.sync.concurrency.level", "128"),
    ("alluxio.master.metadata.sync.executor.pool.size", "128"),
    ("alluxio.master.metadata.sync.ufs.prefetch.pool.size", "128"),
    ("alluxio.user.block.worker.client.pool.min", "512"),
    ("alluxio.fuse.debug.enabled", "false"),
    ("alluxio.user.file.writetype.default", "MUST_CACHE"),
    (
        "alluxio.user.ufs.block.read.location.policy",
        "alluxio.client.block.policy.LocalFirstPolicy",
    ),
    (
        "alluxio.user.block.write.location.policy.class",
        "alluxio.client.block.policy.LocalFirstAvoidEvictionPolicy",
    ),
    (
        "alluxio.worker.allocator.class",
        "alluxio.worker.block.allocator.MaxFreeAllocator",
    ),
    ("alluxio.user.block.size.bytes.default", "16MB"),
    ("alluxio.user.streaming.reader.chunk.size.bytes", "32MB"),
    ("alluxio.user.local.reader.chunk.size.bytes", "32MB"),
    ("alluxio.worker.network.reader.buffer.size", "32MB"),
    ("alluxio.user.metrics.collection.enabled", "true"),
    ("alluxio.master.rpc.executor.max.pool.size", "1024"),
    ("alluxio.master.rpc.executor.core.pool.size", "128"),
    ("alluxio.user.file.passive.cache.enabled", "false"),
    (
        "alluxio.user.block.avoid.eviction.policy.reserved.size.bytes",
        "2GB",
    ),
    ("alluxio.master.journal.folder", "/journal"),
    ("alluxio.user.block.master.client.pool.gc.threshold", "10min"),
    ("alluxio.user.file.master.client.threads", "1024"),
    ("alluxio.user.block.master.client.threads", "1024"),
    ("alluxio.user.file.create.ttl.action", "FREE"),
    ("alluxio.user.file.readtype.default", "CACHE"),
    ("alluxio.security.stale.channel.purge.interval", "365d"),
    ("alluxio.user.metadata.cache.enabled", "true"),
    ("alluxio.user.metadata.cache.expiration.time", "10min"),
    ("alluxio.user.metadata.cache.max.size", "6000000"),
    ("alluxio.fuse.cached.paths.max", "1000000"),
    ("alluxio.job.worker.threadpool.size", "32"),
    ("alluxio.user.worker.list.refresh.interval", "2min"),
    ("alluxio.user.logging.threshold", "1000ms"),
    ("alluxio.fuse.logging.threshold", "1000ms"),
    ("alluxio.worker.block.master.client.pool.size", "1024"),
    ("alluxio.job.master.finished.job.retention.time", "30sec"),
    (
        "alluxio.underfs.object.store.breadcrumbs.enabled",
        "false",
    ),
];

/// Widened defaults when every mount is HTTP(S): sequential remote
/// reads benefit from much larger buffers.
const HTTP_DEFAULT_PROPERTIES: &[(&str, &str)] = &[
    ("alluxio.user.block.size.bytes.default", "256MB"),
    ("alluxio.user.streaming.reader.chunk.size.bytes", "256MB"),
    ("alluxio.user.local.reader.chunk.size.bytes", "256MB"),
    ("alluxio.worker.network.reader.buffer.size", "256MB"),
    ("alluxio.user.streaming.data.timeout", "300sec"),
];

/// Fills every absent key from the table; a value carried by the spec
/// (already merged into the map) always wins.
fn fill_absent_properties(
    properties: &mut BTreeMap<String, String>,
    defaults: &[(&str, &str)],
) {
    for (key, default) in defaults {
        properties
            .entry((*key).to_string())
            .or_insert_with(|| (*default).to_string());
    }
}

impl AlluxioEngine {
    /// Stage 8: root impersonation wildcards and authorization off,
    /// each only when not already configured.
    pub(super) fn transform_permission(
        &self,
        _ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> AlluxioValue {
        fill_absent_properties(
            &mut value.properties,
            &[
                ("alluxio.master.security.impersonation.root.users", "*"),
                ("alluxio.master.security.impersonation.root.groups", "*"),
                ("alluxio.security.authorization.permission.enabled", "false"),
            ],
        );
        value
    }

    /// Stage 9: the default table plus the few conditional defaults
    /// that depend on earlier stages.
    pub(super) fn optimize_default_properties(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> AlluxioValue {
        fill_absent_properties(&mut value.properties, DEFAULT_PROPERTIES);

        let journal_type = if value.master.replicas > 1 {
            "EMBEDDED"
        } else {
            "UFS"
        };
        value
            .properties
            .entry("alluxio.master.journal.type".to_string())
            .or_insert_with(|| journal_type.to_string());

        // direct memory IO is only safe for a read-only workload with a
        // single tier backed by a single directory
        let read_only = ctx
            .dataset
            .spec
            .access_modes
            .iter()
            .any(|m| m == "ReadOnlyMany");
        let single_dir_tier = ctx.spec.tieredstore.levels.len() == 1
            && value
                .tieredstore
                .levels
                .first()
                .map(|l| !l.path.contains(','))
                .unwrap_or(false);
        if read_only && single_dir_tier {
            value
                .properties
                .entry("alluxio.user.direct.memory.io.enabled".to_string())
                .or_insert_with(|| "true".to_string());
        }

        debug!(
            properties = value.properties.len(),
            "default properties applied"
        );
        value
    }

    /// Stage 10: applies only when every mount point is HTTP(S).
    pub(super) fn optimize_properties_for_http(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> AlluxioValue {
        let mounts = &ctx.dataset.spec.mounts;
        if mounts.is_empty()
            || !mounts.iter().all(|m| is_http_scheme(&m.mount_point))
        {
            return value;
        }

        fill_absent_properties(&mut value.properties, HTTP_DEFAULT_PROPERTIES);

        // readahead hurts plain HTTP sources; disable it unless the
        // user supplied their own fuse arguments
        if ctx.spec.fuse.args.is_empty() {
            if let Some(opts) = value
                .fuse
                .args
                .iter_mut()
                .find(|a| a.starts_with("--fuse-opts="))
            {
                opts.push_str(",max_readahead=0");
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_absent_never_overwrites() {
        let mut properties: BTreeMap<String, String> =
            [("a".to_string(), "spec".to_string())].into_iter().collect();
        fill_absent_properties(
            &mut properties,
            &[("a", "default"), ("b", "default")],
        );
        assert_eq!(properties["a"], "spec");
        assert_eq!(properties["b"], "default");
    }

    #[test]
    fn default_table_has_no_duplicate_keys() {
        let mut seen = std::collections::BTreeSet::new();
        for (key, _) in DEFAULT_PROPERTIES {
            assert!(seen.insert(*key), "duplicate default for {key}");
        }
    }
}
