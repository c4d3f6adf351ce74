//! Cache observability state and the interval-gated hit-ratio query.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use super::error::Result;
use super::{AlluxioEngine, report, units};
use crate::crd::METADATA_SYNC_NOT_DONE_MSG;

/// Snapshot of cache usage merged into persisted status on every poll.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStates {
    pub cache_capacity: String,
    pub cached: String,
    /// Left empty until the backing storage total is known.
    pub cached_percentage: String,
    pub cache_hit_states: CacheHitStates,
}

/// Hit-ratio snapshot. Ratio fields are formatted percentages and stay
/// empty until two polls have produced a delta; the raw counters are
/// the cumulative values reported by the cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheHitStates {
    pub cache_hit_ratio: String,
    pub local_hit_ratio: String,
    pub remote_hit_ratio: String,

    pub local_throughput_ratio: String,
    pub remote_throughput_ratio: String,
    pub cache_throughput_ratio: String,

    pub bytes_read_local: i64,
    pub bytes_read_remote: i64,
    pub bytes_read_ufs_all: i64,

    pub timestamp: DateTime<Utc>,
}

impl Default for CacheHitStates {
    fn default() -> Self {
        Self {
            cache_hit_ratio: String::new(),
            local_hit_ratio: String::new(),
            remote_hit_ratio: String::new(),
            local_throughput_ratio: String::new(),
            remote_throughput_ratio: String::new(),
            cache_throughput_ratio: String::new(),
            bytes_read_local: 0,
            bytes_read_remote: 0,
            bytes_read_ufs_all: 0,
            timestamp: DateTime::<Utc>::MIN_UTC,
        }
    }
}

impl CacheStates {
    /// Flattens into the string-keyed map persisted in runtime status.
    pub fn as_status_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("cacheCapacity".to_string(), self.cache_capacity.clone());
        map.insert("cached".to_string(), self.cached.clone());
        map.insert(
            "cachedPercentage".to_string(),
            self.cached_percentage.clone(),
        );
        let hits = &self.cache_hit_states;
        map.insert("cacheHitRatio".to_string(), hits.cache_hit_ratio.clone());
        map.insert("localHitRatio".to_string(), hits.local_hit_ratio.clone());
        map.insert(
            "remoteHitRatio".to_string(),
            hits.remote_hit_ratio.clone(),
        );
        map.insert(
            "localThroughputRatio".to_string(),
            hits.local_throughput_ratio.clone(),
        );
        map.insert(
            "remoteThroughputRatio".to_string(),
            hits.remote_throughput_ratio.clone(),
        );
        map.insert(
            "cacheThroughputRatio".to_string(),
            hits.cache_throughput_ratio.clone(),
        );
        map
    }
}

/// True when the previous snapshot is still fresh enough to reuse
/// instead of re-querying the cluster.
pub fn within_query_interval(
    now: DateTime<Utc>,
    last: &CacheHitStates,
    min_interval_minutes: f64,
) -> bool {
    let elapsed_minutes =
        (now - last.timestamp).num_milliseconds() as f64 / 60_000.0;
    elapsed_minutes < min_interval_minutes
}

impl AlluxioEngine {
    /// Builds the cache snapshot for this poll: capacity figures from
    /// the summary report, cached percentage against the known backing
    /// storage total, and the interval-gated hit ratios.
    pub async fn query_cache_status(&mut self) -> Result<CacheStates> {
        let summary = match self.file_utils().report_summary().await {
            Ok(summary) => summary,
            Err(err) => {
                error!(error = %err, "failed to get report summary while querying cache status");
                return Err(err);
            }
        };
        let snapshot = report::parse_report_summary(&summary);
        let mut states = CacheStates {
            cache_capacity: snapshot.cache_capacity,
            cached: snapshot.cached,
            ..Default::default()
        };

        // percentage needs a known backing-storage total; before the
        // first metadata sync finishes there is nothing to divide by
        let dataset = self.dataset().await?;
        let ufs_total_str = dataset
            .status
            .as_ref()
            .map(|s| s.ufs_total.clone())
            .unwrap_or_default();
        if !ufs_total_str.is_empty()
            && ufs_total_str != METADATA_SYNC_NOT_DONE_MSG
        {
            let used =
                units::parse_human_size(&states.cached).unwrap_or_default();
            let ufs_total =
                units::parse_human_size(&ufs_total_str).unwrap_or_default();
            if ufs_total > 0 {
                states.cached_percentage = units::format_percent(
                    used as f64 / ufs_total as f64 * 100.0,
                );
            }
        }

        states.cache_hit_states = self.cache_hit_states().await;
        Ok(states)
    }

    /// Interval-gated hit-ratio query. Within the minimum interval the
    /// last computed state is returned untouched; on fetch failure a
    /// stale state is preferred over failing the whole status poll.
    pub(crate) async fn cache_hit_states(&mut self) -> CacheHitStates {
        let now = Utc::now();
        let interval = self.config.sync.cache_hit_query_interval_min;
        if let Some(last) = &self.last_cache_hit_states {
            if within_query_interval(now, last, interval) {
                debug!("cache hit states still fresh, skipping metrics query");
                return last.clone();
            }
        }

        let metrics = match self.file_utils().report_metrics().await {
            Ok(metrics) => metrics,
            Err(err) => {
                error!(error = %err, "failed to get metrics report while querying cache hit states");
                return self
                    .last_cache_hit_states
                    .clone()
                    .unwrap_or_default();
            }
        };

        let mut states = report::parse_report_metrics(
            &metrics,
            self.last_cache_hit_states.as_ref(),
        );
        states.timestamp = now;
        if self.last_cache_hit_states.is_none() {
            info!("first cache hit snapshot recorded, ratios start next poll");
        }
        self.last_cache_hit_states = Some(states.clone());
        states
    }
}
