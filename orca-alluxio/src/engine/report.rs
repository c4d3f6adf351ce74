//! Parsers for the cache runtime's semi-structured report output
//! (`fsadmin report summary|metrics|capacity`). Unknown lines are
//! ignored so newer runtime versions with extra fields keep parsing.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use super::cache::CacheHitStates;
use super::error::EngineError;
use super::units;

const SUMMARY_PREFIX_TOTAL_CAPACITY: &str = "Total Capacity: ";
const SUMMARY_PREFIX_USED_CAPACITY: &str = "Used Capacity: ";

// trailing space keeps e.g. `BytesReadLocal` from matching
// `BytesReadLocalThroughput`
const METRICS_PREFIX_BYTES_READ_LOCAL: &str = "Cluster.BytesReadLocal ";
const METRICS_PREFIX_BYTES_READ_REMOTE: &str = "Cluster.BytesReadRemote ";
const METRICS_PREFIX_BYTES_READ_UFS_ALL: &str = "Cluster.BytesReadUfsAll ";
const METRICS_PREFIX_BYTES_READ_LOCAL_THROUGHPUT: &str =
    "Cluster.BytesReadLocalThroughput ";
const METRICS_PREFIX_BYTES_READ_REMOTE_THROUGHPUT: &str =
    "Cluster.BytesReadRemoteThroughput ";
const METRICS_PREFIX_BYTES_READ_UFS_THROUGHPUT: &str =
    "Cluster.BytesReadUfsThroughput ";

const CAPACITY_TABLE_HEADER: &str = "Worker Name";

fn counter_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(Type:\sCOUNTER,\sValue:\s(.*)\)").expect("static pattern")
    })
}

fn gauge_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(Type:\sGAUGE,\sValue:\s(.*)/MIN\)")
            .expect("static pattern")
    })
}

/// Capacity figures lifted from the summary report, already re-rendered
/// in the operator's binary-label convention. Zero-valued when the
/// markers are absent; that is not an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapacitySnapshot {
    pub cache_capacity: String,
    pub cached: String,
}

pub fn parse_report_summary(summary: &str) -> CapacitySnapshot {
    let mut snapshot = CapacitySnapshot::default();
    for line in summary.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(SUMMARY_PREFIX_TOTAL_CAPACITY) {
            let bytes = units::parse_human_size(rest).unwrap_or_default();
            snapshot.cache_capacity = units::format_bytes(bytes);
        }
        if let Some(rest) = line.strip_prefix(SUMMARY_PREFIX_USED_CAPACITY) {
            let bytes = units::parse_human_size(rest).unwrap_or_default();
            snapshot.cached = units::format_bytes(bytes);
        }
    }
    snapshot
}

fn counter_value(line: &str) -> i64 {
    counter_pattern()
        .captures(line)
        .and_then(|c| units::parse_human_size(&c[1]).ok())
        .unwrap_or_default()
}

fn gauge_value(line: &str) -> i64 {
    gauge_pattern()
        .captures(line)
        .and_then(|c| units::parse_human_size(&c[1]).ok())
        .unwrap_or_default()
}

/// Extracts the read counters and throughput gauges from the metrics
/// report and, when a previous snapshot is available, computes the
/// delta-based hit ratios and the gauge-based throughput ratios.
/// With no previous snapshot only the raw counters are filled.
pub fn parse_report_metrics(
    metrics: &str,
    previous: Option<&CacheHitStates>,
) -> CacheHitStates {
    let mut current = CacheHitStates::default();
    let mut local_throughput = 0i64;
    let mut remote_throughput = 0i64;
    let mut ufs_throughput = 0i64;

    for line in metrics.lines() {
        let line = line.trim();
        if line.starts_with(METRICS_PREFIX_BYTES_READ_LOCAL) {
            current.bytes_read_local = counter_value(line);
        } else if line.starts_with(METRICS_PREFIX_BYTES_READ_REMOTE) {
            current.bytes_read_remote = counter_value(line);
        } else if line.starts_with(METRICS_PREFIX_BYTES_READ_UFS_ALL) {
            current.bytes_read_ufs_all = counter_value(line);
        } else if line.starts_with(METRICS_PREFIX_BYTES_READ_LOCAL_THROUGHPUT) {
            local_throughput = gauge_value(line);
        } else if line.starts_with(METRICS_PREFIX_BYTES_READ_REMOTE_THROUGHPUT)
        {
            remote_throughput = gauge_value(line);
        } else if line.starts_with(METRICS_PREFIX_BYTES_READ_UFS_THROUGHPUT) {
            ufs_throughput = gauge_value(line);
        }
    }

    let Some(last) = previous else {
        return current;
    };

    let delta_local = current.bytes_read_local - last.bytes_read_local;
    let delta_remote = current.bytes_read_remote - last.bytes_read_remote;
    let delta_ufs = current.bytes_read_ufs_all - last.bytes_read_ufs_all;
    let delta_total = delta_local + delta_remote + delta_ufs;

    if delta_total != 0 {
        let total = delta_total as f64;
        current.local_hit_ratio =
            units::format_percent(delta_local as f64 * 100.0 / total);
        current.remote_hit_ratio =
            units::format_percent(delta_remote as f64 * 100.0 / total);
        current.cache_hit_ratio = units::format_percent(
            (delta_local + delta_remote) as f64 * 100.0 / total,
        );
    } else {
        // no data was requested since the previous snapshot
        current.local_hit_ratio = "0.0%".to_string();
        current.remote_hit_ratio = "0.0%".to_string();
        current.cache_hit_ratio = "0.0%".to_string();
    }

    let total_throughput = local_throughput + remote_throughput + ufs_throughput;
    if total_throughput != 0 {
        let total = total_throughput as f64;
        current.local_throughput_ratio =
            units::format_percent(local_throughput as f64 * 100.0 / total);
        current.remote_throughput_ratio =
            units::format_percent(remote_throughput as f64 * 100.0 / total);
        current.cache_throughput_ratio = units::format_percent(
            (local_throughput + remote_throughput) as f64 * 100.0 / total,
        );
    } else {
        current.local_throughput_ratio = "0.0%".to_string();
        current.remote_throughput_ratio = "0.0%".to_string();
        current.cache_throughput_ratio = "0.0%".to_string();
    }

    current
}

/// Parses the per-worker table of the capacity report into a map of
/// worker address (IP or hostname) to used bytes. Each worker spans two
/// lines below the `Worker Name` header:
///
/// ```text
/// Worker Name      Last Heartbeat   Storage       MEM
/// 192.168.1.147    0                capacity      2048.00MB
///                                   used          443.89MB (21%)
/// ```
pub fn parse_capacity_report(
    report: &str,
) -> Result<HashMap<String, i64>, EngineError> {
    let lines: Vec<&str> = report.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.starts_with(CAPACITY_TABLE_HEADER))
        .map(|i| i + 1)
        .ok_or_else(|| {
            EngineError::Parse(
                "capacity report has no worker table header".to_string(),
            )
        })?;

    let mut used_by_worker = HashMap::new();
    let mut idx = start;
    while idx + 1 < lines.len() {
        let mut fields: Vec<&str> = lines[idx].split_whitespace().collect();
        fields.extend(lines[idx + 1].split_whitespace());
        if fields.len() >= 6 {
            let worker = fields[0].to_string();
            let used =
                units::parse_human_size(fields[5]).unwrap_or_default();
            used_by_worker.insert(worker, used);
        }
        idx += 2;
    }

    Ok(used_by_worker)
}
