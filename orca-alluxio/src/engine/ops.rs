//! Thin client for the operational CLI running inside the master pod.
//! Every method shells out through the [`CommandRunner`] collaborator
//! and returns raw or lightly-parsed text; the structured parsing lives
//! in [`super::report`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::{EngineError, Result};
use crate::client::{CommandError, CommandRunner, ExecOutput};

/// Stdout fragments that mean "the master cannot serve this yet" rather
/// than "the command is broken".
const NOT_READY_MARKERS: [&str; 3] = [
    "Unable to reach the Alluxio master",
    "Failed to connect",
    "Connection refused",
];

pub struct AlluxioFileUtils {
    pod: String,
    container: String,
    namespace: String,
    runner: Arc<dyn CommandRunner>,
}

impl super::AlluxioEngine {
    pub(crate) fn file_utils(&self) -> AlluxioFileUtils {
        let (pod, container) = self.master_pod_info();
        AlluxioFileUtils {
            pod,
            container,
            namespace: self.namespace.clone(),
            runner: Arc::clone(&self.runner),
        }
    }
}

impl AlluxioFileUtils {
    pub fn new(
        pod: impl Into<String>,
        container: impl Into<String>,
        namespace: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            pod: pod.into(),
            container: container.into(),
            namespace: namespace.into(),
            runner,
        }
    }

    async fn exec(&self, command: &[&str]) -> Result<ExecOutput> {
        let command: Vec<String> =
            command.iter().map(|s| s.to_string()).collect();
        debug!(pod = %self.pod, ?command, "executing in master container");
        match self
            .runner
            .exec(&self.namespace, &self.pod, &self.container, &command)
            .await
        {
            Ok(output) => Ok(output),
            Err(CommandError::Failed {
                command,
                stdout,
                stderr,
            }) => {
                if NOT_READY_MARKERS
                    .iter()
                    .any(|m| stdout.contains(m) || stderr.contains(m))
                {
                    return Err(EngineError::NotReady(
                        "alluxio master".to_string(),
                    ));
                }
                Err(EngineError::Command(CommandError::Failed {
                    command,
                    stdout,
                    stderr,
                }))
            }
            Err(other) => Err(EngineError::Command(other)),
        }
    }

    pub async fn report_summary(&self) -> Result<String> {
        let out = self
            .exec(&["alluxio", "fsadmin", "report", "summary"])
            .await?;
        Ok(out.stdout)
    }

    pub async fn report_metrics(&self) -> Result<String> {
        let out = self
            .exec(&["alluxio", "fsadmin", "report", "metrics"])
            .await?;
        Ok(out.stdout)
    }

    pub async fn report_capacity(&self) -> Result<String> {
        let out = self
            .exec(&["alluxio", "fsadmin", "report", "capacity"])
            .await?;
        Ok(out.stdout)
    }

    /// The cluster is considered ready when the plain report command
    /// answers at all.
    pub async fn ready(&self) -> bool {
        match self.exec(&["alluxio", "fsadmin", "report"]).await {
            Ok(_) => true,
            Err(err) => {
                info!(error = %err, "master readiness probe failed");
                false
            }
        }
    }

    /// Recursively loads metadata for `path`. Runs without a timeout:
    /// large namespaces legitimately take a long time and this is only
    /// ever called from the background sync task.
    pub async fn load_metadata(&self, path: &str) -> Result<()> {
        let started = std::time::Instant::now();
        self.exec(&["alluxio", "fs", "loadMetadata", "-R", path])
            .await?;
        info!(elapsed = ?started.elapsed(), %path, "async loadMetadata finished");
        Ok(())
    }

    /// `alluxio fs count <path>`: file count, folder count, total bytes.
    pub async fn count(&self, path: &str) -> Result<(i64, i64, i64)> {
        let out = self.exec(&["alluxio", "fs", "count", path]).await?;
        for line in out.stdout.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() == 3 {
                if let (Ok(files), Ok(folders), Ok(bytes)) = (
                    fields[0].replace(',', "").parse(),
                    fields[1].replace(',', "").parse(),
                    fields[2].replace(',', "").parse(),
                ) {
                    return Ok((files, folders, bytes));
                }
            }
        }
        Err(EngineError::Parse(format!(
            "unexpected count output {:?}",
            out.stdout
        )))
    }

    /// Total bytes stored under the dataset root in the backing storage.
    pub async fn total_storage_bytes(&self, path: &str) -> Result<i64> {
        let (_, _, bytes) = self.count(path).await?;
        Ok(bytes)
    }

    /// Completed-file count from the metrics report; cheaper than a
    /// recursive count against a large namespace.
    pub async fn file_count(&self) -> Result<i64> {
        static FILES_COMPLETED: std::sync::OnceLock<regex::Regex> =
            std::sync::OnceLock::new();
        let pattern = FILES_COMPLETED.get_or_init(|| {
            regex::Regex::new(r"\(Type:\sCOUNTER,\sValue:\s([0-9,]+)\)")
                .expect("static pattern")
        });

        let metrics = self.report_metrics().await?;
        for line in metrics.lines() {
            let line = line.trim();
            if line.starts_with("Master.FilesCompleted ") {
                if let Some(caps) = pattern.captures(line) {
                    return caps[1].replace(',', "").parse().map_err(|_| {
                        EngineError::Parse(format!(
                            "bad file counter in {line:?}"
                        ))
                    });
                }
            }
        }
        Err(EngineError::Parse(
            "metrics report has no completed-file counter".to_string(),
        ))
    }

    /// Mounts a backing storage path into the cluster namespace with
    /// fully resolved (decrypted) options.
    pub async fn mount(
        &self,
        alluxio_path: &str,
        ufs_path: &str,
        options: &BTreeMap<String, String>,
        read_only: bool,
        shared: bool,
    ) -> Result<()> {
        let mut command: Vec<String> =
            vec!["alluxio".into(), "fs".into(), "mount".into()];
        if read_only {
            command.push("--readonly".into());
        }
        if shared {
            command.push("--shared".into());
        }
        for (key, value) in options {
            command.push("--option".into());
            command.push(format!("{key}={value}"));
        }
        command.push(alluxio_path.to_string());
        command.push(ufs_path.to_string());

        let command_refs: Vec<&str> =
            command.iter().map(String::as_str).collect();
        self.exec(&command_refs).await?;
        Ok(())
    }

    /// Lists the mount table and checks whether `alluxio_path` is
    /// already mounted.
    pub async fn is_mounted(&self, alluxio_path: &str) -> Result<bool> {
        let out = self.exec(&["alluxio", "fs", "mount"]).await?;
        // each line reads `<ufs-uri>  on  <alluxio-path>  (properties)`
        let mounted = out.stdout.lines().any(|line| {
            line.split_whitespace().nth(2) == Some(alluxio_path)
        });
        Ok(mounted)
    }

    pub async fn mkdir(&self, alluxio_path: &str) -> Result<()> {
        self.exec(&["alluxio", "fs", "mkdir", alluxio_path]).await?;
        Ok(())
    }

    /// Frees cached blocks under `path`. Failure to free is surfaced;
    /// "nothing cached" is not an error.
    pub async fn clean_cache(&self, path: &str) -> Result<()> {
        match self.exec(&["alluxio", "fs", "free", "-f", path]).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(error = %err, %path, "free command failed");
                Err(err)
            }
        }
    }

    /// Reads one value out of a metadata-info backup file previously
    /// written next to the journal backup, shaped as `key: value` lines.
    pub async fn query_metadata_info_from_file(
        &self,
        key: &str,
        file: &str,
    ) -> Result<String> {
        let out = self.exec(&["cat", file]).await?;
        for line in out.stdout.lines() {
            if let Some((k, v)) = line.split_once(':') {
                if k.trim() == key {
                    return Ok(v.trim().to_string());
                }
            }
        }
        Err(EngineError::Parse(format!(
            "metadata info file {file} has no {key} entry"
        )))
    }
}
