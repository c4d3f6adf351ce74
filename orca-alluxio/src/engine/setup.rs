//! Deployment cycle: render the configuration and hand it to the
//! release manager.

use tracing::info;

use super::error::{EngineError, Result};
use super::AlluxioEngine;
use crate::crd::AlluxioRuntime;

impl AlluxioEngine {
    /// Installs the cache cluster when it is not deployed yet. The
    /// rendered configuration is recomputed every call; the release
    /// manager only sees it on first install.
    pub async fn setup_cluster(
        &self,
        runtime: &AlluxioRuntime,
    ) -> Result<bool> {
        let found = self
            .releases
            .check_release(&self.name, &self.namespace)
            .await?;
        if found {
            return Ok(false);
        }

        let value = self.transform(runtime).await?;
        let values = serde_json::to_value(&value).map_err(|e| {
            EngineError::Parse(format!(
                "deployment configuration does not serialize: {e}"
            ))
        })?;
        self.releases
            .install_release(&self.name, &self.namespace, &values)
            .await?;
        info!(release = %self.name, "cache cluster installed");
        Ok(true)
    }
}
