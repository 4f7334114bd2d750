//! Startup-file scraping from containerd's task state directory
//!
//! containerd records a two-line `startup` file per container under
//! `<root>/<namespace>/<container_id>/`: line 1 the start timestamp, line 2
//! the end timestamp. An end of 0 means the container has not finished
//! starting and must not be pushed.

use crate::models::{short_id, RecordKind, StartupRecord};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, warn};

/// Default containerd v2 task state directory
pub const DEFAULT_RUNTIME_ROOT: &str = "/run/containerd/io.containerd.runtime.v2.task";

/// Reads container startup timings from the runtime's on-disk state
pub struct StartupScraper {
    root: PathBuf,
}

impl StartupScraper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scan every runtime namespace under the root.
    pub async fn scan_all(&self) -> Result<Vec<StartupRecord>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("failed to read runtime root {}", self.root.display()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to walk runtime root")?
        {
            let namespace = entry.file_name().to_string_lossy().into_owned();
            records.extend(self.scan_namespace(&namespace).await);
        }
        Ok(records)
    }

    /// Scan one namespace directory. Problems with individual containers are
    /// logged and skipped so a single bad file never stalls the sweep.
    pub async fn scan_namespace(&self, namespace: &str) -> Vec<StartupRecord> {
        let dir = self.root.join(namespace);
        let mut records = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                error!(namespace = %namespace, error = %err, "failed to read namespace directory");
                return records;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    error!(namespace = %namespace, error = %err, "failed to walk namespace directory");
                    break;
                }
            };
            let container = entry.file_name().to_string_lossy().into_owned();
            let startup_path = entry.path().join("startup");
            let content = match fs::read_to_string(&startup_path).await {
                Ok(content) => content,
                // container has not recorded its startup timing
                Err(_) => continue,
            };
            let Some((start, end)) = parse_startup(&content) else {
                warn!(
                    namespace = %namespace,
                    container = %short_id(&container),
                    "invalid startup file contents"
                );
                continue;
            };
            if end == 0 {
                // still starting
                continue;
            }
            records.push(StartupRecord {
                name: container,
                namespace: namespace.to_string(),
                start,
                end,
                kind: RecordKind::Default,
            });
        }

        records
    }
}

/// Parse a startup file: two lines, start then end timestamp.
pub fn parse_startup(content: &str) -> Option<(i64, i64)> {
    let mut lines = content.trim().lines();
    let start = lines.next()?.trim().parse().ok()?;
    let end = lines.next()?.trim().parse().ok()?;
    Some((start, end))
}
