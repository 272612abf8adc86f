//! Run metadata: timestamped log directories and the end-of-run JSON
//! summary consumed by downstream training tooling. Advisory only — the
//! dataset itself is complete without it.

use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{ConfigError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_images: u32,
    pub train_images: u32,
    pub val_images: u32,
    pub test_images: u32,
    /// Indices abandoned after the retry budget ran out.
    pub failed_images: u32,
    pub num_classes: usize,
    pub class_names: Vec<String>,
    pub elapsed_seconds: f64,
    pub avg_seconds_per_image: f64,
    pub device_type: String,
    pub output_directory: String,
}

impl RunSummary {
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("summary serialization: {e}")))?;
        std::fs::write(path, body).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("Run summary saved to {}", path.display());
        Ok(())
    }
}

/// Creates `{base}/logs/{run_type}_{unix_seconds}/` for this run's
/// artifacts. Seconds-since-epoch keeps directories unique and sortable
/// without pulling in a date-time dependency.
pub fn create_log_directory(logs_root: &Path, run_type: &str) -> Result<PathBuf> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let dir = logs_root.join(format!("{run_type}_{stamp}"));
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    Ok(dir)
}
