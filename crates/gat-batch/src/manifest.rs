use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

use crate::config::JoinPolicy;
use crate::task::{TaskRecord, TaskStatus};

pub const MANIFEST_FILE: &str = "batch_manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub created_at: DateTime<Utc>,
    pub join_policy: JoinPolicy,
    pub contingencies: usize,
    pub num_tasks: usize,
    pub success: usize,
    pub failure: usize,
    pub tasks: Vec<TaskRecord>,
}

impl BatchManifest {
    pub fn new(join_policy: JoinPolicy, contingencies: usize, tasks: Vec<TaskRecord>) -> Self {
        let success = tasks.iter().filter(|t| t.status == TaskStatus::Ok).count();
        let failure = tasks.iter().filter(|t| t.status == TaskStatus::Error).count();
        Self {
            created_at: Utc::now(),
            join_policy,
            contingencies,
            num_tasks: tasks.len(),
            success,
            failure,
            tasks,
        }
    }
}

pub fn write_batch_manifest(path: &Path, manifest: &BatchManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(manifest).context("serializing batch manifest to JSON")?;
    fs::write(path, json).with_context(|| format!("writing batch manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_batch_manifest(path: &Path) -> Result<BatchManifest> {
    let file = File::open(path).with_context(|| format!("opening batch manifest '{}'", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing batch manifest '{}'", path.display()))
}
