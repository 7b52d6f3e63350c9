use crate::merge::MergeTarget;
use crate::task::{TASK_CASES_DIR, TASK_CSV_FILE};
use gat_core::{GatError, GatResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What a batch does when one of its tasks fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinPolicy {
    /// The first task error fails the whole batch.
    #[default]
    AllOrNothing,
    /// Merge every successful task and report the failures.
    CollectErrors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Requested number of partitions (capped by the contingency count).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Backend threads, 0 for one per CPU.
    #[serde(default)]
    pub threads: usize,
    #[serde(default)]
    pub join_policy: JoinPolicy,
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,
    /// Defaults to `<output_folder>/results.csv`.
    #[serde(default)]
    pub output_csv: Option<PathBuf>,
    /// Merged log, relative to `output_folder`.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default)]
    pub export_cases: bool,
    #[serde(default = "default_case_basename")]
    pub case_basename: String,
    /// zstd level for exported cases; none when unset.
    #[serde(default)]
    pub compress_cases: Option<i32>,
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("batch-output")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("simulation.log")
}

fn default_case_basename() -> String {
    "case".to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            threads: 0,
            join_policy: JoinPolicy::default(),
            output_folder: default_output_folder(),
            output_csv: None,
            log_file: default_log_file(),
            export_cases: false,
            case_basename: default_case_basename(),
            compress_cases: None,
        }
    }
}

impl BatchConfig {
    pub fn from_toml_str(contents: &str) -> GatResult<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| GatError::Config(format!("parsing batch config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> GatResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no batch config file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> GatResult<()> {
        if self.workers == 0 {
            return Err(GatError::Validation("worker count must be at least 1".into()));
        }
        if self.case_basename.is_empty() {
            return Err(GatError::Config("case_basename must not be empty".into()));
        }
        Ok(())
    }

    pub fn merge_target(&self) -> MergeTarget {
        MergeTarget {
            log_path: self.output_folder.join(&self.log_file),
            csv_path: self
                .output_csv
                .clone()
                .unwrap_or_else(|| self.output_folder.join(TASK_CSV_FILE)),
            cases_dir: self.output_folder.join(TASK_CASES_DIR),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_folder.join(crate::manifest::MANIFEST_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = BatchConfig::from_toml_str(
            r#"
            workers = 3
            join_policy = "collect-errors"
            output_csv = "out/all.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.join_policy, JoinPolicy::CollectErrors);
        assert_eq!(config.threads, 0);
        assert_eq!(config.case_basename, "case");

        let target = config.merge_target();
        assert_eq!(target.csv_path, PathBuf::from("out/all.csv"));
        assert_eq!(target.log_path, PathBuf::from("batch-output/simulation.log"));
        assert_eq!(target.cases_dir, PathBuf::from("batch-output/cases"));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let err = BatchConfig::from_toml_str("workers = 0").unwrap_err();
        assert!(err.is_validation(), "{err}");
    }

    #[test]
    fn test_unknown_policy_is_a_config_error() {
        assert!(BatchConfig::from_toml_str("join_policy = \"best-effort\"").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig::load(dir.path().join("batch.toml")).unwrap();
        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.manifest_path(), PathBuf::from("batch-output/batch_manifest.json"));
    }
}
