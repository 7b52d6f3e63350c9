use crate::filtration::Filtration;
use gat_core::GatResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Event log written by a task in its working directory.
pub const TASK_LOG_FILE: &str = "simulation.log";
/// Per-scenario result rows written by a task.
pub const TASK_CSV_FILE: &str = "results.csv";
/// Exported cases written by a task.
pub const TASK_CASES_DIR: &str = "cases";

/// Header of every result CSV.
pub const RESULT_CSV_HEADER: [&str; 4] = ["contingency_id", "status", "rounds", "actions"];

/// One line of a result CSV. `actions` is `;`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub contingency_id: String,
    pub status: String,
    pub rounds: usize,
    pub actions: String,
}

/// Command-line equivalent of one partition, for backends that run the
/// simulation out of process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub case_file: PathBuf,
    pub dsl_file: PathBuf,
    pub sub_contingencies: Option<Filtration>,
    pub output_folder: Option<PathBuf>,
    pub output_csv: Option<PathBuf>,
    pub verbose: bool,
}

impl TaskDescriptor {
    pub fn new(case_file: impl Into<PathBuf>, dsl_file: impl Into<PathBuf>) -> Self {
        Self {
            case_file: case_file.into(),
            dsl_file: dsl_file.into(),
            ..Default::default()
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--case-file={}", self.case_file.display()),
            format!("--dsl-file={}", self.dsl_file.display()),
        ];
        if let Some(filtration) = self.sub_contingencies {
            args.push(format!("--sub-contingencies={filtration}"));
        }
        if let Some(folder) = &self.output_folder {
            args.push(format!("--output-folder={}", folder.display()));
        }
        if let Some(csv) = &self.output_csv {
            args.push(format!("--output-csv={}", csv.display()));
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        args
    }
}

/// One partition of a batch, with the private directory it writes into.
#[derive(Debug)]
pub struct ExecutionTask {
    id: String,
    filtration: Option<Filtration>,
    contingency_ids: Vec<String>,
    workdir: TempDir,
    descriptor: TaskDescriptor,
}

impl ExecutionTask {
    /// `filtration` is `None` for the pre-contingency-only task.
    pub fn new(
        filtration: Option<Filtration>,
        contingency_ids: Vec<String>,
        descriptor: TaskDescriptor,
    ) -> GatResult<Self> {
        let id = match filtration {
            Some(f) => format!("task-{}-of-{}", f.index(), f.count()),
            None => "task-N".to_string(),
        };
        let workdir = tempfile::Builder::new()
            .prefix(&format!("gat-{id}-"))
            .tempdir()?;
        let descriptor = TaskDescriptor {
            sub_contingencies: filtration,
            output_folder: Some(workdir.path().to_path_buf()),
            output_csv: Some(workdir.path().join(TASK_CSV_FILE)),
            ..descriptor
        };
        Ok(Self {
            id,
            filtration,
            contingency_ids,
            workdir,
            descriptor,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filtration(&self) -> Option<Filtration> {
        self.filtration
    }

    pub fn contingency_ids(&self) -> &[String] {
        &self.contingency_ids
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn log_path(&self) -> PathBuf {
        self.workdir().join(TASK_LOG_FILE)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.workdir().join(TASK_CSV_FILE)
    }

    pub fn cases_dir(&self) -> PathBuf {
        self.workdir().join(TASK_CASES_DIR)
    }

    /// Hand the working directory over to the merger.
    pub fn into_artifacts(self, scenarios: usize) -> TaskArtifacts {
        TaskArtifacts {
            task_id: self.id,
            scenarios,
            workdir: self.workdir,
        }
    }
}

/// Output of a finished task. The working directory is deleted when this
/// value is dropped.
#[derive(Debug)]
pub struct TaskArtifacts {
    pub task_id: String,
    pub scenarios: usize,
    workdir: TempDir,
}

impl TaskArtifacts {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn log_path(&self) -> PathBuf {
        self.workdir().join(TASK_LOG_FILE)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.workdir().join(TASK_CSV_FILE)
    }

    pub fn cases_dir(&self) -> PathBuf {
        self.workdir().join(TASK_CASES_DIR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ok,
    Error,
    Cancelled,
    /// Finished but not merged (another task failed first).
    Discarded,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Ok => "ok",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Discarded => "discarded",
        }
    }
}

/// Manifest entry for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub partition: Option<String>,
    pub contingencies: usize,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub args: Vec<String>,
    pub merged_cases: usize,
    pub merged_rows: usize,
}
