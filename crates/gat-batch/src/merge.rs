//! Single-writer artifact merger.
//!
//! One background thread owns the aggregate outputs (log, result CSV, case
//! directory). Finished tasks are queued to it and merged one at a time, so
//! the bytes of two tasks never interleave and callers hold no lock.

use crate::task::{ResultRow, TaskArtifacts, RESULT_CSV_HEADER, TASK_CASES_DIR, TASK_CSV_FILE, TASK_LOG_FILE};
use anyhow::Context;
use gat_core::{GatError, GatResult, PartitionFailure};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

const QUEUE_DEPTH: usize = 4;

/// Where merged artifacts go.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeTarget {
    pub log_path: PathBuf,
    pub csv_path: PathBuf,
    pub cases_dir: PathBuf,
}

impl MergeTarget {
    /// `<folder>/simulation.log`, `<folder>/results.csv`, `<folder>/cases`.
    pub fn in_folder(folder: &Path) -> Self {
        Self {
            log_path: folder.join(TASK_LOG_FILE),
            csv_path: folder.join(TASK_CSV_FILE),
            cases_dir: folder.join(TASK_CASES_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedTask {
    pub task_id: String,
    pub log_bytes: u64,
    pub csv_rows: usize,
    pub cases: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeSummary {
    pub merged: Vec<MergedTask>,
    pub failed: Vec<PartitionFailure>,
}

impl MergeSummary {
    pub fn task(&self, task_id: &str) -> Option<&MergedTask> {
        self.merged.iter().find(|m| m.task_id == task_id)
    }
}

/// Cloneable submission end of the merger queue.
#[derive(Debug, Clone)]
pub struct MergeQueue {
    tx: SyncSender<TaskArtifacts>,
}

impl MergeQueue {
    /// Blocks while the queue is full.
    pub fn submit(&self, artifacts: TaskArtifacts) -> GatResult<()> {
        let task_id = artifacts.task_id.clone();
        self.tx
            .send(artifacts)
            .map_err(|_| GatError::Other(format!("artifact merger stopped before task {task_id}")))
    }
}

pub struct ArtifactMerger {
    queue: Option<MergeQueue>,
    handle: Option<JoinHandle<MergeSummary>>,
}

impl ArtifactMerger {
    /// Create the outputs (truncating existing ones) and start the writer.
    pub fn new(target: MergeTarget) -> GatResult<Self> {
        let sink = Sink::open(&target)?;
        let (tx, rx) = sync_channel(QUEUE_DEPTH);
        let handle = thread::Builder::new()
            .name("gat-batch-merger".to_string())
            .spawn(move || run_writer(sink, rx))?;
        Ok(Self {
            queue: Some(MergeQueue { tx }),
            handle: Some(handle),
        })
    }

    pub fn queue(&self) -> GatResult<MergeQueue> {
        self.queue
            .clone()
            .ok_or_else(|| GatError::Other("artifact merger already finished".into()))
    }

    pub fn submit(&self, artifacts: TaskArtifacts) -> GatResult<()> {
        self.queue()?.submit(artifacts)
    }

    /// Drain the queue and stop the writer. Every clone of the queue must
    /// be dropped first.
    pub fn finish(mut self) -> GatResult<MergeSummary> {
        self.queue.take();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| GatError::Other("artifact merger thread panicked".into())),
            None => Ok(MergeSummary::default()),
        }
    }
}

impl Drop for ArtifactMerger {
    fn drop(&mut self) {
        self.queue.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("artifact merger thread panicked");
            }
        }
    }
}

struct Sink {
    log: BufWriter<File>,
    csv: csv::Writer<BufWriter<File>>,
    cases_dir: PathBuf,
}

impl Sink {
    fn open(target: &MergeTarget) -> GatResult<Self> {
        let open = || -> anyhow::Result<Sink> {
            for path in [&target.log_path, &target.csv_path] {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating output directory '{}'", parent.display()))?;
                }
            }
            fs::create_dir_all(&target.cases_dir)
                .with_context(|| format!("creating case directory '{}'", target.cases_dir.display()))?;
            let log = File::create(&target.log_path)
                .with_context(|| format!("creating merged log '{}'", target.log_path.display()))?;
            let csv_file = File::create(&target.csv_path)
                .with_context(|| format!("creating merged CSV '{}'", target.csv_path.display()))?;
            let mut csv = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(BufWriter::new(csv_file));
            csv.write_record(RESULT_CSV_HEADER)?;
            csv.flush()?;
            Ok(Sink {
                log: BufWriter::new(log),
                csv,
                cases_dir: target.cases_dir.clone(),
            })
        };
        Ok(open()?)
    }

    fn merge(&mut self, artifacts: &TaskArtifacts) -> anyhow::Result<MergedTask> {
        let mut merged = MergedTask {
            task_id: artifacts.task_id.clone(),
            log_bytes: 0,
            csv_rows: 0,
            cases: 0,
        };

        let log_path = artifacts.log_path();
        if log_path.exists() {
            let mut file = File::open(&log_path)
                .with_context(|| format!("opening task log '{}'", log_path.display()))?;
            writeln!(self.log, "===== {} =====", artifacts.task_id)?;
            merged.log_bytes = io::copy(&mut file, &mut self.log).context("appending task log")?;
            self.log.flush()?;
        }

        let csv_path = artifacts.csv_path();
        if csv_path.exists() {
            let mut reader = csv::Reader::from_path(&csv_path)
                .with_context(|| format!("opening task CSV '{}'", csv_path.display()))?;
            for row in reader.deserialize::<ResultRow>() {
                let row = row.with_context(|| format!("reading task CSV '{}'", csv_path.display()))?;
                self.csv.serialize(&row)?;
                merged.csv_rows += 1;
            }
            self.csv.flush()?;
        }

        let cases = artifacts.cases_dir();
        if cases.is_dir() {
            for entry in fs::read_dir(&cases)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    let target = self.cases_dir.join(entry.file_name());
                    fs::copy(entry.path(), &target)
                        .with_context(|| format!("copying case to '{}'", target.display()))?;
                    merged.cases += 1;
                }
            }
        }

        Ok(merged)
    }
}

fn run_writer(mut sink: Sink, rx: Receiver<TaskArtifacts>) -> MergeSummary {
    debug!("artifact merger started");
    let mut summary = MergeSummary::default();

    while let Ok(artifacts) = rx.recv() {
        match sink.merge(&artifacts) {
            Ok(merged) => {
                info!(
                    task = %merged.task_id,
                    log_bytes = merged.log_bytes,
                    rows = merged.csv_rows,
                    cases = merged.cases,
                    "task artifacts merged"
                );
                summary.merged.push(merged);
            }
            Err(e) => {
                error!(task = %artifacts.task_id, error = %format!("{e:#}"), "merging task artifacts failed");
                summary.failed.push(PartitionFailure {
                    task_id: artifacts.task_id.clone(),
                    message: format!("merging artifacts: {e:#}"),
                });
            }
        }
        // dropping the artifacts removes the task's working directory
    }

    debug!(merged = summary.merged.len(), "artifact merger stopped");
    summary
}
