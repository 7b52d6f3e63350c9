//! # gat-batch: Partitioned, parallel remedial-action simulation
//!
//! A contingency list is split into contiguous [`Filtration`] slices, one
//! [`ExecutionTask`] per slice. Each task runs on an [`ExecutionBackend`]
//! (the stock [`ThreadPoolBackend`] runs a [`SimulationTaskRunner`] per task
//! on a rayon pool) and writes its log, result CSV and exported cases into a
//! private temporary directory. Finished tasks are merged by a single writer
//! thread ([`ArtifactMerger`]) into the batch output folder, next to a
//! `batch_manifest.json`.
//!
//! ```ignore
//! use gat_batch::{BatchConfig, Orchestrator};
//!
//! let orchestrator = Orchestrator::in_process(network, db, load_flow, simulator_config, BatchConfig::load("batch.toml")?)?;
//! let report = orchestrator.run(&contingency_ids)?.into_result()?;
//! ```

pub mod backend;
pub mod config;
pub mod filtration;
pub mod manifest;
pub mod merge;
pub mod orchestrator;
pub mod runner;
pub mod task;

pub use backend::{Completion, ExecutionBackend, TaskHandle, TaskRunner, ThreadPoolBackend};
pub use config::{BatchConfig, JoinPolicy};
pub use filtration::Filtration;
pub use manifest::{load_batch_manifest, write_batch_manifest, BatchManifest, MANIFEST_FILE};
pub use merge::{ArtifactMerger, MergeQueue, MergeSummary, MergeTarget, MergedTask};
pub use orchestrator::{plan_partitions, BatchReport, Orchestrator};
pub use runner::{result_rows, write_result_csv, SimulationTaskRunner};
pub use task::{
    ExecutionTask, ResultRow, TaskArtifacts, TaskDescriptor, TaskRecord, TaskStatus, RESULT_CSV_HEADER,
};
