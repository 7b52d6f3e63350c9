//! Parallel orchestrator.
//!
//! Splits the contingency list into `min(workers, n)` contiguous partitions,
//! dispatches one [`ExecutionTask`] per partition to an [`ExecutionBackend`],
//! and hands each finished task's artifacts to the [`ArtifactMerger`] in
//! completion order. The [`JoinPolicy`] decides what a failed task does to
//! the batch; a `batch_manifest.json` is written in every case.

use crate::backend::{Completion, ExecutionBackend, ThreadPoolBackend};
use crate::config::{BatchConfig, JoinPolicy};
use crate::filtration::Filtration;
use crate::manifest::{write_batch_manifest, BatchManifest};
use crate::merge::{ArtifactMerger, MergeSummary};
use crate::runner::SimulationTaskRunner;
use crate::task::{ExecutionTask, TaskArtifacts, TaskDescriptor, TaskRecord, TaskStatus};
use gat_core::{GatError, GatResult, LoadFlow, Network, PartitionFailure};
use gat_remedial::{ActionDb, CancellationToken, CaseCompression, SimulatorConfig};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Partitions for `n` contingencies over `workers` requested workers.
///
/// `workers == 0` is rejected. With no contingency a single unpartitioned
/// (`None`) entry runs the pre-contingency case alone.
pub fn plan_partitions(n: usize, workers: usize) -> GatResult<Vec<Option<Filtration>>> {
    if workers == 0 {
        return Err(GatError::Validation("worker count must be at least 1".into()));
    }
    if n == 0 {
        return Ok(vec![None]);
    }
    let effective = workers.min(n);
    (1..=effective)
        .map(|i| Filtration::new(i, effective).map(Some))
        .collect()
}

/// Outcome of a batch that was not aborted.
#[derive(Debug)]
pub struct BatchReport {
    /// One record per planned task, in partition order.
    pub tasks: Vec<TaskRecord>,
    pub failures: Vec<PartitionFailure>,
    pub merge: MergeSummary,
    pub manifest_path: PathBuf,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn collected failures into [`GatError::Batch`].
    pub fn into_result(self) -> GatResult<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(GatError::Batch(self.failures))
        }
    }
}

/// Bookkeeping of one `run`.
struct RunState {
    policy: JoinPolicy,
    records: Vec<TaskRecord>,
    failures: Vec<PartitionFailure>,
    first_error: Option<GatError>,
    cancelled: bool,
}

impl RunState {
    fn fail(&mut self, index: usize, error: GatError) {
        let record = &mut self.records[index];
        record.status = TaskStatus::Error;
        record.error = Some(error.to_string());
        self.failures.push(PartitionFailure {
            task_id: record.task_id.clone(),
            message: error.to_string(),
        });
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    fn aborted(&self) -> bool {
        self.policy == JoinPolicy::AllOrNothing && self.first_error.is_some()
    }
}

pub struct Orchestrator<B: ExecutionBackend> {
    backend: B,
    config: BatchConfig,
    descriptor: TaskDescriptor,
    cancel: CancellationToken,
}

impl Orchestrator<ThreadPoolBackend> {
    /// Thread-pool orchestrator running [`SimulationTaskRunner`]s that share
    /// this orchestrator's cancellation token.
    pub fn in_process(
        network: Arc<Network>,
        db: Arc<ActionDb>,
        load_flow: Arc<dyn LoadFlow>,
        simulator: SimulatorConfig,
        config: BatchConfig,
    ) -> GatResult<Self> {
        simulator.validate()?;
        config.validate()?;
        let cancel = CancellationToken::new();
        let mut runner =
            SimulationTaskRunner::new(network, db, load_flow, simulator).with_cancellation(cancel.clone());
        if config.export_cases {
            let compression = match config.compress_cases {
                Some(level) => CaseCompression::Zstd { level },
                None => CaseCompression::None,
            };
            runner = runner.with_case_export(config.case_basename.clone(), compression);
        }
        let backend = ThreadPoolBackend::new(config.threads, Arc::new(runner))?;
        Ok(Self::new(backend, config).with_cancellation(cancel))
    }
}

impl<B: ExecutionBackend> Orchestrator<B> {
    pub fn new(backend: B, config: BatchConfig) -> Self {
        Self {
            backend,
            config,
            descriptor: TaskDescriptor::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Case and action files recorded in each task's arguments.
    pub fn with_descriptor(mut self, descriptor: TaskDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// One task per partition of `contingency_ids`.
    pub fn plan(&self, contingency_ids: &[String]) -> GatResult<Vec<ExecutionTask>> {
        plan_partitions(contingency_ids.len(), self.config.workers)?
            .into_iter()
            .map(|filtration| {
                let ids = match filtration {
                    Some(f) => f.filter(contingency_ids)?.to_vec(),
                    None => Vec::new(),
                };
                ExecutionTask::new(filtration, ids, self.descriptor.clone())
            })
            .collect()
    }

    /// Run every partition and merge the results.
    ///
    /// Under [`JoinPolicy::AllOrNothing`] the first task error is returned
    /// once every dispatched task has finished; later artifacts are
    /// discarded. Under [`JoinPolicy::CollectErrors`] failures are listed in
    /// the report. Cancellation yields [`GatError::Cancelled`].
    pub fn run(&self, contingency_ids: &[String]) -> GatResult<BatchReport> {
        self.config.validate()?;
        let tasks = self.plan(contingency_ids)?;
        info!(
            contingencies = contingency_ids.len(),
            tasks = tasks.len(),
            policy = ?self.config.join_policy,
            "starting batch"
        );

        let merger = ArtifactMerger::new(self.config.merge_target())?;
        let mut state = RunState {
            policy: self.config.join_policy,
            records: Vec::with_capacity(tasks.len()),
            failures: Vec::new(),
            first_error: None,
            cancelled: false,
        };

        let (done_tx, done_rx) = mpsc::channel::<Completion>();
        let mut outstanding = vec![false; tasks.len()];
        for (index, task) in tasks.into_iter().enumerate() {
            state.records.push(TaskRecord {
                task_id: task.id().to_string(),
                partition: task.filtration().map(|f| f.to_string()),
                contingencies: task.contingency_ids().len(),
                status: TaskStatus::Cancelled,
                error: None,
                args: task.descriptor().to_args(),
                merged_cases: 0,
                merged_rows: 0,
            });
            if self.cancel.is_cancelled() {
                state.cancelled = true;
                continue;
            }
            debug!(task = task.id(), "dispatching task");
            outstanding[index] = true;
            self.backend.execute_into(task, index, done_tx.clone());
        }
        // the channel closes once every dispatched task has reported
        drop(done_tx);

        for (index, result) in done_rx {
            outstanding[index] = false;
            self.settle(&mut state, &merger, index, result);
        }
        for index in (0..outstanding.len()).filter(|&i| outstanding[i]) {
            let lost = format!("task {} ended without reporting a result", state.records[index].task_id);
            state.fail(index, GatError::Other(lost));
        }

        let merge = merger.finish()?;
        for merged in &merge.merged {
            if let Some(record) = state.records.iter_mut().find(|r| r.task_id == merged.task_id) {
                record.merged_rows = merged.csv_rows;
                record.merged_cases = merged.cases;
            }
        }
        for failure in &merge.failed {
            if let Some(index) = state.records.iter().position(|r| r.task_id == failure.task_id) {
                state.fail(index, GatError::Other(failure.message.clone()));
            }
        }

        let manifest_path = self.config.manifest_path();
        let manifest = BatchManifest::new(self.config.join_policy, contingency_ids.len(), state.records.clone());
        write_batch_manifest(&manifest_path, &manifest)?;
        info!(
            success = manifest.success,
            failure = manifest.failure,
            manifest = %manifest_path.display(),
            "batch finished"
        );

        if state.cancelled {
            return Err(GatError::Cancelled(format!(
                "batch cancelled after {} of {} task(s)",
                manifest.success, manifest.num_tasks
            )));
        }
        if state.policy == JoinPolicy::AllOrNothing {
            if let Some(error) = state.first_error {
                return Err(error);
            }
        }
        Ok(BatchReport {
            tasks: state.records,
            failures: state.failures,
            merge,
            manifest_path,
        })
    }

    fn settle(
        &self,
        state: &mut RunState,
        merger: &ArtifactMerger,
        index: usize,
        result: GatResult<TaskArtifacts>,
    ) {
        match result {
            Ok(artifacts) => {
                if self.cancel.is_cancelled() {
                    state.cancelled = true;
                    debug!(task = %artifacts.task_id, "batch cancelled, artifacts dropped");
                } else if state.aborted() {
                    state.records[index].status = TaskStatus::Discarded;
                    debug!(task = %artifacts.task_id, "batch failed, artifacts discarded");
                } else {
                    match merger.submit(artifacts) {
                        Ok(()) => state.records[index].status = TaskStatus::Ok,
                        Err(e) => state.fail(index, e),
                    }
                }
            }
            Err(GatError::Cancelled(point)) => {
                debug!(task = %state.records[index].task_id, %point, "task cancelled");
                state.cancelled = true;
            }
            Err(e) => {
                warn!(task = %state.records[index].task_id, error = %e, "task failed");
                state.fail(index, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workers_are_capped_by_the_contingency_count() {
        let plan = plan_partitions(3, 7).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2], Some(Filtration::new(3, 3).unwrap()));
    }

    #[test]
    fn test_zero_workers_is_a_validation_error() {
        assert!(plan_partitions(5, 0).unwrap_err().is_validation());
    }

    #[test]
    fn test_no_contingency_runs_the_base_case_once() {
        assert_eq!(plan_partitions(0, 4).unwrap(), vec![None]);
    }

    /// Backend whose tasks never report.
    struct Silent;

    impl ExecutionBackend for Silent {
        fn execute(&self, task: ExecutionTask) -> crate::backend::TaskHandle {
            let (_tx, rx) = mpsc::channel();
            crate::backend::TaskHandle::new(task.id(), rx)
        }

        fn execute_into(&self, _task: ExecutionTask, _index: usize, _done: mpsc::Sender<Completion>) {}
    }

    #[test]
    fn test_tasks_that_never_report_are_failed() {
        let out = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            workers: 2,
            join_policy: JoinPolicy::CollectErrors,
            output_folder: out.path().to_path_buf(),
            ..Default::default()
        };
        let report = Orchestrator::new(Silent, config)
            .run(&["A".to_string(), "B".to_string()])
            .unwrap();
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].message.contains("without reporting"));
        assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Error));
    }

    #[test]
    fn test_report_failures_become_a_batch_error() {
        let report = BatchReport {
            tasks: vec![],
            failures: vec![PartitionFailure {
                task_id: "task-2-of-2".into(),
                message: "boom".into(),
            }],
            merge: MergeSummary::default(),
            manifest_path: PathBuf::from("batch_manifest.json"),
        };
        assert!(!report.is_success());
        match report.into_result() {
            Err(GatError::Batch(failures)) => assert_eq!(failures[0].task_id, "task-2-of-2"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
