//! In-process task runner: one [`ActionSimulator`] per partition.

use crate::backend::TaskRunner;
use crate::task::{ExecutionTask, ResultRow, TaskArtifacts, RESULT_CSV_HEADER};
use anyhow::Context;
use gat_core::{GatResult, LoadFlow, Network};
use gat_remedial::{
    ActionDb, ActionSimulator, CancellationToken, CaseCompression, CaseExporter, JsonCaseWriter,
    ReportWriter, ScenarioResult, SimulationReport, SimulatorConfig,
};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const SKIPPED_STATUS: &str = "SKIPPED";

#[derive(Debug, Clone, PartialEq)]
struct CaseExport {
    basename: String,
    compression: CaseCompression,
}

/// Simulates the contingencies of each task on a private deep copy of the
/// base network and leaves `simulation.log`, `results.csv` and (optionally)
/// `cases/` in the task's working directory.
pub struct SimulationTaskRunner {
    network: Arc<Network>,
    db: Arc<ActionDb>,
    load_flow: Arc<dyn LoadFlow>,
    config: SimulatorConfig,
    export: Option<CaseExport>,
    cancel: CancellationToken,
}

impl SimulationTaskRunner {
    pub fn new(
        network: Arc<Network>,
        db: Arc<ActionDb>,
        load_flow: Arc<dyn LoadFlow>,
        config: SimulatorConfig,
    ) -> Self {
        Self {
            network,
            db,
            load_flow,
            config,
            export: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Export every converged state of every scenario into the task's
    /// `cases/` directory.
    pub fn with_case_export(mut self, basename: impl Into<String>, compression: CaseCompression) -> Self {
        self.export = Some(CaseExport {
            basename: basename.into(),
            compression,
        });
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn simulator(&self, task: &ExecutionTask) -> GatResult<ActionSimulator> {
        let log = File::create(task.log_path())?;
        let mut simulator = ActionSimulator::new(Arc::clone(&self.load_flow), self.config.clone())
            .with_default_observers()
            .with_cancellation(self.cancel.clone())
            .with_observer(Box::new(ReportWriter::new(BufWriter::new(log))));

        if let Some(export) = &self.export {
            fs::create_dir_all(task.cases_dir())?;
            let exporter = CaseExporter::new(task.cases_dir(), export.basename.as_str(), Box::new(JsonCaseWriter))
                .with_compression(export.compression);
            simulator = simulator.with_observer(Box::new(exporter));
        }
        Ok(simulator)
    }
}

impl TaskRunner for SimulationTaskRunner {
    fn run(&self, task: ExecutionTask) -> GatResult<TaskArtifacts> {
        self.cancel.check(&format!("task {}", task.id()))?;

        let mut network = self.network.deep_copy();
        let report = {
            let mut simulator = self.simulator(&task)?;
            simulator.start(&mut network, &self.db, task.contingency_ids())?
            // the report writer flushes when the simulator drops
        };

        let rows = result_rows(&report, reports_pre_contingency(&task));
        write_result_csv(&task.csv_path(), &rows)?;
        info!(
            task = task.id(),
            scenarios = rows.len(),
            skipped = report.skipped.len(),
            "task finished"
        );
        Ok(task.into_artifacts(rows.len()))
    }
}

/// Every task simulates the base case, but only the unpartitioned task or
/// the first partition reports it.
fn reports_pre_contingency(task: &ExecutionTask) -> bool {
    task.filtration().map_or(true, |f| f.index() == 1)
}

fn row(result: &ScenarioResult) -> ResultRow {
    ResultRow {
        contingency_id: result.label().to_string(),
        status: result.outcome.as_str().to_string(),
        rounds: result.rounds,
        actions: result.actions.join(";"),
    }
}

/// CSV rows of a report. The pre-contingency row (`N`) is only included
/// when `include_pre_contingency` is set.
pub fn result_rows(report: &SimulationReport, include_pre_contingency: bool) -> Vec<ResultRow> {
    let pre = include_pre_contingency.then(|| row(&report.pre_contingency));
    pre.into_iter()
        .chain(report.post_contingency.iter().map(row))
        .chain(report.skipped.iter().map(|id| ResultRow {
            contingency_id: id.clone(),
            status: SKIPPED_STATUS.to_string(),
            rounds: 0,
            actions: String::new(),
        }))
        .collect()
}

pub fn write_result_csv(path: &Path, rows: &[ResultRow]) -> GatResult<()> {
    let write = || -> anyhow::Result<()> {
        let file = File::create(path).with_context(|| format!("creating result CSV '{}'", path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        writer.write_record(RESULT_CSV_HEADER)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer
            .flush()
            .with_context(|| format!("writing result CSV '{}'", path.display()))?;
        Ok(())
    };
    Ok(write()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filtration::Filtration;
    use crate::task::TaskDescriptor;
    use gat_core::fixtures::{two_level_network, FeederLoadFlow};
    use gat_core::{Contingency, Megawatts, Modification};
    use gat_remedial::{Action, Condition, Rule};

    fn db() -> ActionDb {
        ActionDb::new(
            vec![Contingency::branch("LINE_1")],
            vec![Action::new(
                "shed",
                vec![Modification::SetLoad {
                    load: "LOAD_1".into(),
                    p0: Some(Megawatts(600.0)),
                    q0: None,
                }],
            )],
            vec![Rule::new("r1", Condition::overloaded("LINE_2"), "shed")],
        )
    }

    fn runner() -> SimulationTaskRunner {
        SimulationTaskRunner::new(
            Arc::new(two_level_network()),
            Arc::new(db()),
            Arc::new(FeederLoadFlow::new()),
            SimulatorConfig::default(),
        )
    }

    #[test]
    fn test_task_writes_log_and_rows() {
        let task = ExecutionTask::new(
            Some(Filtration::new(1, 1).unwrap()),
            vec!["LINE_1".into()],
            TaskDescriptor::default(),
        )
        .unwrap();
        let artifacts = runner().run(task).unwrap();
        assert_eq!(artifacts.scenarios, 2);

        let csv = fs::read_to_string(artifacts.csv_path()).unwrap();
        assert_eq!(
            csv,
            "contingency_id,status,rounds,actions\nN,NO_VIOLATIONS,0,\nLINE_1,NO_VIOLATIONS,1,shed\n"
        );
        let log = fs::read_to_string(artifacts.log_path()).unwrap();
        assert!(log.contains("[LINE_1] apply action 'shed'"), "{log}");
        assert!(!artifacts.cases_dir().exists());
    }

    #[test]
    fn test_later_partitions_leave_out_the_base_case() {
        let task = ExecutionTask::new(
            Some(Filtration::new(2, 2).unwrap()),
            vec!["LINE_1".into()],
            TaskDescriptor::default(),
        )
        .unwrap();
        let artifacts = runner().run(task).unwrap();
        let csv = fs::read_to_string(artifacts.csv_path()).unwrap();
        assert_eq!(csv, "contingency_id,status,rounds,actions\nLINE_1,NO_VIOLATIONS,1,shed\n");
    }

    #[test]
    fn test_pre_contingency_task_reports_n() {
        let task = ExecutionTask::new(None, vec![], TaskDescriptor::default()).unwrap();
        let artifacts = runner()
            .with_case_export("study", CaseCompression::None)
            .run(task)
            .unwrap();
        let csv = fs::read_to_string(artifacts.csv_path()).unwrap();
        assert_eq!(csv.lines().nth(1), Some("N,NO_VIOLATIONS,0,"));
        assert!(artifacts.cases_dir().join("study-N-R0.json").exists());
    }

    #[test]
    fn test_cancelled_runner_does_not_simulate() {
        let load_flow = Arc::new(FeederLoadFlow::new());
        let token = CancellationToken::new();
        token.cancel();
        let runner = SimulationTaskRunner::new(
            Arc::new(two_level_network()),
            Arc::new(db()),
            load_flow.clone(),
            SimulatorConfig::default(),
        )
        .with_cancellation(token);
        let task = ExecutionTask::new(None, vec![], TaskDescriptor::default()).unwrap();
        assert!(matches!(runner.run(task), Err(gat_core::GatError::Cancelled(_))));
        assert_eq!(load_flow.calls(), 0);
    }
}
