use gat_batch::{
    load_batch_manifest, write_result_csv, BatchConfig, ExecutionTask, JoinPolicy, Orchestrator, ResultRow,
    TaskArtifacts, TaskRunner, TaskStatus, ThreadPoolBackend,
};
use gat_core::fixtures::{two_level_network, FeederLoadFlow, ScriptedLoadFlow};
use gat_core::{Contingency, GatError, GatResult, LoadFlowResult, Megawatts, Modification};
use gat_remedial::{Action, ActionDb, CancellationToken, Condition, Rule, SimulatorConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn db() -> ActionDb {
    ActionDb::new(
        vec![Contingency::branch("LINE_1"), Contingency::branch("LINE_2")],
        vec![Action::new(
            "shed",
            vec![Modification::SetLoad {
                load: "LOAD_1".into(),
                p0: Some(Megawatts(600.0)),
                q0: None,
            }],
        )],
        vec![
            Rule::new("line2", Condition::overloaded("LINE_2"), "shed"),
            Rule::new("line1", Condition::overloaded("LINE_1"), "shed"),
        ],
    )
}

fn batch_config(output: &Path, workers: usize) -> BatchConfig {
    BatchConfig {
        workers,
        threads: 2,
        output_folder: output.to_path_buf(),
        ..Default::default()
    }
}

fn in_process(config: BatchConfig, load_flow: Arc<FeederLoadFlow>) -> Orchestrator<ThreadPoolBackend> {
    Orchestrator::in_process(
        Arc::new(two_level_network()),
        Arc::new(db()),
        load_flow,
        SimulatorConfig::default(),
        config,
    )
    .unwrap()
}

fn csv_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
}

#[test]
fn test_partitions_run_in_parallel_and_merge_into_one_output() {
    init_tracing();
    let out = tempfile::tempdir().unwrap();
    let config = BatchConfig {
        export_cases: true,
        case_basename: "study".into(),
        ..batch_config(out.path(), 4)
    };
    let orchestrator = in_process(config, Arc::new(FeederLoadFlow::new()));

    let report = orchestrator.run(&ids(&["LINE_1", "LINE_2"])).unwrap();
    assert!(report.is_success());
    // four workers requested, two contingencies
    let task_ids: Vec<_> = report.tasks.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(task_ids, vec!["task-1-of-2", "task-2-of-2"]);
    assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Ok));
    // the first partition also reports the base case
    let merged_rows: Vec<_> = report.tasks.iter().map(|t| t.merged_rows).collect();
    assert_eq!(merged_rows, vec![2, 1]);

    let mut lines = csv_lines(&out.path().join("results.csv"));
    assert_eq!(lines.remove(0), "contingency_id,status,rounds,actions");
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "LINE_1,NO_VIOLATIONS,1,shed",
            "LINE_2,NO_VIOLATIONS,1,shed",
            "N,NO_VIOLATIONS,0,"
        ]
    );

    let log = fs::read_to_string(out.path().join("simulation.log")).unwrap();
    assert!(log.contains("===== task-1-of-2 ====="));
    assert!(log.contains("===== task-2-of-2 ====="));
    assert!(log.contains("[LINE_2] apply action 'shed'"));

    let cases = out.path().join("cases");
    for name in ["study-LINE_1-R0.json", "study-LINE_1-R1.json", "study-LINE_2-R1.json", "study-N-R0.json"] {
        assert!(cases.join(name).exists(), "{name}");
    }

    let manifest = load_batch_manifest(&report.manifest_path).unwrap();
    assert_eq!((manifest.num_tasks, manifest.success, manifest.failure), (2, 2, 0));
    assert_eq!(manifest.contingencies, 2);
    assert_eq!(manifest.tasks[1].partition.as_deref(), Some("2/2"));
    assert!(manifest.tasks[1].args.contains(&"--sub-contingencies=2/2".to_string()));
}

#[test]
fn test_diverged_base_case_is_reported_once() {
    let out = tempfile::tempdir().unwrap();
    let load_flow = Arc::new(ScriptedLoadFlow::new(|_, _| Ok(LoadFlowResult::failed())));
    let orchestrator = Orchestrator::in_process(
        Arc::new(two_level_network()),
        Arc::new(db()),
        load_flow.clone(),
        SimulatorConfig::default(),
        batch_config(out.path(), 2),
    )
    .unwrap();

    let report = orchestrator.run(&ids(&["LINE_1", "LINE_2"])).unwrap();
    assert_eq!(report.tasks.len(), 2);
    // each task runs the base case and nothing else
    assert_eq!(load_flow.calls(), 2);

    let mut lines = csv_lines(&out.path().join("results.csv"));
    lines.remove(0);
    lines.sort();
    assert_eq!(lines, vec!["LINE_1,SKIPPED,0,", "LINE_2,SKIPPED,0,", "N,DIVERGED,0,"]);
}

#[test]
fn test_empty_contingency_list_runs_the_base_case_once() {
    let out = tempfile::tempdir().unwrap();
    let load_flow = Arc::new(FeederLoadFlow::new());
    let orchestrator = in_process(batch_config(out.path(), 3), load_flow.clone());

    let report = orchestrator.run(&[]).unwrap();
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].task_id, "task-N");
    assert_eq!(report.tasks[0].partition, None);
    assert_eq!(load_flow.calls(), 1);
    assert_eq!(
        csv_lines(&out.path().join("results.csv")),
        vec!["contingency_id,status,rounds,actions", "N,NO_VIOLATIONS,0,"]
    );
}

#[test]
fn test_unknown_contingency_fails_the_batch() {
    let out = tempfile::tempdir().unwrap();
    let orchestrator = in_process(batch_config(out.path(), 1), Arc::new(FeederLoadFlow::new()));
    let err = orchestrator.run(&ids(&["LINE_9"])).unwrap_err();
    assert!(err.is_validation(), "{err}");
}

#[test]
fn test_zero_workers_is_a_validation_error() {
    let out = tempfile::tempdir().unwrap();
    let err = Orchestrator::in_process(
        Arc::new(two_level_network()),
        Arc::new(db()),
        Arc::new(FeederLoadFlow::new()),
        SimulatorConfig::default(),
        batch_config(out.path(), 0),
    )
    .err()
    .unwrap();
    assert!(err.is_validation(), "{err}");

    let backend = ThreadPoolBackend::new(1, Arc::new(Scripted { fail_task: "", cancel: None })).unwrap();
    let err = Orchestrator::new(backend, batch_config(out.path(), 0))
        .run(&ids(&["LINE_1"]))
        .unwrap_err();
    assert!(err.is_validation(), "{err}");
    assert!(!out.path().join("batch_manifest.json").exists());
}

/// Writes one row per contingency and fails on a chosen task.
struct Scripted {
    fail_task: &'static str,
    cancel: Option<CancellationToken>,
}

impl TaskRunner for Scripted {
    fn run(&self, task: ExecutionTask) -> GatResult<TaskArtifacts> {
        if task.id() == self.fail_task {
            return Err(GatError::Solver(format!("{} diverged hard", task.id())));
        }
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        let rows: Vec<_> = task
            .contingency_ids()
            .iter()
            .map(|id| ResultRow {
                contingency_id: id.clone(),
                status: "NO_VIOLATIONS".into(),
                rounds: 0,
                actions: String::new(),
            })
            .collect();
        fs::write(task.log_path(), format!("{} done\n", task.id()))?;
        write_result_csv(&task.csv_path(), &rows)?;
        Ok(task.into_artifacts(rows.len()))
    }
}

fn scripted(output: &Path, policy: JoinPolicy, runner: Scripted) -> Orchestrator<ThreadPoolBackend> {
    let config = BatchConfig {
        join_policy: policy,
        ..batch_config(output, 3)
    };
    let backend = ThreadPoolBackend::new(2, Arc::new(runner)).unwrap();
    Orchestrator::new(backend, config)
}

#[test]
fn test_collect_errors_merges_the_successful_partitions() {
    let out = tempfile::tempdir().unwrap();
    let runner = Scripted {
        fail_task: "task-2-of-3",
        cancel: None,
    };
    let orchestrator = scripted(out.path(), JoinPolicy::CollectErrors, runner);

    let report = orchestrator.run(&ids(&["A", "B", "C", "D", "E", "F"])).unwrap();
    let statuses: Vec<_> = report.tasks.iter().map(|t| t.status).collect();
    assert_eq!(statuses, vec![TaskStatus::Ok, TaskStatus::Error, TaskStatus::Ok]);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].message.contains("diverged hard"));

    let mut rows = csv_lines(&out.path().join("results.csv"));
    rows.remove(0);
    rows.sort();
    assert_eq!(
        rows,
        vec!["A,NO_VIOLATIONS,0,", "B,NO_VIOLATIONS,0,", "E,NO_VIOLATIONS,0,", "F,NO_VIOLATIONS,0,"]
    );

    match report.into_result() {
        Err(GatError::Batch(failures)) => assert_eq!(failures[0].task_id, "task-2-of-3"),
        other => panic!("expected a batch error, got {other:?}"),
    }
}

#[test]
fn test_all_or_nothing_returns_the_task_error() {
    let out = tempfile::tempdir().unwrap();
    let runner = Scripted {
        fail_task: "task-1-of-3",
        cancel: None,
    };
    let orchestrator = scripted(out.path(), JoinPolicy::AllOrNothing, runner);

    let err = orchestrator.run(&ids(&["A", "B", "C"])).unwrap_err();
    assert!(matches!(err, GatError::Solver(ref m) if m.contains("task-1-of-3")), "{err}");

    let manifest = load_batch_manifest(&out.path().join("batch_manifest.json")).unwrap();
    assert_eq!(manifest.failure, 1);
    assert_eq!(manifest.tasks[0].status, TaskStatus::Error);
    assert!(manifest.tasks[0].error.is_some());
}

#[test]
fn test_cancellation_before_dispatch_runs_nothing() {
    let out = tempfile::tempdir().unwrap();
    let load_flow = Arc::new(FeederLoadFlow::new());
    let orchestrator = in_process(batch_config(out.path(), 2), load_flow.clone());
    orchestrator.cancellation_token().cancel();

    let err = orchestrator.run(&ids(&["LINE_1", "LINE_2"])).unwrap_err();
    assert!(matches!(err, GatError::Cancelled(_)));
    assert_eq!(load_flow.calls(), 0);

    let manifest = load_batch_manifest(&out.path().join("batch_manifest.json")).unwrap();
    assert!(manifest.tasks.iter().all(|t| t.status == TaskStatus::Cancelled));
    assert_eq!(csv_lines(&out.path().join("results.csv")).len(), 1);
}

#[test]
fn test_cancellation_during_the_batch_stops_merging() {
    let out = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let runner = Scripted {
        fail_task: "",
        cancel: Some(token.clone()),
    };
    let orchestrator = scripted(out.path(), JoinPolicy::AllOrNothing, runner).with_cancellation(token);

    let err = orchestrator.run(&ids(&["A", "B", "C"])).unwrap_err();
    assert!(matches!(err, GatError::Cancelled(_)), "{err}");
    // every task cancels before it is collected, so nothing is merged
    assert_eq!(csv_lines(&out.path().join("results.csv")).len(), 1);
}
