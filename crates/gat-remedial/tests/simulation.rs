use gat_core::{
    fixtures, Contingency, GatError, LoadFlowResult, Megawatts, Modification, INITIAL_VARIANT_ID,
};
use gat_remedial::{
    Action, ActionDb, ActionSimulator, CancellationToken, CaseExporter, Condition, CopyStrategy,
    JsonCaseWriter, ResultCollector, Rule, RuleEvaluationStatus, RuleMatchPolicy, RunningContext,
    ScenarioOutcome, SimulatorConfig, SimulatorObserver,
};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn actions() -> Vec<Action> {
    vec![
        Action::new(
            "shed",
            vec![Modification::SetLoad {
                load: "LOAD_1".into(),
                p0: Some(Megawatts(600.0)),
                q0: None,
            }],
        ),
        Action::new(
            "couple",
            vec![Modification::CloseSwitch {
                switch: "COUPLER".into(),
            }],
        ),
        Action::new(
            "bad_shunt",
            vec![Modification::SetShuntSections {
                shunt: "SHUNT_1".into(),
                section_count: 9,
            }],
        ),
    ]
}

fn db(rules: Vec<Rule>) -> ActionDb {
    ActionDb::new(
        vec![Contingency::branch("LINE_1"), Contingency::branch("LINE_2")],
        actions(),
        rules,
    )
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn variant_config() -> SimulatorConfig {
    SimulatorConfig {
        copy_strategy: CopyStrategy::Variant,
        ..Default::default()
    }
}

/// Records event names as `<scenario>:<event>`.
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn push(&self, ctx: &RunningContext<'_>, event: &str) {
        self.0
            .lock()
            .unwrap()
            .push(format!("{}:{}", ctx.scenario_label(), event));
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, suffix: &str) -> usize {
        self.events().iter().filter(|e| e.ends_with(suffix)).count()
    }
}

impl SimulatorObserver for EventLog {
    fn before_post_contingency_analysis(&mut self, ctx: &RunningContext<'_>) {
        self.push(ctx, "before_post");
    }

    fn post_contingency_analysis_network_loaded(&mut self, ctx: &RunningContext<'_>) {
        self.push(ctx, "network_loaded");
    }

    fn round_begin(&mut self, ctx: &RunningContext<'_>) {
        self.push(ctx, &format!("round_begin({})", ctx.round()));
    }

    fn round_end(&mut self, ctx: &RunningContext<'_>) {
        self.push(ctx, &format!("round_end({})", ctx.round()));
    }

    fn load_flow_converged(&mut self, ctx: &RunningContext<'_>, violations: &[gat_core::LimitViolation]) {
        self.push(ctx, &format!("converged({})", violations.len()));
    }

    fn no_more_violations(&mut self, ctx: &RunningContext<'_>) {
        self.push(ctx, "no_more_violations");
    }

    fn rule_evaluated(&mut self, ctx: &RunningContext<'_>, rule_id: &str, status: RuleEvaluationStatus) {
        self.push(ctx, &format!("rule({rule_id}={status})"));
    }

    fn before_action(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        self.push(ctx, &format!("before_action({action_id})"));
    }

    fn after_action(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        self.push(ctx, &format!("after_action({action_id})"));
    }

    fn before_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        self.push(ctx, &format!("before_test({action_id})"));
    }

    fn no_more_violations_after_test(&mut self, ctx: &RunningContext<'_>, action_id: &str) {
        self.push(ctx, &format!("solved_by_test({action_id})"));
    }

    fn scenario_finished(&mut self, ctx: &RunningContext<'_>, outcome: ScenarioOutcome) {
        self.push(ctx, &format!("finished({outcome})"));
    }
}

#[test]
fn test_overloaded_contingency_terminates_after_two_rounds() {
    init_tracing();
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let log = EventLog::default();
    let db = db(vec![Rule::new("relieve", Condition::overloaded("LINE_2"), "shed")]);

    let mut simulator = ActionSimulator::new(load_flow.clone(), variant_config())
        .with_default_observers()
        .with_observer(Box::new(log.clone()));
    let report = simulator.start(&mut network, &db, &ids(&["LINE_1"])).unwrap();

    let post = report.scenario("LINE_1").unwrap();
    assert_eq!(post.outcome, ScenarioOutcome::NoViolations);
    assert_eq!(post.actions, vec!["shed"]);
    assert!(post.violations.is_empty());

    let line_1: Vec<String> = log
        .events()
        .into_iter()
        .filter(|e| e.starts_with("LINE_1:"))
        .collect();
    assert_eq!(
        line_1,
        vec![
            "LINE_1:before_post",
            "LINE_1:network_loaded",
            "LINE_1:round_begin(0)",
            "LINE_1:converged(2)",
            "LINE_1:rule(relieve=TRUE)",
            "LINE_1:before_action(shed)",
            "LINE_1:after_action(shed)",
            "LINE_1:round_end(0)",
            "LINE_1:round_begin(1)",
            "LINE_1:converged(0)",
            "LINE_1:no_more_violations",
            "LINE_1:round_end(1)",
            "LINE_1:finished(NO_VIOLATIONS)",
        ]
    );
    assert_eq!(load_flow.calls(), 3);

    // the caller's network is untouched
    assert_eq!(network.variant_ids(), vec![INITIAL_VARIANT_ID]);
    let load = network.find_equipment("LOAD_1").unwrap();
    assert!(matches!(
        network.setpoint(load),
        gat_core::Setpoint::Load { p0, .. } if *p0 == Megawatts(900.0)
    ));
}

#[test]
fn test_clean_network_runs_the_solver_once() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let log = EventLog::default();
    let db = db(vec![Rule::new("never", Condition::AnyViolation, "shed")]);

    let mut simulator = ActionSimulator::new(load_flow.clone(), SimulatorConfig::default())
        .with_observer(Box::new(log.clone()));
    let report = simulator.start(&mut network, &db, &[]).unwrap();

    assert_eq!(report.pre_contingency.outcome, ScenarioOutcome::NoViolations);
    assert_eq!(report.pre_contingency.rounds, 0);
    assert!(report.post_contingency.is_empty());
    assert_eq!(load_flow.calls(), 1);
    assert_eq!(log.count("rule(never=TRUE)"), 0);
    assert_eq!(log.count("rule(never=FALSE)"), 0);
}

#[test]
fn test_first_match_applies_one_action_per_round() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let log = EventLog::default();
    let db = db(vec![
        Rule::new("relieve", Condition::AnyViolation, "shed"),
        Rule::new("also", Condition::AnyViolation, "couple"),
    ]);

    let mut simulator = ActionSimulator::new(load_flow, SimulatorConfig::default())
        .with_observer(Box::new(log.clone()));
    let report = simulator.start(&mut network, &db, &ids(&["LINE_1"])).unwrap();

    assert_eq!(report.scenario("LINE_1").unwrap().actions, vec!["shed"]);
    assert_eq!(log.count("rule(also=TRUE)"), 0);
    assert_eq!(log.count("rule(also=FALSE)"), 0);
}

#[test]
fn test_all_matching_applies_every_matched_action() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let db = db(vec![
        Rule::new("relieve", Condition::AnyViolation, "shed"),
        Rule::new("also", Condition::AnyViolation, "couple"),
        Rule::new("again", Condition::AnyViolation, "shed"),
    ]);
    let config = SimulatorConfig {
        rule_match_policy: RuleMatchPolicy::AllMatching,
        ..Default::default()
    };

    let mut simulator = ActionSimulator::new(load_flow, config);
    let report = simulator.start(&mut network, &db, &ids(&["LINE_1"])).unwrap();

    let post = report.scenario("LINE_1").unwrap();
    assert_eq!(post.actions, vec!["shed", "couple"]);
    assert_eq!(post.rounds, 1);
}

#[test]
fn test_exhausted_rule_leads_to_no_rule_matched() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let collector = ResultCollector::new();
    let db = db(vec![
        Rule::new("couple_once", Condition::AnyViolation, "couple").with_life(1),
    ]);

    let mut simulator = ActionSimulator::new(load_flow, variant_config())
        .with_observer(Box::new(collector.clone()));
    let report = simulator.start(&mut network, &db, &ids(&["LINE_1"])).unwrap();

    let post = report.scenario("LINE_1").unwrap();
    assert_eq!(post.outcome, ScenarioOutcome::NoRuleMatched);
    assert_eq!(post.rounds, 1);
    assert_eq!(post.actions, vec!["couple"]);
    // both sides of LINE_2
    assert_eq!(post.violations.len(), 2);
    assert!(post.violations.iter().all(|v| v.subject_id == "LINE_2"));

    let trace = collector.scenario(Some("LINE_1")).unwrap();
    assert_eq!(trace.rounds.len(), 2);
    assert_eq!(
        trace.rounds[1].rules,
        vec![("couple_once".to_string(), RuleEvaluationStatus::Dead)]
    );
}

#[test]
fn test_max_rounds_reached() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let db = db(vec![Rule::new("couple", Condition::AnyViolation, "couple")]);
    let config = SimulatorConfig {
        max_rounds: 3,
        ..Default::default()
    };

    let mut simulator = ActionSimulator::new(load_flow.clone(), config);
    let report = simulator.start(&mut network, &db, &ids(&["LINE_1"])).unwrap();

    let post = report.scenario("LINE_1").unwrap();
    assert_eq!(post.outcome, ScenarioOutcome::MaxRoundsReached);
    assert_eq!(post.rounds, 3);
    assert_eq!(post.actions.len(), 3);
    // pre + three post rounds
    assert_eq!(load_flow.calls(), 4);
}

#[test]
fn test_solving_test_action_is_applied_when_configured() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let log = EventLog::default();
    let db = db(vec![
        Rule::test("try_couple", Condition::AnyViolation, "couple"),
        Rule::test("try_shed", Condition::AnyViolation, "shed"),
    ]);
    let config = SimulatorConfig {
        apply_if_solved_violations: true,
        ..variant_config()
    };

    let mut simulator = ActionSimulator::new(load_flow, config).with_observer(Box::new(log.clone()));
    let report = simulator.start(&mut network, &db, &ids(&["LINE_1"])).unwrap();

    let post = report.scenario("LINE_1").unwrap();
    assert_eq!(post.outcome, ScenarioOutcome::NoViolations);
    assert_eq!(post.rounds, 0);
    assert_eq!(post.actions, vec!["shed"]);
    assert_eq!(post.solving_tests, vec!["shed"]);
    assert_eq!(log.count("before_test(couple)"), 1);
    assert_eq!(log.count("solved_by_test(shed)"), 1);
    assert_eq!(network.variant_ids(), vec![INITIAL_VARIANT_ID]);
}

#[test]
fn test_solving_test_is_only_reported_by_default() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let db = db(vec![Rule::test("try_shed", Condition::AnyViolation, "shed")]);

    let mut simulator = ActionSimulator::new(load_flow, SimulatorConfig::default());
    let report = simulator.start(&mut network, &db, &ids(&["LINE_1"])).unwrap();

    let post = report.scenario("LINE_1").unwrap();
    assert_eq!(post.outcome, ScenarioOutcome::NoRuleMatched);
    assert_eq!(post.solving_tests, vec!["shed"]);
    assert!(post.actions.is_empty());
}

#[test]
fn test_ignored_pre_contingency_violations_still_run_contingencies() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let config = SimulatorConfig {
        ignore_pre_contingency_violations: true,
        limit_reduction: 0.5,
        ..Default::default()
    };

    let mut simulator = ActionSimulator::new(load_flow, config);
    let report = simulator
        .start(&mut network, &db(vec![]), &ids(&["LINE_1", "LINE_2"]))
        .unwrap();

    assert_eq!(report.pre_contingency.outcome, ScenarioOutcome::ViolationsIgnored);
    assert_eq!(report.post_contingency.len(), 2);
    assert!(report
        .post_contingency
        .iter()
        .all(|s| s.outcome == ScenarioOutcome::NoRuleMatched));
}

#[test]
fn test_insecure_pre_contingency_skips_contingencies() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let config = SimulatorConfig {
        limit_reduction: 0.5,
        ..Default::default()
    };

    let mut simulator = ActionSimulator::new(load_flow.clone(), config);
    let report = simulator
        .start(&mut network, &db(vec![]), &ids(&["LINE_1", "LINE_2"]))
        .unwrap();

    assert_eq!(report.pre_contingency.outcome, ScenarioOutcome::NoRuleMatched);
    assert_eq!(report.skipped, vec!["LINE_1", "LINE_2"]);
    assert_eq!(load_flow.calls(), 1);
}

#[test]
fn test_action_failure_aborts_and_restores_state() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let log = EventLog::default();
    let db = db(vec![Rule::new("broken", Condition::AnyViolation, "bad_shunt")]);

    let mut simulator = ActionSimulator::new(load_flow, variant_config()).with_observer(Box::new(log.clone()));
    let err = simulator
        .start(&mut network, &db, &ids(&["LINE_1"]))
        .unwrap_err();

    assert!(matches!(err, GatError::ActionApplication { ref action, .. } if action == "bad_shunt"));
    assert_eq!(network.variant_ids(), vec![INITIAL_VARIANT_ID]);
    assert_eq!(log.count(":round_begin(0)"), log.count(":round_end(0)"));
}

struct CancelAfterFirstRound(CancellationToken);

impl SimulatorObserver for CancelAfterFirstRound {
    fn round_end(&mut self, ctx: &RunningContext<'_>) {
        if !ctx.is_pre_contingency() {
            self.0.cancel();
        }
    }
}

#[test]
fn test_cancellation_stops_before_the_next_solver_run() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let token = CancellationToken::new();
    let db = db(vec![Rule::new("relieve", Condition::AnyViolation, "shed")]);

    let mut simulator = ActionSimulator::new(load_flow.clone(), variant_config())
        .with_cancellation(token.clone())
        .with_observer(Box::new(CancelAfterFirstRound(token)));
    let err = simulator
        .start(&mut network, &db, &ids(&["LINE_1"]))
        .unwrap_err();

    assert!(matches!(err, GatError::Cancelled(_)));
    assert_eq!(load_flow.calls(), 2);
    assert_eq!(network.variant_ids(), vec![INITIAL_VARIANT_ID]);
}

struct Panicky;

impl SimulatorObserver for Panicky {
    fn load_flow_converged(&mut self, _ctx: &RunningContext<'_>, _violations: &[gat_core::LimitViolation]) {
        panic!("observer failure");
    }
}

#[test]
fn test_panicking_observer_does_not_stop_the_simulation() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let log = EventLog::default();
    let db = db(vec![Rule::new("relieve", Condition::AnyViolation, "shed")]);

    let mut simulator = ActionSimulator::new(load_flow, SimulatorConfig::default())
        .with_observer(Box::new(Panicky))
        .with_observer(Box::new(log.clone()));
    let report = simulator.start(&mut network, &db, &ids(&["LINE_1"])).unwrap();

    assert_eq!(report.scenario("LINE_1").unwrap().outcome, ScenarioOutcome::NoViolations);
    assert_eq!(log.count(":converged(2)"), 1);
}

#[test]
fn test_diverging_contingency_is_a_normal_outcome() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::ScriptedLoadFlow::new(|_, call| {
        if call == 0 {
            Ok(LoadFlowResult::converged())
        } else {
            Ok(LoadFlowResult::failed())
        }
    }));

    let mut simulator = ActionSimulator::new(load_flow, SimulatorConfig::default());
    let report = simulator
        .start(&mut network, &db(vec![]), &ids(&["LINE_1"]))
        .unwrap();

    assert_eq!(report.scenario("LINE_1").unwrap().outcome, ScenarioOutcome::Diverged);
}

#[test]
fn test_exported_cases_follow_the_naming_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let db = db(vec![Rule::new("relieve", Condition::AnyViolation, "shed")]);

    let exporter = CaseExporter::new(dir.path(), "study", Box::new(JsonCaseWriter));
    let mut simulator =
        ActionSimulator::new(load_flow, SimulatorConfig::default()).with_observer(Box::new(exporter));
    simulator.start(&mut network, &db, &ids(&["LINE_1"])).unwrap();

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["study-LINE_1-R0.json", "study-LINE_1-R1.json", "study-N-R0.json"]
    );
}

#[test]
fn test_invalid_database_fails_before_any_round() {
    let mut network = fixtures::two_level_network();
    let load_flow = Arc::new(fixtures::FeederLoadFlow::new());
    let db = ActionDb::new(
        vec![],
        vec![],
        vec![Rule::new("dangling", Condition::True, "missing")],
    );

    let mut simulator = ActionSimulator::new(load_flow.clone(), SimulatorConfig::default());
    let err = simulator.start(&mut network, &db, &[]).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(load_flow.calls(), 0);
}
