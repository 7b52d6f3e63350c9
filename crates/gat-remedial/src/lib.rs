//! # gat-remedial: Remedial-action simulation
//!
//! Replays contingencies on a [`gat_core::Network`] and applies pre-authored
//! remedial actions until the network is violation-free or nothing more can
//! be done.
//!
//! Each scenario (the pre-contingency case, then one per contingency) runs in
//! an isolated network state opened by a [`CopyStrategy`] and goes through
//! rounds of:
//!
//! 1. run the load flow (divergence ends the scenario),
//! 2. detect limit violations (none ends the scenario),
//! 3. evaluate the rule table in priority order,
//! 4. apply the selected action and start the next round.
//!
//! Every step is reported to the [`SimulatorObserver`]s registered on the
//! simulator's [`ObserverBus`].
//!
//! ```ignore
//! use gat_remedial::{ActionDb, ActionSimulator, SimulatorConfig};
//!
//! let db = ActionDb::load("actions.json")?;
//! let mut simulator = ActionSimulator::new(load_flow, SimulatorConfig::default())
//!     .with_default_observers();
//! let report = simulator.start(&mut network, &db, &db.contingency_ids())?;
//! ```

pub mod action;
pub mod cancel;
pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod observer;
pub mod observers;
pub mod outcome;
pub mod rule;
pub mod simulator;
pub mod strategy;

pub use action::{Action, ActionDb};
pub use cancel::CancellationToken;
pub use condition::{Condition, EvaluationContext};
pub use config::SimulatorConfig;
pub use context::RunningContext;
pub use engine::{RuleEngine, RuleEvaluation, RuleMatch, RuleMatchPolicy, RuleSelection};
pub use observer::{ObserverBus, SimulatorObserver};
pub use observers::{
    case_file_name, CaseCompression, CaseExporter, CaseWriter, JsonCaseWriter, LoggingObserver,
    ReportWriter, ResultCollector, RoundTrace, ScenarioTrace,
};
pub use outcome::{ScenarioOutcome, ScenarioResult, SimulationReport};
pub use rule::{Rule, RuleEvaluationStatus, RuleKind};
pub use simulator::ActionSimulator;
pub use strategy::{CopyStrategy, ScenarioNetwork};
