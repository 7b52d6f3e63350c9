//! Stock observers.

mod collector;
mod export;
mod logging;
mod report;

pub use collector::{ResultCollector, RoundTrace, ScenarioTrace};
pub use export::{case_file_name, CaseCompression, CaseExporter, CaseWriter, JsonCaseWriter};
pub use logging::LoggingObserver;
pub use report::ReportWriter;
