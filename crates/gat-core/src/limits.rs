//! Limit-violation detection.
//!
//! Violations are recomputed from scratch after every converged load flow and
//! never mutated. Current violations compare the terminal current against the
//! permanent limit scaled by a reduction factor; voltage violations compare the
//! voltage-level magnitude against its low/high limits.

use crate::{GatResult, Network, Side};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitViolationKind {
    Current,
    LowVoltage,
    HighVoltage,
}

impl LimitViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitViolationKind::Current => "CURRENT",
            LimitViolationKind::LowVoltage => "LOW_VOLTAGE",
            LimitViolationKind::HighVoltage => "HIGH_VOLTAGE",
        }
    }
}

impl std::fmt::Display for LimitViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitViolation {
    /// Equipment id for current violations, voltage-level id for voltage ones.
    pub subject_id: String,
    pub kind: LimitViolationKind,
    /// Measured value (A or kV)
    pub value: f64,
    /// Limit before reduction (A or kV)
    pub limit: f64,
    pub limit_reduction: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

impl LimitViolation {
    /// value / (limit * reduction)
    pub fn loading(&self) -> f64 {
        self.value / (self.limit * self.limit_reduction)
    }
}

/// Which violations a detector reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationFilter {
    pub kinds: BTreeSet<LimitViolationKind>,
    /// Violations on voltage levels below this nominal voltage (kV) are dropped.
    pub min_base_voltage: f64,
}

impl Default for ViolationFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl ViolationFilter {
    pub fn all() -> Self {
        Self {
            kinds: [
                LimitViolationKind::Current,
                LimitViolationKind::LowVoltage,
                LimitViolationKind::HighVoltage,
            ]
            .into_iter()
            .collect(),
            min_base_voltage: 0.0,
        }
    }

    pub fn current_only() -> Self {
        Self {
            kinds: BTreeSet::from([LimitViolationKind::Current]),
            min_base_voltage: 0.0,
        }
    }

    pub fn with_min_base_voltage(mut self, kv: f64) -> Self {
        self.min_base_voltage = kv;
        self
    }

    fn accepts(&self, kind: LimitViolationKind, nominal_kv: f64) -> bool {
        self.kinds.contains(&kind) && nominal_kv >= self.min_base_voltage
    }
}

/// Computes the violations of the working variant.
pub trait ViolationDetector: Send + Sync {
    fn detect(&self, network: &Network) -> GatResult<Vec<LimitViolation>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitViolationDetector {
    pub limit_reduction: f64,
    pub filter: ViolationFilter,
}

impl Default for LimitViolationDetector {
    fn default() -> Self {
        Self {
            limit_reduction: 1.0,
            filter: ViolationFilter::default(),
        }
    }
}

impl LimitViolationDetector {
    pub fn new(limit_reduction: f64, filter: ViolationFilter) -> Self {
        Self {
            limit_reduction,
            filter,
        }
    }
}

impl ViolationDetector for LimitViolationDetector {
    fn detect(&self, network: &Network) -> GatResult<Vec<LimitViolation>> {
        let mut violations = Vec::new();

        for (_, eq) in network.equipments() {
            for t in &eq.terminals {
                let terminal = network.terminal(*t);
                let Some(limit) = eq.current_limit(terminal.side) else {
                    continue;
                };
                let Some(i) = network.terminal_flow(*t).i else {
                    continue;
                };
                let nominal = network.voltage_level(terminal.voltage_level).nominal_v;
                if !self.filter.accepts(LimitViolationKind::Current, nominal.value()) {
                    continue;
                }
                if i.value() > limit.value() * self.limit_reduction {
                    violations.push(LimitViolation {
                        subject_id: eq.id.clone(),
                        kind: LimitViolationKind::Current,
                        value: i.value(),
                        limit: limit.value(),
                        limit_reduction: self.limit_reduction,
                        side: Some(terminal.side),
                    });
                }
            }
        }

        for (id, vl) in network.voltage_levels() {
            let Some(v) = network.voltage(id) else {
                continue;
            };
            let nominal = vl.nominal_v.value();
            if let Some(high) = vl.high_voltage_limit {
                if v > high && self.filter.accepts(LimitViolationKind::HighVoltage, nominal) {
                    violations.push(voltage_violation(&vl.id, LimitViolationKind::HighVoltage, v.value(), high.value()));
                }
            }
            if let Some(low) = vl.low_voltage_limit {
                if v < low && self.filter.accepts(LimitViolationKind::LowVoltage, nominal) {
                    violations.push(voltage_violation(&vl.id, LimitViolationKind::LowVoltage, v.value(), low.value()));
                }
            }
        }

        Ok(violations)
    }
}

fn voltage_violation(subject: &str, kind: LimitViolationKind, value: f64, limit: f64) -> LimitViolation {
    LimitViolation {
        subject_id: subject.to_string(),
        kind,
        value,
        limit,
        limit_reduction: 1.0,
        side: None,
    }
}

/// Fixed-width table of violations, one per line.
pub fn format_violations(violations: &[LimitViolation]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<20} {:<13} {:>10} {:>10} {:>9}",
        "Equipment", "Violation", "Value", "Limit", "Loading"
    );
    for v in violations {
        let _ = writeln!(
            out,
            "{:<20} {:<13} {:>10.2} {:>10.2} {:>8.1}%",
            v.subject_id,
            v.kind.as_str(),
            v.value,
            v.limit * v.limit_reduction,
            v.loading() * 100.0
        );
    }
    out
}
