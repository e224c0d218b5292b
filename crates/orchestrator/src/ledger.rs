//! Timing ledger: every device operation the simulation issues, in issue
//! order, with the event the device returned for it.
//!
//! Times come from device timestamps, never from the host clock. The ledger
//! only stores events; [`TimingLedger::resolve`] asks the device for their
//! profiles once the queue has drained and returns a [`Timings`] snapshot
//! that all derived quantities are computed from.

use std::fmt;

use kernel::{ComputeDevice, DeviceResult, Event, EventProfile};

/// Operation names recorded by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `initialize` kernel.
    Initialize,
    /// Either `compute` kernel handle.
    Compute,
    /// Classification map read-back.
    ReadMap,
    /// Distribution function read-back.
    ReadF,
    /// Density read-back.
    ReadRho,
    /// Velocity read-back.
    ReadU,
}

impl Operation {
    /// Name as printed in timing reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Initialize => "initialize",
            Operation::Compute => "compute",
            Operation::ReadMap => "read_map",
            Operation::ReadF => "read_f",
            Operation::ReadRho => "read_rho",
            Operation::ReadU => "read_u",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only list of `(operation, event)` pairs.
#[derive(Debug, Default, Clone)]
pub struct TimingLedger {
    records: Vec<(Operation, Event)>,
}

impl TimingLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record.
    pub fn record(&mut self, operation: Operation, event: Event) {
        self.records.push((operation, event));
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in issue order.
    pub fn records(&self) -> &[(Operation, Event)] {
        &self.records
    }

    /// How many records carry `operation`.
    pub fn count(&self, operation: Operation) -> usize {
        self.records.iter().filter(|(op, _)| *op == operation).count()
    }

    /// Query the profile of every record. The device queue must have drained.
    pub fn resolve<D: ComputeDevice + ?Sized>(&self, device: &D) -> DeviceResult<Timings> {
        let entries = self
            .records
            .iter()
            .map(|&(op, event)| device.event_profile(event).map(|p| (op, p)))
            .collect::<DeviceResult<Vec<_>>>()?;
        Ok(Timings { entries })
    }
}

/// Resolved profiles of a ledger.
#[derive(Debug, Clone, Default)]
pub struct Timings {
    entries: Vec<(Operation, EventProfile)>,
}

/// Per-operation aggregate of a [`Timings`] snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationStats {
    /// Operation name.
    pub operation: Operation,
    /// Number of records.
    pub count: usize,
    /// Summed own duration in milliseconds.
    pub total_ms: f64,
    /// `total_ms / count`.
    pub mean_ms: f64,
}

fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1e6
}

impl Timings {
    /// Build from already resolved profiles.
    pub fn from_profiles(entries: Vec<(Operation, EventProfile)>) -> Self {
        Self { entries }
    }

    /// Device span from the start of the first operation to the end of the
    /// last one, in milliseconds. Includes idle gaps between operations.
    pub fn total_time_ms(&self) -> f64 {
        match (self.entries.first(), self.entries.last()) {
            (Some((_, first)), Some((_, last))) => {
                ns_to_ms(last.end_ns.saturating_sub(first.start_ns))
            }
            _ => 0.0,
        }
    }

    /// Sum of every operation's own duration, in milliseconds.
    pub fn kernels_time_ms(&self) -> f64 {
        self.entries.iter().map(|(_, p)| ns_to_ms(p.duration_ns())).sum()
    }

    /// Own duration of every operation, in issue order.
    pub fn kernels_timings_ms(&self) -> Vec<(Operation, f64)> {
        self.entries
            .iter()
            .map(|(op, p)| (*op, ns_to_ms(p.duration_ns())))
            .collect()
    }

    /// Durations aggregated by operation, in order of first appearance.
    pub fn summary(&self) -> Vec<OperationStats> {
        let mut stats: Vec<OperationStats> = Vec::new();
        for (op, ms) in self.kernels_timings_ms() {
            match stats.iter_mut().find(|s| s.operation == op) {
                Some(s) => {
                    s.count += 1;
                    s.total_ms += ms;
                }
                None => stats.push(OperationStats {
                    operation: op,
                    count: 1,
                    total_ms: ms,
                    mean_ms: 0.0,
                }),
            }
        }
        for s in &mut stats {
            s.mean_ms = s.total_ms / s.count as f64;
        }
        stats
    }
}

/// Million lattice updates per second for `wet` cells updated `iterations`
/// times in `elapsed_ms`.
///
/// Zero when nothing ran or no time elapsed, so the result is always finite
/// and non-negative.
pub fn mlups(wet: usize, iterations: usize, elapsed_ms: f64) -> f64 {
    if iterations == 0 || !elapsed_ms.is_finite() || elapsed_ms <= 0.0 {
        return 0.0;
    }
    (wet as f64 * iterations as f64) / (elapsed_ms * 1000.0)
}
