//! Progress reporting seam.
//!
//! Long-running phases report through an explicit [`ProgressSink`] passed by
//! the caller. There is no ambient console state: the binary wires in
//! [`TracingProgress`], library callers and tests use [`SilentProgress`] or
//! their own implementation.
//!
//! The trait is object-safe, allowing it to be used as `&dyn ProgressSink`.

use std::fmt;

use tracing::{debug, info, warn};

/// Pipeline phase being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Reading and parsing source files.
    Parse,
    /// Cross-file symbol resolution.
    Resolve,
    /// Computing normalized names.
    Name,
    /// Building the rewrite plan.
    Plan,
    /// Writing files.
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Parse => "parse",
            Phase::Resolve => "resolve",
            Phase::Name => "name",
            Phase::Plan => "plan",
            Phase::Apply => "apply",
        };
        write!(f, "{}", name)
    }
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    /// A phase starts with `total` work items.
    fn phase_started(&self, phase: Phase, total: usize);

    /// One work item (usually a module or file) within a phase.
    fn item(&self, phase: Phase, label: &str);

    /// A phase finished.
    fn phase_finished(&self, phase: Phase);

    /// A non-fatal problem.
    fn warning(&self, message: &str);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn phase_started(&self, _phase: Phase, _total: usize) {}
    fn item(&self, _phase: Phase, _label: &str) {}
    fn phase_finished(&self, _phase: Phase) {}
    fn warning(&self, _message: &str) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn phase_started(&self, phase: Phase, total: usize) {
        info!(%phase, total, "phase started");
    }

    fn item(&self, phase: Phase, label: &str) {
        debug!(%phase, item = label);
    }

    fn phase_finished(&self, phase: Phase) {
        info!(%phase, "phase finished");
    }

    fn warning(&self, message: &str) {
        warn!("{}", message);
    }
}
