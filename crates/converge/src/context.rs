//! Apply context and progress callbacks
//!
//! These let the engine report progress without depending on a specific
//! terminal UI.

use crate::notify::NotificationRecord;
use crate::report::{Outcome, RunReport};
use crate::resource::ResourceId;

/// Progress callback for convergence runs
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback {
    /// Called once before the first resource, with the number of declarations
    fn on_run_start(&mut self, total: usize);

    /// Called when the executor reaches a declared resource
    fn on_resource_start(&mut self, id: &ResourceId, description: &str);

    /// Called when a declared resource has been handled
    fn on_resource_complete(&mut self, id: &ResourceId, outcome: &Outcome);

    /// Called whenever a notification is delivered (or would be, in dry-run)
    fn on_notification(&mut self, record: &NotificationRecord);

    /// Called after delayed notifications were drained
    fn on_run_complete(&mut self, report: &RunReport);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_resource_start(&mut self, _id: &ResourceId, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &ResourceId, _outcome: &Outcome) {}
    fn on_notification(&mut self, _record: &NotificationRecord) {}
    fn on_run_complete(&mut self, _report: &RunReport) {}
}

/// Context passed to resource apply operations
#[derive(Debug, Clone, Default)]
pub struct ApplyContext {
    /// Whether to output verbose information
    pub verbose: bool,
}

impl ApplyContext {
    /// Create a new apply context
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}
