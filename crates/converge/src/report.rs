//! Run report - what a convergence run did
//!
//! The report is assembled while the executor walks the graph and is handed
//! out only once the run has finished; it has no mutators.

use crate::notify::{NotificationRecord, NotificationStatus};
use crate::resource::ResourceId;
use crate::types::{ApplyResult, ResourceState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one declared resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// A guard denied the resource; nothing was probed or applied
    Skipped { reason: String },
    /// Already in the desired state
    Unchanged,
    /// The converge action ran and changed something
    Changed { result: ApplyResult },
    /// Dry run: the resource diverges and would be applied
    WouldChange {
        current: ResourceState,
        desired: ResourceState,
    },
    /// Its guard, probe or action failed and the run stopped here
    Failed { error: String },
}

impl Outcome {
    /// Whether the resource changed (or would, in a dry run)
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed { .. } | Self::WouldChange { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Unchanged => "up to date",
            Self::Changed { result } => match result {
                ApplyResult::Created => "created",
                ApplyResult::Removed => "removed",
                ApplyResult::Modified | ApplyResult::NoChange => "updated",
            },
            Self::WouldChange { .. } => "would change",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome of one declared resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub id: ResourceId,
    pub description: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Counts derived from a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub changed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub would_change: usize,
    pub failed: usize,
    pub notifications_fired: usize,
}

impl RunSummary {
    /// Total number of declared resources accounted for
    pub fn total(&self) -> usize {
        self.changed + self.unchanged + self.skipped + self.would_change + self.failed
    }
}

/// The finalized record of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    dry_run: bool,
    resources: Vec<ResourceReport>,
    notifications: Vec<NotificationRecord>,
}

impl RunReport {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Per-resource outcomes, in declaration order
    pub fn resources(&self) -> &[ResourceReport] {
        &self.resources
    }

    /// Delivered notifications, in delivery order
    pub fn notifications(&self) -> &[NotificationRecord] {
        &self.notifications
    }

    pub fn outcome(&self, id: &ResourceId) -> Option<&Outcome> {
        self.resources
            .iter()
            .find(|r| &r.id == id)
            .map(|r| &r.outcome)
    }

    /// Resources whose converge action changed something
    pub fn changed(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Changed { .. }))
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for resource in &self.resources {
            match resource.outcome {
                Outcome::Skipped { .. } => summary.skipped += 1,
                Outcome::Unchanged => summary.unchanged += 1,
                Outcome::Changed { .. } => summary.changed += 1,
                Outcome::WouldChange { .. } => summary.would_change += 1,
                Outcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary.notifications_fired = self
            .notifications
            .iter()
            .filter(|n| matches!(n.status, NotificationStatus::Fired { .. }))
            .count();
        summary
    }
}

/// Accumulates a report during a run
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    started_at: DateTime<Utc>,
    dry_run: bool,
    resources: Vec<ResourceReport>,
    notifications: Vec<NotificationRecord>,
}

impl ReportBuilder {
    pub(crate) fn start(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            dry_run,
            resources: Vec::new(),
            notifications: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, id: ResourceId, description: String, outcome: Outcome) {
        self.resources.push(ResourceReport {
            id,
            description,
            outcome,
        });
    }

    pub(crate) fn record_notification(&mut self, record: NotificationRecord) {
        self.notifications.push(record);
    }

    pub(crate) fn finish(self) -> RunReport {
        RunReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            resources: self.resources,
            notifications: self.notifications,
        }
    }
}
