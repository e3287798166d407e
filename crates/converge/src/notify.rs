//! Notification bus
//!
//! A resource that changed can ask another resource to run an action, either
//! immediately (inline, before the executor moves on) or delayed (once per
//! target, after every declared resource was processed, in the order the
//! targets were first notified).

use crate::resource::ResourceId;
use crate::types::{Action, ApplyResult, Timing};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A notification edge declared on a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub target: ResourceId,
    pub action: Action,
    pub timing: Timing,
}

impl Notification {
    pub fn new(action: Action, target: ResourceId, timing: Timing) -> Self {
        Self {
            target,
            action,
            timing,
        }
    }
}

/// What happened to a delivered notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    /// The target ran the action
    Fired { result: ApplyResult },
    /// The target's guards denied it
    Skipped { reason: String },
    /// Dry run: the action would have run
    WouldFire,
    /// The action failed and the run stopped here
    Failed { error: String },
}

/// A notification as recorded in the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub source: ResourceId,
    pub target: ResourceId,
    pub action: Action,
    pub timing: Timing,
    #[serde(flatten)]
    pub status: NotificationStatus,
}

/// A delayed notification waiting for the end of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    /// Resource that first notified the target
    pub source: ResourceId,
    pub target: ResourceId,
    pub action: Action,
}

/// How the bus handled a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Deliver now
    Now,
    /// Queued for the end of the run
    Queued,
    /// Target already queued with the same action
    Duplicate,
    /// Target already queued with another action, which is kept
    Conflict { kept: Action },
}

/// Collects delayed notifications for one run
#[derive(Debug, Default)]
pub struct NotificationBus {
    queue: Vec<Pending>,
    queued: HashMap<ResourceId, Action>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a notification from `source`
    ///
    /// Immediate notifications are handed back for inline delivery; delayed
    /// ones are recorded once per target.
    pub fn notify(
        &mut self,
        source: &ResourceId,
        target: &ResourceId,
        action: Action,
        timing: Timing,
    ) -> Dispatch {
        if timing == Timing::Immediate {
            return Dispatch::Now;
        }

        if let Some(&kept) = self.queued.get(target) {
            if kept == action {
                return Dispatch::Duplicate;
            }
            return Dispatch::Conflict { kept };
        }

        self.queued.insert(target.clone(), action);
        self.queue.push(Pending {
            source: source.clone(),
            target: target.clone(),
            action,
        });
        Dispatch::Queued
    }

    /// Number of distinct targets waiting
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Take every delayed notification, in first-notified order
    pub fn drain(&mut self) -> Vec<Pending> {
        self.queued.clear();
        std::mem::take(&mut self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(kind: &str, name: &str) -> ResourceId {
        ResourceId::new(kind, name)
    }

    #[test]
    fn test_immediate_is_not_queued() {
        let mut bus = NotificationBus::new();
        let dispatch = bus.notify(
            &id("template", "a"),
            &id("service", "s"),
            Action::Restart,
            Timing::Immediate,
        );
        assert_eq!(dispatch, Dispatch::Now);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_delayed_deduplicates_per_target() {
        let mut bus = NotificationBus::new();
        let service = id("service", "s");

        assert_eq!(
            bus.notify(&id("template", "a"), &service, Action::Restart, Timing::Delayed),
            Dispatch::Queued
        );
        assert_eq!(
            bus.notify(&id("template", "b"), &service, Action::Restart, Timing::Delayed),
            Dispatch::Duplicate
        );

        let drained = bus.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].source, id("template", "a"));
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_delayed_keeps_first_notified_order() {
        let mut bus = NotificationBus::new();
        let source = id("template", "a");
        bus.notify(&source, &id("service", "second"), Action::Restart, Timing::Delayed);
        bus.notify(&source, &id("service", "first"), Action::Reload, Timing::Delayed);
        bus.notify(&source, &id("service", "second"), Action::Restart, Timing::Delayed);

        let targets: Vec<_> = bus.drain().into_iter().map(|p| p.target.name).collect();
        assert_eq!(targets, vec!["second", "first"]);
    }

    #[test]
    fn test_conflicting_action_keeps_first() {
        let mut bus = NotificationBus::new();
        let service = id("service", "s");
        bus.notify(&id("template", "a"), &service, Action::Reload, Timing::Delayed);
        let dispatch = bus.notify(&id("template", "b"), &service, Action::Restart, Timing::Delayed);
        assert_eq!(dispatch, Dispatch::Conflict { kept: Action::Reload });
        assert_eq!(bus.drain()[0].action, Action::Reload);
    }
}
