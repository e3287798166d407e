//! Convergence executor - walks the graph in declaration order
//!
//! For every declaration: evaluate guards, probe, compare with the desired
//! state, apply if divergent, then dispatch notifications. Immediate
//! notifications run inline; delayed ones run once per target after the walk.
//! The first error aborts the run.

use crate::attributes::Attributes;
use crate::context::{ApplyContext, NoProgress, ProgressCallback};
use crate::discovery::{CachedDiscovery, PeerDiscovery};
use crate::error::Error;
use crate::graph::{Declaration, ResourceGraph};
use crate::guard::GuardContext;
use crate::notify::{Dispatch, NotificationBus, NotificationRecord, NotificationStatus};
use crate::report::{Outcome, ReportBuilder, RunReport};
use crate::resource::ResourceId;
use crate::types::{Action, ApplyResult, ExecuteOptions, Timing};
use std::collections::HashMap;
use std::fmt;

/// A run that stopped on an error
///
/// Carries the report of everything handled before the failure; resources
/// already applied stay applied.
#[derive(Debug)]
pub struct RunFailure {
    pub error: Error,
    pub report: RunReport,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

/// Converge `graph` against `attributes`
///
/// # Arguments
/// * `graph` - Declarations, applied strictly in order
/// * `attributes` - Node attributes, read-only for the run
/// * `discovery` - Peer discovery backend; cached for the run
/// * `opts` - Execution options (dry_run, verbose)
/// * `progress` - Progress callback
pub fn run(
    graph: &ResourceGraph,
    attributes: &Attributes,
    discovery: &dyn PeerDiscovery,
    opts: &ExecuteOptions,
    progress: &mut dyn ProgressCallback,
) -> Result<RunReport, RunFailure> {
    let discovery = CachedDiscovery::new(discovery);
    let mut run = Run {
        graph,
        guard_ctx: GuardContext::new(attributes, &discovery),
        opts,
        progress,
        report: ReportBuilder::start(opts.dry_run),
        bus: NotificationBus::new(),
        guard_decisions: HashMap::new(),
    };

    match run.walk() {
        Ok(()) => {
            let report = run.report.finish();
            run.progress.on_run_complete(&report);
            Ok(report)
        }
        Err(error) => {
            log::error!("run aborted: {error}");
            Err(RunFailure {
                error,
                report: run.report.finish(),
            })
        }
    }
}

/// Run with default options and no progress reporting
pub fn run_simple(
    graph: &ResourceGraph,
    attributes: &Attributes,
    discovery: &dyn PeerDiscovery,
) -> Result<RunReport, RunFailure> {
    run(
        graph,
        attributes,
        discovery,
        &ExecuteOptions::default(),
        &mut NoProgress,
    )
}

/// Guard verdict cached per declaration index; `Some(reason)` means denied
type GuardDecision = Option<String>;

struct Run<'a, 'p> {
    graph: &'a ResourceGraph,
    guard_ctx: GuardContext<'a>,
    opts: &'a ExecuteOptions,
    progress: &'p mut dyn ProgressCallback,
    report: ReportBuilder,
    bus: NotificationBus,
    guard_decisions: HashMap<usize, GuardDecision>,
}

impl Run<'_, '_> {
    fn walk(&mut self) -> Result<(), Error> {
        let graph = self.graph;
        graph.validate()?;
        self.progress.on_run_start(graph.len());

        for (index, declaration) in graph.iter().enumerate() {
            let id = declaration.id();
            let description = declaration.resource().description();
            self.progress.on_resource_start(id, &description);

            let outcome = match self.converge(index, declaration) {
                Ok(outcome) => outcome,
                Err(error) => {
                    let failed = Outcome::Failed {
                        error: error_chain(&error),
                    };
                    self.progress.on_resource_complete(id, &failed);
                    self.report.record(id.clone(), description, failed);
                    return Err(error);
                }
            };
            match &outcome {
                Outcome::Changed { .. } => log::info!("{id}: {}", outcome.label()),
                Outcome::WouldChange { current, desired } => {
                    log::info!("{id}: would change ({current} => {desired})");
                }
                Outcome::Skipped { reason } => log::debug!("{id}: skipped, {reason}"),
                Outcome::Unchanged => log::debug!("{id}: up to date"),
                Outcome::Failed { .. } => {}
            }

            self.progress.on_resource_complete(id, &outcome);
            let changed = outcome.is_change();
            self.report.record(id.clone(), description, outcome);

            if changed {
                self.dispatch(declaration)?;
            }
        }

        for pending in self.bus.drain() {
            self.deliver(&pending.source, &pending.target, pending.action, Timing::Delayed)?;
        }

        Ok(())
    }

    /// Guard, probe, compare, apply
    fn converge(&mut self, index: usize, declaration: &Declaration) -> Result<Outcome, Error> {
        if let Some(reason) = self.guard_denial(index, declaration)? {
            return Ok(Outcome::Skipped { reason });
        }

        let id = declaration.id();
        let resource = declaration.resource();
        let current = resource
            .current_state()
            .map_err(|e| Error::probe(id.clone(), e))?;
        let desired = resource.desired_state();
        log::trace!("{id}: current {current}, desired {desired}");

        if current == desired {
            return Ok(Outcome::Unchanged);
        }

        if self.opts.dry_run {
            return Ok(Outcome::WouldChange { current, desired });
        }

        let mut ctx = ApplyContext::new(self.opts.verbose);
        let result = resource
            .apply(&mut ctx)
            .map_err(|e| Error::action(id.clone(), Action::Converge, e))?;

        Ok(match result {
            ApplyResult::NoChange => Outcome::Unchanged,
            result => Outcome::Changed { result },
        })
    }

    /// Evaluate a declaration's guards once per run
    fn guard_denial(
        &mut self,
        index: usize,
        declaration: &Declaration,
    ) -> Result<GuardDecision, Error> {
        if let Some(decision) = self.guard_decisions.get(&index) {
            return Ok(decision.clone());
        }

        let mut decision = None;
        for guard in declaration.guards() {
            let permits = guard
                .permits(&self.guard_ctx)
                .map_err(|e| Error::guard(declaration.id().clone(), e))?;
            if !permits {
                decision = Some(guard.denial_reason());
                break;
            }
        }

        self.guard_decisions.insert(index, decision.clone());
        Ok(decision)
    }

    /// Route the notifications of a resource that changed
    fn dispatch(&mut self, declaration: &Declaration) -> Result<(), Error> {
        let source = declaration.id();
        for notification in declaration.notifications() {
            let target = &notification.target;
            match self
                .bus
                .notify(source, target, notification.action, notification.timing)
            {
                Dispatch::Now => {
                    self.deliver(source, target, notification.action, Timing::Immediate)?;
                }
                Dispatch::Queued => {
                    log::debug!("{source}: queued {} of {target}", notification.action);
                }
                Dispatch::Duplicate => {
                    log::debug!("{source}: {target} already queued for {}", notification.action);
                }
                Dispatch::Conflict { kept } => {
                    log::warn!(
                        "{source} asks {target} to {}, but it is already queued to {kept}; keeping {kept}",
                        notification.action
                    );
                }
            }
        }
        Ok(())
    }

    /// Run a notified action on its target
    fn deliver(
        &mut self,
        source: &ResourceId,
        target: &ResourceId,
        action: Action,
        timing: Timing,
    ) -> Result<(), Error> {
        let graph = self.graph;
        let (index, declaration) = graph
            .position(target)
            .zip(graph.get(target))
            .ok_or_else(|| Error::UnknownNotificationTarget {
                source_resource: source.clone(),
                target: target.clone(),
            })?;

        let status = match self.notified_status(index, declaration, source, action, timing) {
            Ok(status) => status,
            Err(error) => {
                let failed = NotificationStatus::Failed {
                    error: error_chain(&error),
                };
                self.record_delivery(source, target, action, timing, failed);
                return Err(error);
            }
        };
        self.record_delivery(source, target, action, timing, status);
        Ok(())
    }

    /// Guard the target, then run the action unless this is a dry run
    fn notified_status(
        &mut self,
        index: usize,
        declaration: &Declaration,
        source: &ResourceId,
        action: Action,
        timing: Timing,
    ) -> Result<NotificationStatus, Error> {
        let target = declaration.id();
        if let Some(reason) = self.guard_denial(index, declaration)? {
            log::debug!("{target}: not running {action} from {source}, {reason}");
            return Ok(NotificationStatus::Skipped { reason });
        }
        if self.opts.dry_run {
            return Ok(NotificationStatus::WouldFire);
        }

        log::info!("{target}: {action} ({timing}, from {source})");
        let mut ctx = ApplyContext::new(self.opts.verbose);
        let result = declaration
            .resource()
            .run_action(action, &mut ctx)
            .map_err(|e| Error::action(target.clone(), action, e))?;
        Ok(NotificationStatus::Fired { result })
    }

    fn record_delivery(
        &mut self,
        source: &ResourceId,
        target: &ResourceId,
        action: Action,
        timing: Timing,
        status: NotificationStatus,
    ) {
        let record = NotificationRecord {
            source: source.clone(),
            target: target.clone(),
            action,
            timing,
            status,
        };
        self.progress.on_notification(&record);
        self.report.record_notification(record);
    }
}

/// An error and its causes on one line, as stored in the report
fn error_chain(error: &Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
