//! # Converge
//!
//! An idempotent convergence engine: declare resources in order, each with
//! the state it should be in, and the engine brings the node there.
//!
//! ## Core Concepts
//!
//! - **Resource**: Something with a probeable state and a converge action
//!   (files, templates, packages, users, services)
//! - **Declaration**: A resource plus its guards and notifications
//! - **ResourceGraph**: Declarations in dependency order
//! - **Guard**: `only_if` / `not_if` predicate over attributes and peer discovery
//! - **Notification**: "when I change, run `action` on that resource",
//!   immediately or delayed to the end of the run
//! - **RunReport**: What every resource and notification did
//!
//! ## Example
//!
//! ```ignore
//! use converge::{Action, Attributes, Declaration, ResourceGraph, ResourceId, Timing};
//!
//! let mut graph = ResourceGraph::new();
//! graph.declare(
//!     Declaration::new(config_template)
//!         .notifies(Action::Restart, ResourceId::new("service", "zabbix-agent"), Timing::Delayed),
//! )?;
//! graph.declare(Declaration::new(agent_service))?;
//!
//! let report = converge::run_simple(&graph, &attributes, &discovery)?;
//! println!("{} changed", report.summary().changed);
//! ```

pub mod attributes;
pub mod context;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod graph;
pub mod guard;
pub mod notify;
pub mod report;
pub mod resource;
pub mod types;

pub use attributes::Attributes;
pub use context::{ApplyContext, NoProgress, ProgressCallback};
pub use discovery::{CachedDiscovery, PeerDiscovery, StaticDiscovery};
pub use error::{Error, Result};
pub use executor::{RunFailure, run, run_simple};
pub use graph::{Declaration, ResourceGraph};
pub use guard::{Guard, GuardContext};
pub use notify::{Notification, NotificationRecord, NotificationStatus};
pub use report::{Outcome, ResourceReport, RunReport, RunSummary};
pub use resource::{BoxedResource, Resource, ResourceId};
pub use types::{Action, ApplyResult, ExecuteOptions, ResourceState, Timing};
