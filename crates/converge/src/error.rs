//! Error types for convergence runs.
//!
//! Every error aborts the run it occurs in. Errors that happen while a resource
//! is being handled carry that resource's identity together with the
//! underlying cause, so the operator can fix the cause and re-run.

use crate::resource::ResourceId;
use crate::types::Action;

/// Boxed underlying cause of a failed guard, probe or action.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building a graph or converging it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A guard predicate failed instead of answering yes or no.
    #[error("guard evaluation failed for {resource}")]
    GuardEvaluation {
        /// Resource whose guard failed.
        resource: ResourceId,
        /// Underlying cause.
        #[source]
        source: Cause,
    },

    /// The current state of a resource could not be determined.
    #[error("cannot determine current state of {resource}")]
    Probe {
        /// Resource that could not be probed.
        resource: ResourceId,
        /// Underlying cause.
        #[source]
        source: Cause,
    },

    /// An action (converge or notified) failed.
    #[error("action `{action}` failed on {resource}")]
    Action {
        /// Resource the action ran on.
        resource: ResourceId,
        /// The action that failed.
        action: Action,
        /// Underlying cause.
        #[source]
        source: Cause,
    },

    /// The same `(kind, name)` pair was declared twice.
    #[error("duplicate resource declaration: {resource}")]
    DuplicateResource {
        /// The duplicated identity.
        resource: ResourceId,
    },

    /// A notification names a resource that was never declared.
    #[error("{source_resource} notifies undeclared resource {target}")]
    UnknownNotificationTarget {
        /// Resource carrying the notification.
        source_resource: ResourceId,
        /// Missing target.
        target: ResourceId,
    },

    /// A notification asks a resource for an action it does not support.
    #[error("{resource} does not support action `{action}`")]
    UnsupportedAction {
        /// Target resource.
        resource: ResourceId,
        /// Requested action.
        action: Action,
    },

    /// Peer discovery failed for a role.
    #[error("peer discovery failed for role `{role}`")]
    Discovery {
        /// Role that was being resolved.
        role: String,
        /// Underlying cause.
        #[source]
        source: Cause,
    },

    /// An attribute exists but has the wrong shape.
    #[error("attribute `{path}`: {message}")]
    Attribute {
        /// Dot-separated attribute path.
        path: String,
        /// What was wrong with it.
        message: String,
    },

    /// A string could not be parsed as `kind[name]`.
    #[error("invalid resource reference `{0}` (expected kind[name])")]
    InvalidResourceId(String),
}

impl Error {
    /// Create a guard evaluation error.
    pub fn guard(resource: ResourceId, source: impl Into<Cause>) -> Self {
        Self::GuardEvaluation {
            resource,
            source: source.into(),
        }
    }

    /// Create a probe error.
    pub fn probe(resource: ResourceId, source: impl Into<Cause>) -> Self {
        Self::Probe {
            resource,
            source: source.into(),
        }
    }

    /// Create an action error.
    pub fn action(resource: ResourceId, action: Action, source: impl Into<Cause>) -> Self {
        Self::Action {
            resource,
            action,
            source: source.into(),
        }
    }

    /// Create an attribute shape error.
    pub fn attribute(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Attribute {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The resource this error is about, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            Self::GuardEvaluation { resource, .. }
            | Self::Probe { resource, .. }
            | Self::Action { resource, .. }
            | Self::DuplicateResource { resource }
            | Self::UnsupportedAction { resource, .. } => Some(resource),
            Self::UnknownNotificationTarget {
                source_resource, ..
            } => Some(source_resource),
            Self::Discovery { .. } | Self::Attribute { .. } | Self::InvalidResourceId(_) => None,
        }
    }

    /// Whether the error was detected before any resource was touched.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateResource { .. }
                | Self::UnknownNotificationTarget { .. }
                | Self::UnsupportedAction { .. }
                | Self::InvalidResourceId(_)
        )
    }
}
