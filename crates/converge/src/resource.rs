//! Resource trait for declarative state management
//!
//! A Resource represents something that can be in a certain state,
//! and can be changed to reach a desired state.

use crate::context::ApplyContext;
use crate::error::Error;
use crate::types::{Action, ApplyResult, ResourceState};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a declared resource: `(kind, name)`, written `kind[name]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || Error::InvalidResourceId(s.to_string());
        let (kind, rest) = s.split_once('[').ok_or_else(invalid)?;
        let name = rest.strip_suffix(']').ok_or_else(invalid)?;
        if kind.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(kind, name))
    }
}

/// Core trait for declarative resources
///
/// Every resource provides:
/// - Identity (kind + name, description)
/// - State detection (current vs desired)
/// - State convergence (apply)
/// - Optional named actions reachable through notifications
///
/// # Example
///
/// ```ignore
/// use converge::{ApplyContext, ApplyResult, Resource, ResourceState};
///
/// #[derive(Debug)]
/// struct Marker {
///     path: std::path::PathBuf,
/// }
///
/// impl Resource for Marker {
///     fn kind(&self) -> &'static str {
///         "marker"
///     }
///
///     fn name(&self) -> String {
///         self.path.display().to_string()
///     }
///
///     fn description(&self) -> String {
///         format!("Ensure marker at {}", self.path.display())
///     }
///
///     fn current_state(&self) -> anyhow::Result<ResourceState> {
///         Ok(if self.path.exists() {
///             ResourceState::Present { details: None }
///         } else {
///             ResourceState::Absent
///         })
///     }
///
///     fn desired_state(&self) -> ResourceState {
///         ResourceState::Present { details: None }
///     }
///
///     fn apply(&self, _ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
///         std::fs::write(&self.path, b"")?;
///         Ok(ApplyResult::Created)
///     }
/// }
/// ```
pub trait Resource: fmt::Debug {
    /// Resource kind (e.g. "template", "service", "package")
    fn kind(&self) -> &'static str;

    /// Name unique within the kind (usually a path or a service name)
    fn name(&self) -> String;

    /// Full identity, `kind[name]`
    fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.name())
    }

    /// Human-readable description of what this resource does
    fn description(&self) -> String;

    /// Detect the current state of this resource
    ///
    /// Must not change the system.
    fn current_state(&self) -> Result<ResourceState>;

    /// The state this resource converges to
    fn desired_state(&self) -> ResourceState;

    /// Check if the resource needs changes to reach desired state
    fn needs_apply(&self) -> Result<bool> {
        Ok(self.current_state()? != self.desired_state())
    }

    /// Apply changes to reach the desired state
    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult>;

    /// Line diff of pending content changes, for display only
    fn content_diff(&self) -> Option<String> {
        None
    }

    /// Named actions this resource accepts from notifications
    fn supported_actions(&self) -> &'static [Action] {
        &[]
    }

    /// Run a named action on behalf of a notification
    fn run_action(&self, action: Action, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if action == Action::Converge {
            return self.apply(ctx);
        }
        anyhow::bail!("{} does not support action `{}`", self.id(), action)
    }

    /// Whether `action` may be requested through a notification
    fn supports(&self, action: Action) -> bool {
        action == Action::Converge || self.supported_actions().contains(&action)
    }
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_display_and_parse() {
        let id = ResourceId::new("service", "zabbix-agent");
        assert_eq!(id.to_string(), "service[zabbix-agent]");
        assert_eq!("service[zabbix-agent]".parse::<ResourceId>().unwrap(), id);
    }

    #[test]
    fn test_resource_id_parse_keeps_path_names() {
        let id: ResourceId = "template[/usr/local/etc/zabbix_agentd.conf]".parse().unwrap();
        assert_eq!(id.kind, "template");
        assert_eq!(id.name, "/usr/local/etc/zabbix_agentd.conf");
    }

    #[test]
    fn test_resource_id_parse_rejects_malformed() {
        assert!("service".parse::<ResourceId>().is_err());
        assert!("service[".parse::<ResourceId>().is_err());
        assert!("[name]".parse::<ResourceId>().is_err());
        assert!("service[]".parse::<ResourceId>().is_err());
    }
}
