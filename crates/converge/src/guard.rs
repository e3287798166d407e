//! Guards: boolean preconditions gating whether a resource is acted on
//!
//! A guard is a pure predicate over the node attributes and peer discovery.
//! The executor evaluates a resource's guards at most once per run, right
//! before the first action on that resource.

use crate::attributes::Attributes;
use crate::discovery::PeerDiscovery;
use anyhow::{Context, Result};
use std::fmt;

/// What a guard predicate can see
pub struct GuardContext<'a> {
    pub attributes: &'a Attributes,
    pub discovery: &'a dyn PeerDiscovery,
}

impl<'a> GuardContext<'a> {
    pub fn new(attributes: &'a Attributes, discovery: &'a dyn PeerDiscovery) -> Self {
        Self {
            attributes,
            discovery,
        }
    }

    /// Whether this node (by hostname attribute) is listed for `role`
    pub fn node_has_role(&self, role: &str) -> Result<bool> {
        let hostname = self
            .attributes
            .hostname()
            .context("node hostname attribute is not set")?;
        let nodes = self
            .discovery
            .find_nodes(role)
            .with_context(|| format!("looking up nodes for role `{role}`"))?;
        Ok(nodes.iter().any(|n| n == hostname))
    }
}

type Predicate = Box<dyn Fn(&GuardContext<'_>) -> Result<bool>>;

/// A precondition on a declared resource
pub enum Guard {
    /// Act only if the predicate holds
    OnlyIf {
        description: String,
        predicate: Predicate,
    },
    /// Act only if the predicate does not hold
    NotIf {
        description: String,
        predicate: Predicate,
    },
}

impl Guard {
    pub fn only_if<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&GuardContext<'_>) -> Result<bool> + 'static,
    {
        Self::OnlyIf {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn not_if<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&GuardContext<'_>) -> Result<bool> + 'static,
    {
        Self::NotIf {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Guard that passes only on nodes carrying `role`
    pub fn node_has_role(role: impl Into<String>) -> Self {
        let role = role.into();
        Self::only_if(format!("node has role {role}"), move |ctx| {
            ctx.node_has_role(&role)
        })
    }

    pub fn description(&self) -> &str {
        match self {
            Self::OnlyIf { description, .. } | Self::NotIf { description, .. } => description,
        }
    }

    /// Whether the resource may be acted on
    pub fn permits(&self, ctx: &GuardContext<'_>) -> Result<bool> {
        match self {
            Self::OnlyIf { predicate, .. } => predicate(ctx),
            Self::NotIf { predicate, .. } => predicate(ctx).map(|holds| !holds),
        }
    }

    /// Reason recorded when this guard denies
    pub fn denial_reason(&self) -> String {
        match self {
            Self::OnlyIf { description, .. } => format!("only_if `{description}` was false"),
            Self::NotIf { description, .. } => format!("not_if `{description}` was true"),
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnlyIf { description, .. } => f.debug_tuple("OnlyIf").field(description).finish(),
            Self::NotIf { description, .. } => f.debug_tuple("NotIf").field(description).finish(),
        }
    }
}
