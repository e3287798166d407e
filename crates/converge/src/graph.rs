//! Resource graph - ordered resource declarations
//!
//! Declaration order is the dependency order: the executor walks resources
//! exactly in the order they were declared and never reorders them.

use crate::error::{Error, Result};
use crate::guard::{Guard, GuardContext};
use crate::notify::Notification;
use crate::resource::{BoxedResource, Resource, ResourceId};
use crate::types::{Action, Timing};
use std::collections::HashMap;

/// A resource together with its guards and outgoing notifications
#[derive(Debug)]
pub struct Declaration {
    id: ResourceId,
    resource: BoxedResource,
    guards: Vec<Guard>,
    notifications: Vec<Notification>,
}

impl Declaration {
    pub fn new(resource: impl Resource + 'static) -> Self {
        Self::boxed(Box::new(resource))
    }

    pub fn boxed(resource: BoxedResource) -> Self {
        Self {
            id: resource.id(),
            resource,
            guards: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// Attach an arbitrary guard; all guards must permit
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn only_if<F>(self, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&GuardContext<'_>) -> anyhow::Result<bool> + 'static,
    {
        self.guard(Guard::only_if(description, predicate))
    }

    pub fn not_if<F>(self, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&GuardContext<'_>) -> anyhow::Result<bool> + 'static,
    {
        self.guard(Guard::not_if(description, predicate))
    }

    /// Notify `target` to run `action` when this resource changes
    pub fn notifies(mut self, action: Action, target: ResourceId, timing: Timing) -> Self {
        self.notifications
            .push(Notification::new(action, target, timing));
        self
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn resource(&self) -> &dyn Resource {
        self.resource.as_ref()
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }
}

/// Ordered, duplicate-free collection of declarations
#[derive(Debug, Default)]
pub struct ResourceGraph {
    declarations: Vec<Declaration>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a declaration
    ///
    /// A second declaration of the same `kind[name]` is rejected.
    pub fn declare(&mut self, declaration: Declaration) -> Result<&mut Self> {
        if self.index.contains_key(declaration.id()) {
            return Err(Error::DuplicateResource {
                resource: declaration.id().clone(),
            });
        }
        log::trace!("declared {}", declaration.id());
        self.index
            .insert(declaration.id().clone(), self.declarations.len());
        self.declarations.push(declaration);
        Ok(self)
    }

    /// Check that every notification points at a declared resource that
    /// supports the requested action
    pub fn validate(&self) -> Result<()> {
        for declaration in &self.declarations {
            for notification in declaration.notifications() {
                let target = self.get(&notification.target).ok_or_else(|| {
                    Error::UnknownNotificationTarget {
                        source_resource: declaration.id().clone(),
                        target: notification.target.clone(),
                    }
                })?;
                if !target.resource().supports(notification.action) {
                    return Err(Error::UnsupportedAction {
                        resource: notification.target.clone(),
                        action: notification.action,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Declaration> {
        self.position(id).map(|i| &self.declarations[i])
    }

    /// Declaration index of `id`
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.declarations.iter().map(Declaration::id)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl<'a> IntoIterator for &'a ResourceGraph {
    type Item = &'a Declaration;
    type IntoIter = std::slice::Iter<'a, Declaration>;

    fn into_iter(self) -> Self::IntoIter {
        self.declarations.iter()
    }
}
