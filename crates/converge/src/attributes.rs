//! Node attributes (the fact store)
//!
//! Attributes are a nested mapping addressed by dot-separated paths such as
//! `bcpc.enabled.monitoring`. They are assembled before a run (from the node
//! config or an inventory) and only read during convergence.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute path holding the node's own identity
pub const HOSTNAME: &str = "hostname";

/// Read-only node attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes {
    root: Map<String, Value>,
}

impl Attributes {
    /// Empty attribute tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            other => Err(Error::attribute(
                "",
                format!("attribute root must be a table, got {}", type_name(&other)),
            )),
        }
    }

    /// Return a copy with `path` set to `value`, creating intermediate tables
    ///
    /// Intended for assembling attributes before a run.
    pub fn with(mut self, path: &str, value: impl Into<Value>) -> Result<Self> {
        let mut segments = path.split('.').peekable();
        let mut table = &mut self.root;
        while let Some(segment) = segments.next() {
            if segment.is_empty() {
                return Err(Error::attribute(path, "empty path segment"));
            }
            if segments.peek().is_none() {
                table.insert(segment.to_string(), value.into());
                break;
            }
            let entry = table
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            table = match entry {
                Value::Object(map) => map,
                other => {
                    return Err(Error::attribute(
                        path,
                        format!("`{segment}` is a {}, not a table", type_name(other)),
                    ));
                }
            };
        }
        Ok(self)
    }

    /// Look up a value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Boolean at `path`; `None` if missing, an error if not a boolean
    pub fn get_bool(&self, path: &str) -> Result<Option<bool>> {
        match self.get(path) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(Error::attribute(
                path,
                format!("expected a boolean, got {}", type_name(other)),
            )),
        }
    }

    /// String at `path`; `None` if missing, an error if not a string
    pub fn get_str(&self, path: &str) -> Result<Option<&str>> {
        match self.get(path) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(Error::attribute(
                path,
                format!("expected a string, got {}", type_name(other)),
            )),
        }
    }

    /// Boolean at `path`, or `default` when missing
    pub fn bool_or(&self, path: &str, default: bool) -> Result<bool> {
        Ok(self.get_bool(path)?.unwrap_or(default))
    }

    /// String at `path`, or `default` when missing
    pub fn str_or<'a>(&'a self, path: &str, default: &'a str) -> Result<&'a str> {
        Ok(self.get_str(path)?.unwrap_or(default))
    }

    /// String at `path`, failing when missing
    pub fn require_str(&self, path: &str) -> Result<&str> {
        self.get_str(path)?
            .ok_or_else(|| Error::attribute(path, "required attribute is missing"))
    }

    /// The node's hostname, if known
    pub fn hostname(&self) -> Option<&str> {
        self.get(HOSTNAME).and_then(Value::as_str)
    }

    /// The whole tree as a JSON value (for template contexts and reports)
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Whether no attribute is set
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "table",
    }
}
