//! Template resource - render a bundled template to a file

use anyhow::{Result, anyhow};
use converge::{ApplyContext, ApplyResult, Resource, ResourceState};
use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{FileAttrs, file_details, probe_file, rooted, text_diff, write_file};
use crate::accounts::Accounts;
use crate::templates::TemplateLibrary;

/// A file whose content is a rendered template
#[derive(Debug)]
pub struct Template {
    path: String,
    target: PathBuf,
    source: String,
    variables: serde_json::Value,
    attrs: FileAttrs,
    library: Rc<TemplateLibrary>,
    accounts: Accounts,
    /// Rendered once; the error is kept as text so apply can report it
    rendered: OnceCell<Result<String, String>>,
}

impl Template {
    pub fn new(
        root: &Path,
        path: &str,
        source: &str,
        library: Rc<TemplateLibrary>,
        attrs: FileAttrs,
    ) -> Self {
        Self {
            path: path.to_string(),
            target: rooted(root, path),
            source: source.to_string(),
            variables: serde_json::Value::Object(serde_json::Map::new()),
            attrs,
            library,
            accounts: Accounts::new(root),
            rendered: OnceCell::new(),
        }
    }

    /// Template variables (an object)
    pub fn variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = variables;
        self
    }

    fn rendered(&self) -> &Result<String, String> {
        self.rendered.get_or_init(|| {
            self.library
                .render(&self.source, &self.variables)
                .map_err(|e| format!("{e:#}"))
        })
    }

    /// The content this template renders to
    pub fn content(&self) -> Result<&str> {
        self.rendered()
            .as_deref()
            .map_err(|e| anyhow!("{e}"))
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Resource for Template {
    fn kind(&self) -> &'static str {
        "template"
    }

    fn name(&self) -> String {
        self.path.clone()
    }

    fn description(&self) -> String {
        format!("Render {} to {}", self.source, self.path)
    }

    fn current_state(&self) -> Result<ResourceState> {
        match self.rendered() {
            Ok(content) => probe_file(&self.target, content.as_bytes(), &self.attrs, &self.accounts),
            Err(_) => Ok(ResourceState::Unknown),
        }
    }

    fn desired_state(&self) -> ResourceState {
        match self.rendered() {
            Ok(content) => ResourceState::present(file_details(content.as_bytes(), &self.attrs)),
            Err(_) => ResourceState::Present { details: None },
        }
    }

    fn content_diff(&self) -> Option<String> {
        let content = self.rendered().as_ref().ok()?;
        text_diff(&self.target, content.as_bytes())
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let content = self.content()?;
        write_file(&self.target, content.as_bytes(), &self.attrs, &self.accounts)
    }
}
