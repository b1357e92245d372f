//! HTML mail templates.
//!
//! Templates are handlebars files with a single field, `data`. `{{data}}`
//! inserts HTML-escaped text, `{{{data}}}` inserts it raw and missing fields
//! render as nothing.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;

/// Template loading and rendering failures.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid template: {0}")]
    Parse(#[from] handlebars::TemplateError),

    #[error("render failed: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Renders a named template with one data field.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(&self, name: &str, data: &str) -> Result<String, TemplateError>;
}

#[derive(Serialize)]
struct TemplateData<'a> {
    data: &'a str,
}

/// Templates read from `<dir>/<name>.html` on every render, so edits on
/// disk take effect without a restart.
#[derive(Debug, Clone)]
pub struct FileTemplates {
    dir: PathBuf,
}

impl FileTemplates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.html"))
    }
}

#[async_trait]
impl TemplateRenderer for FileTemplates {
    async fn render(&self, name: &str, data: &str) -> Result<String, TemplateError> {
        let path = self.path_for(name);
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| TemplateError::Read { path, source })?;
        render_str(name, &source, data)
    }
}

/// Register `template` under `name` in a fresh registry and render it.
pub fn render_str(name: &str, template: &str, data: &str) -> Result<String, TemplateError> {
    let mut registry = Handlebars::new();
    registry.register_template_string(name, template)?;
    Ok(registry.render(name, &TemplateData { data })?)
}
