use log::debug;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::page::PageData;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to read template file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{name}: {message}")]
    Template { name: String, message: String },
    #[error("View {view:?} not found in {dir:?}")]
    ViewNotFound { view: String, dir: PathBuf },
}

/// Renders a template file with the page data as top-level bindings.
pub trait FileRenderer {
    fn render_file(&self, path: &Path, data: &PageData) -> Result<String, RenderError>;
}

/// TemplateEngine wraps minijinja::Environment with the filters page layouts use.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Creates an engine that fails on undefined variables.
    pub fn new() -> Self {
        Self::with_undefined(UndefinedBehavior::Strict)
    }

    /// Creates an engine where undefined variables render as empty.
    pub fn lenient() -> Self {
        Self::with_undefined(UndefinedBehavior::Lenient)
    }

    fn with_undefined(behavior: UndefinedBehavior) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(behavior);
        // captured page bodies are markup already
        env.set_auto_escape_callback(|_| AutoEscape::None);

        env.add_filter("slug", crate::filters::slug);
        env.add_filter("anchor", crate::filters::anchor);
        env.add_filter("uid", crate::filters::uid);
        env.add_function("uid", crate::filters::uid);

        Self { env }
    }

    /// Renders a template string with the given context.
    pub fn render_string<T: Serialize>(
        &self,
        name: &str,
        template_str: &str,
        context: &T,
    ) -> Result<String, RenderError> {
        self.env
            .render_named_str(name, template_str, context)
            .map_err(|e| {
                let message = match e.line() {
                    Some(line) => {
                        let error_line = template_str.lines().nth(line - 1).unwrap_or("");
                        format!("{}\n{}", e, error_line)
                    }
                    None => e.to_string(),
                };
                RenderError::Template {
                    name: name.to_string(),
                    message,
                }
            })
    }

    /// Renders a template from a file with the given context.
    pub fn render_path<T: Serialize>(
        &self,
        template_path: &Path,
        context: &T,
    ) -> Result<String, RenderError> {
        let template_str =
            std::fs::read_to_string(template_path).map_err(|source| RenderError::Io {
                path: template_path.to_path_buf(),
                source,
            })?;
        debug!("Rendering template file {:?}", template_path);
        self.render_string(&template_path.display().to_string(), &template_str, context)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FileRenderer for TemplateEngine {
    fn render_file(&self, path: &Path, data: &PageData) -> Result<String, RenderError> {
        self.render_path(path, data)
    }
}
