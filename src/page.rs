//! Page rendering cycle.
//!
//! A [`Page`] wraps whatever the caller writes between [`Page::start`] and
//! [`Page::end`] in a layout template:
//!
//! 1. `start` loads the configuration source, settles on a template
//!    reference and opens an output capture.
//! 2. The caller writes the page body into [`Page::output`].
//! 3. `end` closes the capture and renders the layout with `content` (the
//!    body), and `core`/`nano` (both the shared context view).
//!
//! ```rust,ignore
//! let mut ctx = Context::new();
//! ctx.conf.set("site.template", "templates/layout.html.j2")?;
//! let mut page = Page::new(&mut ctx);
//! write!(page.start(None, None)?.output(), "<p>Hello</p>")?;
//! page.end(true)?;
//! ```

use log::{debug, info, warn};
use minijinja::Value;
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

use crate::capture::{Capture, CaptureError};
use crate::config::ConfigError;
use crate::context::{Context, DEFAULT_CONFIG_KEY, DEFAULT_TEMPLATE_KEY};
use crate::engine::RenderError;
use crate::template_ref::TemplateRef;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("No template defined")]
    NoTemplate,
    #[error("Page ended before it was started")]
    NotStarted,
    #[error("Page already started")]
    AlreadyStarted,
    #[error("Loader {0:?} is no longer registered")]
    UnknownLoader(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Failed to write page output: {0}")]
    Io(#[from] io::Error),
}

/// Bindings handed to a layout.
///
/// `core` and `nano` are the same context value; layouts may use either name.
#[derive(Debug, Clone, Serialize)]
pub struct PageData {
    pub content: String,
    pub core: Value,
    pub nano: Value,
}

impl PageData {
    pub fn new(content: String, core: Value) -> Self {
        Self {
            content,
            nano: core.clone(),
            core,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PageState {
    Idle,
    Capturing(TemplateRef),
    Rendered,
}

/// One start/end render cycle over a borrowed [`Context`].
pub struct Page<'c> {
    ctx: &'c mut Context,
    state: PageState,
}

impl<'c> Page<'c> {
    pub fn new(ctx: &'c mut Context) -> Self {
        Self {
            ctx,
            state: PageState::Idle,
        }
    }

    /// Loads configuration, resolves the layout and starts capturing output.
    ///
    /// `config` defaults to the `page.config` option. The layout is the first
    /// of: `template`, the `template` config value, the `site.template`
    /// config value, the `page.template` option.
    pub fn start(
        &mut self,
        config: Option<&str>,
        template: Option<&str>,
    ) -> Result<&mut Self, PageError> {
        if matches!(self.state, PageState::Capturing(_)) {
            return Err(PageError::AlreadyStarted);
        }

        let config = config
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .or_else(|| self.ctx.opts.get_str(DEFAULT_CONFIG_KEY).map(str::to_string));
        if let Some(source) = config {
            self.load_config(Path::new(&source))?;
        }

        let raw = self.resolve_template(template)?;
        let template = TemplateRef::resolve(&raw, &self.ctx.loaders);
        info!("Rendering page with template {}", template);

        self.ctx.output().start();
        self.state = PageState::Capturing(template);
        Ok(self)
    }

    /// Where the page body goes while the page is capturing.
    pub fn output(&mut self) -> &mut dyn Capture {
        self.ctx.output()
    }

    /// The layout chosen by [`Page::start`], while capturing.
    pub fn template(&self) -> Option<&TemplateRef> {
        match &self.state {
            PageState::Capturing(template) => Some(template),
            _ => None,
        }
    }

    /// Stops capturing and renders the layout around the captured body.
    ///
    /// With `echo` the result is written to the context output and `None` is
    /// returned; otherwise the result is returned.
    pub fn end(&mut self, echo: bool) -> Result<Option<String>, PageError> {
        let template = match std::mem::replace(&mut self.state, PageState::Rendered) {
            PageState::Capturing(template) => template,
            other => {
                self.state = other;
                return Err(PageError::NotStarted);
            }
        };

        let content = self.ctx.output().end()?;
        let data = PageData::new(content, self.ctx.snapshot());

        let rendered = match &template {
            TemplateRef::Loader { loader, view } => {
                let loader_impl = self
                    .ctx
                    .loaders
                    .get(loader)
                    .ok_or_else(|| PageError::UnknownLoader(loader.clone()))?;
                debug!("Loading view {:?} from loader {:?}", view, loader);
                loader_impl.load(view, &data)?
            }
            TemplateRef::File(path) => self.ctx.renderer().render_file(path, &data)?,
        };

        if echo {
            let out = self.ctx.output();
            out.write_all(rendered.as_bytes())?;
            out.flush()?;
            Ok(None)
        } else {
            Ok(Some(rendered))
        }
    }

    /// Runs a whole cycle: start, `body` writing into the capture, then `end(false)`.
    pub fn render<F>(
        ctx: &'c mut Context,
        config: Option<&str>,
        template: Option<&str>,
        body: F,
    ) -> Result<String, PageError>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let mut page = Page::new(ctx);
        page.start(config, template)?;
        body(&mut page)?;
        Ok(page.end(false)?.unwrap_or_default())
    }

    fn load_config(&mut self, source: &Path) -> Result<(), ConfigError> {
        if source.is_dir() {
            self.ctx.conf.set_dir(source);
        } else if source.is_file() {
            self.ctx.conf.load_file(source)?;
        } else {
            warn!("Config source {:?} does not exist, skipping", source);
        }
        Ok(())
    }

    fn resolve_template(&mut self, explicit: Option<&str>) -> Result<String, PageError> {
        if let Some(template) = explicit.filter(|t| !t.is_empty()) {
            return Ok(template.to_string());
        }
        for key in ["template", "site.template"] {
            if let Some(template) = self.ctx.conf.get_str(key)?.filter(|t| !t.is_empty()) {
                debug!("Template taken from config key {:?}", key);
                return Ok(template);
            }
        }
        self.ctx
            .opts
            .get_str(DEFAULT_TEMPLATE_KEY)
            .map(str::to_string)
            .ok_or(PageError::NoTemplate)
    }
}

impl Write for Page<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ctx.output().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ctx.output().flush()
    }
}

impl Drop for Page<'_> {
    fn drop(&mut self) {
        if matches!(self.state, PageState::Capturing(_)) {
            warn!("Page dropped while capturing, discarding captured output");
            let _ = self.ctx.output().end();
        }
    }
}
