//! Wraps captured page bodies in layout templates.
//!
//! A [`Context`] carries the site configuration ([`ConfigTree`]), an options
//! registry ([`Options`]), named view loaders ([`Loaders`]), the output
//! capture ([`Capture`]) and a file renderer ([`TemplateEngine`] by default).
//! A [`Page`] borrows the context for one start/end cycle.

pub mod capture;
pub mod config;
pub mod context;
pub mod engine;
pub mod filters;
pub mod loader;
pub mod page;
pub mod template_ref;

pub use capture::{Capture, CaptureError, OutputBuffer};
pub use config::{ConfigError, ConfigTree};
pub use context::{Context, Options, DEFAULT_CONFIG_KEY, DEFAULT_TEMPLATE_KEY};
pub use engine::{FileRenderer, RenderError, TemplateEngine};
pub use loader::{Loader, Loaders, ViewLoader};
pub use page::{Page, PageData, PageError};
pub use template_ref::TemplateRef;
