use log::debug;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::engine::{RenderError, TemplateEngine};
use crate::page::PageData;

/// Suffixes tried, in order, when looking a view up by name.
const VIEW_SUFFIXES: [&str; 4] = ["", ".j2", ".html.j2", ".html"];

/// A named service that renders views by name rather than by file path.
pub trait Loader {
    fn load(&self, view: &str, data: &PageData) -> Result<String, RenderError>;
}

/// Name -> loader registry consulted when a template reference looks like `name:view`.
#[derive(Default)]
pub struct Loaders {
    loaders: BTreeMap<String, Box<dyn Loader>>,
}

impl Loaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `loader` under `name`, replacing any previous one.
    pub fn register<L: Loader + 'static>(&mut self, name: impl Into<String>, loader: L) {
        let name = name.into();
        debug!("Registering loader {:?}", name);
        self.loaders.insert(name, Box::new(loader));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Loader> {
        self.loaders.get(name).map(|l| l.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.loaders.remove(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(|k| k.as_str())
    }
}

/// Renders views out of a directory of templates.
pub struct ViewLoader {
    dir: PathBuf,
    engine: TemplateEngine,
}

impl ViewLoader {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self::with_engine(dir, TemplateEngine::new())
    }

    pub fn with_engine<P: AsRef<Path>>(dir: P, engine: TemplateEngine) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            engine,
        }
    }

    /// First existing file for `view`, trying each known suffix.
    pub fn find(&self, view: &str) -> Option<PathBuf> {
        VIEW_SUFFIXES
            .iter()
            .map(|suffix| self.dir.join(format!("{}{}", view, suffix)))
            .find(|path| path.is_file())
    }
}

impl Loader for ViewLoader {
    fn load(&self, view: &str, data: &PageData) -> Result<String, RenderError> {
        let path = self.find(view).ok_or_else(|| RenderError::ViewNotFound {
            view: view.to_string(),
            dir: self.dir.clone(),
        })?;
        self.engine.render_path(&path, data)
    }
}
