use std::fmt;
use std::path::PathBuf;

use crate::loader::Loaders;

/// Separates a loader name from a view name in `"loader:view"` references.
pub const LOADER_SEPARATOR: char = ':';

/// Where the page layout comes from, decided once when a page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    File(PathBuf),
    Loader { loader: String, view: String },
}

impl TemplateRef {
    /// Classifies a raw reference against the registered loaders.
    ///
    /// Only a prefix naming a registered loader makes this a loader
    /// reference. A colon-bearing string with no such loader (`C:\site\layout.j2`,
    /// `themes:old/layout.j2`) is kept verbatim as a file path.
    pub fn resolve(raw: &str, loaders: &Loaders) -> Self {
        if let Some((loader, view)) = raw.split_once(LOADER_SEPARATOR) {
            if loaders.contains(loader) {
                return TemplateRef::Loader {
                    loader: loader.to_string(),
                    view: view.to_string(),
                };
            }
        }
        TemplateRef::File(PathBuf::from(raw))
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateRef::File(path) => write!(f, "{}", path.display()),
            TemplateRef::Loader { loader, view } => {
                write!(f, "{}{}{}", loader, LOADER_SEPARATOR, view)
            }
        }
    }
}
