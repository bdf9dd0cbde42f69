use log::warn;
use minijinja::value::{Enumerator, Object, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::capture::{Capture, OutputBuffer};
use crate::config::ConfigTree;
use crate::engine::{FileRenderer, TemplateEngine};
use crate::loader::Loaders;

/// Options key holding the default configuration source.
pub const DEFAULT_CONFIG_KEY: &str = "page.config";

/// Options key holding the default template reference.
pub const DEFAULT_TEMPLATE_KEY: &str = "page.template";

/// Flat registry of application options, looked up by well-known keys.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct Options {
    values: BTreeMap<String, serde_json::Value>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<V: Into<serde_json::Value>>(&mut self, key: impl Into<String>, value: V) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// String value under `key`; empty strings and non-strings read as unset.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }
}

/// Template view of a [`ConfigTree`] node; keys are loaded when a template reads them.
#[derive(Debug)]
struct LazyConf {
    tree: Arc<Mutex<ConfigTree>>,
    prefix: String,
}

impl LazyConf {
    fn path(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }
}

impl Object for LazyConf {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let path = self.path(key.as_str()?);
        let mut tree = self.tree.lock().ok()?;
        match tree.get_lazy(&path) {
            Ok(Some(serde_json::Value::Object(_))) => Some(Value::from_object(LazyConf {
                tree: self.tree.clone(),
                prefix: path,
            })),
            Ok(Some(value)) => Some(Value::from_serialize(&value)),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load config key {:?}: {}", path, e);
                None
            }
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let Ok(mut tree) = self.tree.lock() else {
            return Enumerator::Empty;
        };
        let keys: Vec<Value> = if self.prefix.is_empty() {
            if let Err(e) = tree.materialize() {
                warn!("Failed to load config: {}", e);
            }
            tree.values().keys().map(|k| Value::from(k.as_str())).collect()
        } else {
            match tree.get(&self.prefix) {
                Ok(Some(serde_json::Value::Object(map))) => {
                    map.keys().map(|k| Value::from(k.as_str())).collect()
                }
                Ok(_) => Vec::new(),
                Err(e) => {
                    warn!("Failed to load config key {:?}: {}", self.prefix, e);
                    Vec::new()
                }
            }
        };
        Enumerator::Values(keys)
    }
}

/// Everything a page render touches: settings, options, loaders, the
/// output capture and the renderer used for file-based layouts.
pub struct Context {
    pub conf: ConfigTree,
    pub opts: Options,
    pub loaders: Loaders,
    output: Box<dyn Capture>,
    renderer: Box<dyn FileRenderer>,
}

impl Context {
    /// Context writing to standard output and rendering layouts with a strict engine.
    pub fn new() -> Self {
        Self::with_parts(OutputBuffer::stdout(), TemplateEngine::new())
    }

    pub fn with_parts<C, R>(output: C, renderer: R) -> Self
    where
        C: Capture + 'static,
        R: FileRenderer + 'static,
    {
        Self {
            conf: ConfigTree::new(),
            opts: Options::new(),
            loaders: Loaders::new(),
            output: Box::new(output),
            renderer: Box::new(renderer),
        }
    }

    pub fn with_output<C: Capture + 'static>(mut self, output: C) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn with_renderer<R: FileRenderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// The capture service; page bodies are written here.
    pub fn output(&mut self) -> &mut dyn Capture {
        self.output.as_mut()
    }

    pub fn renderer(&self) -> &dyn FileRenderer {
        self.renderer.as_ref()
    }

    /// Template view of the context: `{conf, opts}`.
    ///
    /// `conf` reads from a copy of the configuration tree and only loads the
    /// lazy entries a template actually touches.
    pub fn snapshot(&self) -> Value {
        let conf = LazyConf {
            tree: Arc::new(Mutex::new(self.conf.clone())),
            prefix: String::new(),
        };
        let mut map = BTreeMap::new();
        map.insert("conf".to_string(), Value::from_object(conf));
        map.insert("opts".to_string(), Value::from_serialize(&self.opts));
        Value::from(map)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
