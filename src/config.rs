use log::debug;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions tried for a key under a lazy directory, in priority order.
const CONFIG_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse YAML in {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Failed to parse JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Unsupported config format: {0:?}")]
    UnsupportedFormat(PathBuf),
    #[error("Config file {0:?} must contain a mapping at the top level")]
    NotAMapping(PathBuf),
    #[error("Cannot set {0:?}: an intermediate value is not a mapping")]
    NotATable(String),
}

/// Nested key/value store holding site settings.
///
/// Values come from three places: eager file loads ([`ConfigTree::load_file`]),
/// direct writes ([`ConfigTree::set`]) and lazily read directories
/// ([`ConfigTree::set_dir`]). In-memory values always shadow what a lazy
/// directory could provide.
#[derive(Debug, Default, Clone)]
pub struct ConfigTree {
    root: Map<String, Value>,
    dirs: Vec<PathBuf>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` as a lazy root. Nothing is read until a key is asked for.
    pub fn set_dir<P: AsRef<Path>>(&mut self, path: P) {
        let path = path.as_ref().to_path_buf();
        if !self.dirs.contains(&path) {
            debug!("Registering lazy config directory {:?}", path);
            self.dirs.push(path);
        }
    }

    /// Loads a YAML or JSON file and merges its top-level mapping into the tree.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let value = parse_file(path)?;
        match value {
            Value::Object(map) => {
                debug!("Merging config file {:?}", path);
                merge_maps(&mut self.root, map);
                Ok(())
            }
            _ => Err(ConfigError::NotAMapping(path.to_path_buf())),
        }
    }

    /// Writes `value` at a dotted `key`, creating intermediate mappings.
    pub fn set<V: Into<Value>>(&mut self, key: &str, value: V) -> Result<(), ConfigError> {
        let mut segments: Vec<&str> = key.split('.').collect();
        let last = segments.pop().unwrap_or(key);
        let mut node = &mut self.root;
        for segment in segments {
            let entry = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = entry
                .as_object_mut()
                .ok_or_else(|| ConfigError::NotATable(key.to_string()))?;
        }
        node.insert(last.to_string(), value.into());
        Ok(())
    }

    /// Reads a dotted `key`, loading lazy entries along the way.
    ///
    /// A key naming a directory under a lazy root comes back with the
    /// directory's contents filled in.
    pub fn get(&mut self, key: &str) -> Result<Option<Value>, ConfigError> {
        self.lookup(key, true)
    }

    /// Like [`ConfigTree::get`], but a mapping backed by a lazy directory is
    /// returned as far as it is loaded, without reading the rest of the directory.
    pub fn get_lazy(&mut self, key: &str) -> Result<Option<Value>, ConfigError> {
        self.lookup(key, false)
    }

    fn lookup(&mut self, key: &str, populate: bool) -> Result<Option<Value>, ConfigError> {
        let segments: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Ok(None);
        }
        let dirs = &self.dirs;
        let mut node = &mut self.root;
        let mut rel = PathBuf::new();
        for (i, segment) in segments.iter().enumerate() {
            if !node.contains_key(*segment) {
                match find_lazy(dirs, &rel, segment)? {
                    Some(value) => {
                        node.insert(segment.to_string(), value);
                    }
                    None => return Ok(None),
                }
            }
            rel.push(segment);
            let value = match node.get_mut(*segment) {
                Some(value) => value,
                None => return Ok(None),
            };
            if i + 1 == segments.len() {
                if populate {
                    if let Some(map) = value.as_object_mut() {
                        for dir in dirs {
                            let sub = dir.join(&rel);
                            if sub.is_dir() {
                                materialize_dir(map, &sub)?;
                            }
                        }
                    }
                }
                return Ok(Some(value.clone()));
            }
            node = match value.as_object_mut() {
                Some(map) => map,
                None => return Ok(None),
            };
        }
        Ok(None)
    }

    /// Like [`ConfigTree::get`], but only string values count.
    pub fn get_str(&mut self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self
            .get(key)?
            .and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    /// Loads everything the registered directories can provide.
    pub fn materialize(&mut self) -> Result<(), ConfigError> {
        for dir in &self.dirs {
            materialize_dir(&mut self.root, dir)?;
        }
        Ok(())
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Whether a top-level key is already held in memory.
    pub fn is_loaded(&self, key: &str) -> bool {
        self.root.contains_key(key)
    }

    /// The values loaded so far.
    pub fn values(&self) -> &Map<String, Value> {
        &self.root
    }
}

fn parse_file(path: &Path) -> Result<Value, ConfigError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let content = || {
        fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    };
    match ext.as_deref() {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content()?).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        }
        Some("json") => serde_json::from_str(&content()?).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        }),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Looks for `segment` under `rel` in each lazy root, first match wins.
fn find_lazy(dirs: &[PathBuf], rel: &Path, segment: &str) -> Result<Option<Value>, ConfigError> {
    for dir in dirs {
        if let Some(value) = load_entry(&dir.join(rel), segment)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Value for `name` directly under `base`: the first config file in
/// extension order, else an empty mapping standing in for a subdirectory.
fn load_entry(base: &Path, name: &str) -> Result<Option<Value>, ConfigError> {
    for ext in CONFIG_EXTENSIONS {
        let file = base.join(format!("{}.{}", name, ext));
        if file.is_file() {
            debug!("Lazy loading {:?}", file);
            return parse_file(&file).map(Some);
        }
    }
    if base.join(name).is_dir() {
        return Ok(Some(Value::Object(Map::new())));
    }
    Ok(None)
}

/// Fills every key of `node` that `dir` can provide, resolving each name the
/// same way a lazy lookup would.
fn materialize_dir(node: &mut Map<String, Value>, dir: &Path) -> Result<(), ConfigError> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })? {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();
        let name = if path.is_dir() {
            path.file_name()
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| CONFIG_EXTENSIONS.contains(&e))
        {
            path.file_stem()
        } else {
            None
        };
        if let Some(name) = name.and_then(|n| n.to_str()) {
            names.insert(name.to_string());
        }
    }

    for name in names {
        if !node.contains_key(&name) {
            if let Some(value) = load_entry(dir, &name)? {
                node.insert(name.clone(), value);
            }
        }
        let sub = dir.join(&name);
        if sub.is_dir() {
            if let Some(map) = node.get_mut(&name).and_then(Value::as_object_mut) {
                materialize_dir(map, &sub)?;
            }
        }
    }
    Ok(())
}

fn merge_maps(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_set_and_get_nested() {
        let mut conf = ConfigTree::new();
        conf.set("site.template", "layout.j2").unwrap();
        assert_eq!(
            conf.get_str("site.template").unwrap(),
            Some("layout.j2".to_string())
        );
        assert_eq!(conf.get("site").unwrap(), Some(json!({"template": "layout.j2"})));
        assert!(conf.get("site.missing").unwrap().is_none());
    }

    #[test]
    fn test_get_through_scalar_is_none() {
        let mut conf = ConfigTree::new();
        conf.set("site", "plain").unwrap();
        assert!(conf.get("site.template").unwrap().is_none());
        assert!(conf.set("site.template", "x").is_err());
    }

    #[test]
    fn test_load_yaml_file_merges() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.yaml");
        let second = dir.path().join("b.json");
        fs::write(&first, "site:\n  title: Home\n  lang: en\n").unwrap();
        fs::write(&second, r#"{"site": {"title": "Blog"}, "template": "t.j2"}"#).unwrap();

        let mut conf = ConfigTree::new();
        conf.load_file(&first).unwrap();
        conf.load_file(&second).unwrap();

        assert_eq!(conf.get_str("site.title").unwrap(), Some("Blog".to_string()));
        assert_eq!(conf.get_str("site.lang").unwrap(), Some("en".to_string()));
        assert_eq!(conf.get_str("template").unwrap(), Some("t.j2".to_string()));
    }

    #[test]
    fn test_load_file_rejects_non_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.yaml");
        fs::write(&path, "- a\n- b\n").unwrap();
        let mut conf = ConfigTree::new();
        assert!(matches!(
            conf.load_file(&path),
            Err(ConfigError::NotAMapping(_))
        ));
    }

    #[test]
    fn test_load_file_unsupported_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("site.ini");
        fs::write(&path, "template = x").unwrap();
        let mut conf = ConfigTree::new();
        assert!(matches!(
            conf.load_file(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_lazy_dir_loads_on_demand() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("site.yaml"), "template: layout.j2\n").unwrap();
        fs::create_dir(dir.path().join("menu")).unwrap();
        fs::write(dir.path().join("menu").join("main.json"), r#"["home", "about"]"#).unwrap();

        let mut conf = ConfigTree::new();
        conf.set_dir(dir.path());
        assert!(!conf.is_loaded("site"));

        assert_eq!(
            conf.get_str("site.template").unwrap(),
            Some("layout.j2".to_string())
        );
        assert!(conf.is_loaded("site"));
        assert!(!conf.is_loaded("menu"));
        assert_eq!(conf.get("menu.main").unwrap(), Some(json!(["home", "about"])));
        assert!(conf.get("nothing").unwrap().is_none());
    }

    #[test]
    fn test_memory_shadows_lazy_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("site.yaml"), "template: from-disk.j2\n").unwrap();
        let mut conf = ConfigTree::new();
        conf.set("site.template", "from-memory.j2").unwrap();
        conf.set_dir(dir.path());
        assert_eq!(
            conf.get_str("site.template").unwrap(),
            Some("from-memory.j2".to_string())
        );
    }

    #[test]
    fn test_materialize_loads_everything() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("site.yml"), "title: Docs\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("blog")).unwrap();
        fs::write(dir.path().join("blog").join("feed.json"), r#"{"size": 10}"#).unwrap();

        let mut conf = ConfigTree::new();
        conf.set_dir(dir.path());
        conf.materialize().unwrap();

        assert_eq!(
            Value::Object(conf.values().clone()),
            json!({"site": {"title": "Docs"}, "blog": {"feed": {"size": 10}}})
        );
    }

    #[test]
    fn test_get_subdirectory_returns_contents() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blog").join("authors")).unwrap();
        fs::write(dir.path().join("blog").join("feed.json"), r#"{"size": 10}"#).unwrap();
        fs::write(
            dir.path().join("blog").join("authors").join("ann.yaml"),
            "name: Ann\n",
        )
        .unwrap();

        let mut conf = ConfigTree::new();
        conf.set_dir(dir.path());
        assert_eq!(
            conf.get("blog").unwrap(),
            Some(json!({"feed": {"size": 10}, "authors": {"ann": {"name": "Ann"}}}))
        );
    }

    #[test]
    fn test_get_lazy_leaves_directory_unread() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("blog")).unwrap();
        fs::write(dir.path().join("blog").join("feed.json"), r#"{"size": 10}"#).unwrap();
        fs::write(dir.path().join("blog").join("broken.yaml"), "a: [unclosed\n").unwrap();

        let mut conf = ConfigTree::new();
        conf.set_dir(dir.path());
        assert_eq!(conf.get_lazy("blog").unwrap(), Some(json!({})));
        assert_eq!(conf.get_lazy("blog.feed.size").unwrap(), Some(json!(10)));
        assert!(conf.get("blog").is_err());
    }

    #[test]
    fn test_lazy_and_materialized_agree_on_priority() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("menu.yaml"), "from: yaml\n").unwrap();
        fs::write(dir.path().join("menu.yml"), "from: yml\n").unwrap();
        fs::write(dir.path().join("menu.json"), r#"{"from": "json"}"#).unwrap();
        fs::write(dir.path().join("blog.yaml"), "from: file\n").unwrap();
        fs::create_dir(dir.path().join("blog")).unwrap();
        fs::write(dir.path().join("blog").join("extra.json"), "1").unwrap();

        let mut lazy = ConfigTree::new();
        lazy.set_dir(dir.path());
        let menu = lazy.get("menu").unwrap();
        let blog = lazy.get("blog").unwrap();
        assert_eq!(menu, Some(json!({"from": "yaml"})));
        assert_eq!(blog, Some(json!({"from": "file", "extra": 1})));

        let mut eager = ConfigTree::new();
        eager.set_dir(dir.path());
        eager.materialize().unwrap();
        assert_eq!(eager.values().get("menu").cloned(), menu);
        assert_eq!(eager.values().get("blog").cloned(), blog);
    }
}
