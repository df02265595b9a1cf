//! Configuration store for the logbook.
//!
//! Configurations are named key/value tables kept in `<name>.toml`. Each
//! file is looked up in the primary directory first and in the default
//! directory second. Loaded configurations are cached per store, so every
//! caller asking for the same name shares one [`Config`] handle.
//!
//! The configuration named [`MAIN`] is special: every other configuration
//! delegates keys it does not define to it.

use crate::{Error, Result};
use fs2::FileExt;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;

/// Name of the configuration all others fall back to
pub const MAIN: &str = "main";

/// Well-known configuration keys
pub mod keys {
    /// Template used to render member names, see [`crate::names`]
    pub const NAME_FORMAT: &str = "member.name_format";
    /// Default log level for the launcher
    pub const LOG_LEVEL: &str = "log.level";
}

/// Cache of configurations loaded from disk
pub struct ConfigStore {
    primary_dir: PathBuf,
    default_dir: Option<PathBuf>,
    cache: Mutex<HashMap<String, Arc<Config>>>,
}

impl ConfigStore {
    /// Create a store reading from `primary_dir`, falling back to `default_dir`.
    ///
    /// Saved configurations always go to `primary_dir`.
    pub fn new(primary_dir: impl Into<PathBuf>, default_dir: Option<PathBuf>) -> Self {
        Self {
            primary_dir: primary_dir.into(),
            default_dir,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Per-user default directory (`$XDG_CONFIG_HOME/rowlog` on Linux)
    pub fn user_default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|base| base.join("rowlog"))
    }

    /// The main configuration
    pub fn main(&self) -> Result<Arc<Config>> {
        self.load_cached(MAIN, None)
    }

    /// A named configuration, chained to the main one
    pub fn get(&self, name: &str) -> Result<Arc<Config>> {
        if name == MAIN {
            return self.main();
        }
        let main = self.main()?;
        self.load_cached(name, Some(main))
    }

    fn load_cached(&self, name: &str, parent: Option<Arc<Config>>) -> Result<Arc<Config>> {
        validate_name(name)?;

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(config) = cache.get(name) {
            return Ok(Arc::clone(config));
        }

        let primary = self.primary_dir.join(file_name(name));
        let fallback = self.default_dir.as_ref().map(|dir| dir.join(file_name(name)));
        let config = Arc::new(Config::load(name, primary, fallback.as_deref(), parent)?);
        cache.insert(name.to_string(), Arc::clone(&config));
        Ok(config)
    }
}

fn file_name(name: &str) -> String {
    format!("{}.toml", name)
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(Error::Config(format!("invalid configuration name '{}'", name)));
    }
    Ok(())
}

/// A single named configuration
pub struct Config {
    name: String,
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
    auto_save: AtomicBool,
    parent: Option<Arc<Config>>,
}

impl Config {
    fn load(
        name: &str,
        path: PathBuf,
        fallback: Option<&Path>,
        parent: Option<Arc<Config>>,
    ) -> Result<Self> {
        let values = if path.exists() {
            read_values(&path)?
        } else if let Some(fallback) = fallback.filter(|p| p.exists()) {
            tracing::debug!("Config '{}' not found at {:?}, using {:?}", name, path, fallback);
            read_values(fallback)?
        } else {
            tracing::info!("No config file found for '{}', starting empty", name);
            BTreeMap::new()
        };

        Ok(Self {
            name: name.to_string(),
            path,
            values: Mutex::new(values),
            auto_save: AtomicBool::new(false),
            parent,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the configuration is saved to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configuration unresolved keys are delegated to
    pub fn parent(&self) -> Option<&Arc<Config>> {
        self.parent.as_ref()
    }

    /// Look up a key locally, then in the main configuration
    pub fn get(&self, key: &str) -> Option<String> {
        let local = self.lock().get(key).cloned();
        local.or_else(|| self.parent.as_ref().and_then(|p| p.get(key)))
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Keys defined in this configuration, excluding inherited ones
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn auto_save(&self) -> bool {
        self.auto_save.load(Ordering::SeqCst)
    }

    /// Persist after every mutation when enabled
    pub fn set_auto_save(&self, enabled: bool) {
        self.auto_save.store(enabled, Ordering::SeqCst);
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.lock();
        values.insert(key.to_string(), value.to_string());
        if self.auto_save() {
            write_values(&self.path, &values)?;
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<Option<String>> {
        let mut values = self.lock();
        let removed = values.remove(key);
        if removed.is_some() && self.auto_save() {
            write_values(&self.path, &values)?;
        }
        Ok(removed)
    }

    /// Write the local values to the primary path
    pub fn save(&self) -> Result<()> {
        let values = self.lock();
        write_values(&self.path, &values)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read a TOML file into a flat map; nested tables become dotted keys
fn read_values(path: &Path) -> Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    let table: toml::Table = contents.parse()?;
    let mut values = BTreeMap::new();
    flatten("", &table, &mut values);
    tracing::info!("Loaded config from {:?}", path);
    Ok(values)
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::String(s) => {
                out.insert(full_key, s.clone());
            }
            toml::Value::Table(nested) => flatten(&full_key, nested, out),
            other => {
                out.insert(full_key, other.to_string());
            }
        }
    }
}

fn write_values(path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Config(format!("config path {:?} has no parent", path)))?;
    std::fs::create_dir_all(parent)?;

    let contents = toml::to_string(values)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}
