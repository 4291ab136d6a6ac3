//! # TuneBox Configuration Module
//!
//! Configuration management for TuneBox:
//! - an embedded default YAML document merged with `<config_dir>/config.yaml`
//! - environment variable overrides (`TUNEBOX_CONFIG__HOST__HTTP_PORT=4000`)
//! - typed getters with defaults
//! - a lazily loaded process-wide singleton
//!
//! ## Usage
//!
//! ```no_run
//! use tuneconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let music = config.get_music_dir()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Downstream crates add their own sections through extension traits
//! (see `tunecovers::CoversConfigExt` or `tunehls::HlsConfigExt`), built on
//! [`Config::get_managed_dir`] and [`Config::get_value`].

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("tunebox.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load TuneBox configuration"));
}

const ENV_CONFIG_DIR: &str = "TUNEBOX_CONFIG";
const ENV_PREFIX: &str = "TUNEBOX_CONFIG__";
const DEFAULT_DIR_NAME: &str = ".tunebox";

const DEFAULT_HTTP_PORT: u16 = 3337;
const DEFAULT_BASE_URL: &str = "localhost";
const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
const DEFAULT_PASSWORD: &str = "changeme";
const DEFAULT_PLAYLIST_FILE: &str = "playlist.json";
const DEFAULT_MUSIC_DIR: &str = "music";
const DEFAULT_METADATA_CACHE_DIR: &str = "cache_metadata";
const DEFAULT_LOG_BUFFER_CAPACITY: usize = 1000;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Generates a getter/setter pair for a `usize` value with a default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path)? {
                Value::Number(n) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                Value::String(s) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: usize) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Generates a getter/setter pair for a `bool` value with a default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path)? {
                Value::Bool(b) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for TuneBox
///
/// Holds the merged YAML tree and the location of the `config.yaml` file it
/// is saved to after every mutation.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.data().clone()),
        }
    }
}

impl Config {
    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(DEFAULT_DIR_NAME).exists() {
            return DEFAULT_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(DEFAULT_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        DEFAULT_DIR_NAME.to_string()
    }

    /// Creates the directory if needed and checks it is readable and writable
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} n'est pas un répertoire", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;
        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// Lookup order:
    /// 1. `directory` when not empty
    /// 2. the `TUNEBOX_CONFIG` environment variable
    /// 3. `.tunebox` in the current directory
    /// 4. `.tunebox` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the given directory
    ///
    /// The embedded defaults are merged with `config.yaml` (when present),
    /// keys are lower-cased, `TUNEBOX_CONFIG__*` variables are applied and
    /// the result is written back to `config.yaml`.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let path = Path::new(&config_dir)
            .join("config.yaml")
            .to_string_lossy()
            .to_string();

        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                let external: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut config_value, &external);
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using embedded defaults");
            }
        }

        let mut config_value = lower_keys_value(config_value);
        apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Directory the configuration was loaded from
    pub fn dir(&self) -> &str {
        &self.config_dir
    }

    /// Writes the current tree to `config.yaml`
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets the value at `path` (e.g. `&["host", "http_port"]`) and saves
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data();
            set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    /// Reads the value at `path`; missing paths are an error
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data();
        let mut current = &*data;
        for (i, key) in path.iter().enumerate() {
            match current {
                Value::Mapping(map) => match map.get(Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                },
                _ => return Err(anyhow!("Path {} is not a mapping", path[..i].join("."))),
            }
        }
        Ok(current.clone())
    }

    /// Reads a string value, `default` when missing or not a string
    pub fn get_string(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) => s,
            Ok(Value::Number(n)) => n.to_string(),
            _ => default.to_string(),
        }
    }

    /// Resolves a relative path against the config directory
    pub fn resolve_path(&self, dir_path: &str) -> PathBuf {
        let path = Path::new(dir_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        }
    }

    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let absolute_path = self.resolve_path(dir_path);
        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created managed directory");
        }
        Ok(absolute_path.to_string_lossy().to_string())
    }

    /// Récupère un répertoire géré par la configuration
    ///
    /// Le chemin peut être absolu ou relatif au répertoire de configuration ;
    /// il est créé s'il n'existe pas. Si la clé est absente, `default` est
    /// enregistré dans la configuration.
    ///
    /// ```no_run
    /// use tuneconfig::get_config;
    ///
    /// let dir = get_config().get_managed_dir(&["host", "hls", "directory"], "cache_hls")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    /// Définit un répertoire géré par la configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Host name used when building absolute URLs (`localhost` when unset)
    pub fn get_base_url(&self) -> String {
        match self.get_value(&["host", "base_url"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => DEFAULT_BASE_URL.to_string(),
        }
    }

    /// HTTP port, 3337 when missing or invalid
    pub fn get_http_port(&self) -> u16 {
        let port = match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Ok(Value::String(s)) => s.trim().parse::<u16>().ok(),
            _ => None,
        };
        port.unwrap_or_else(|| {
            tracing::warn!("Invalid or missing HTTP port, using default {}", DEFAULT_HTTP_PORT);
            DEFAULT_HTTP_PORT
        })
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    /// Directory holding the source audio files
    pub fn get_music_dir(&self) -> Result<String> {
        self.get_managed_dir(&["host", "music", "directory"], DEFAULT_MUSIC_DIR)
    }

    /// Directory of the metadata cache database
    pub fn get_metadata_cache_dir(&self) -> Result<String> {
        self.get_managed_dir(
            &["host", "metadata_cache", "directory"],
            DEFAULT_METADATA_CACHE_DIR,
        )
    }

    /// Path of the JSON playlist order file, relative paths under the config dir
    pub fn get_playlist_file(&self) -> PathBuf {
        let file = self.get_string(&["host", "music", "playlist_file"], DEFAULT_PLAYLIST_FILE);
        self.resolve_path(&file)
    }

    /// Shared secret checked by upload and delete
    pub fn get_password(&self) -> String {
        self.get_string(&["host", "security", "password"], DEFAULT_PASSWORD)
    }

    pub fn set_password(&self, password: String) -> Result<()> {
        self.set_value(&["host", "security", "password"], Value::String(password))
    }

    /// Static web client directory, `None` when not configured or absent
    pub fn get_webapp_dir(&self) -> Option<PathBuf> {
        let dir = self.get_string(&["host", "webapp", "directory"], "");
        if dir.is_empty() {
            return None;
        }
        let path = self.resolve_path(&dir);
        path.is_dir().then_some(path)
    }

    impl_usize_config!(
        get_chunk_size,
        set_chunk_size,
        &["host", "music", "chunk_size"],
        DEFAULT_CHUNK_SIZE
    );

    impl_usize_config!(
        get_log_cache_size,
        set_log_cache_size,
        &["host", "logger", "buffer_capacity"],
        DEFAULT_LOG_BUFFER_CAPACITY
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Niveau de log minimum
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"])? {
            Value::String(s) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Returns the global configuration, loaded on first access
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    match data {
        Value::Mapping(map) => {
            let key = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key, value);
            } else {
                let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
                set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        }
        _ => Err(anyhow!("Current node is not a map")),
    }
}

fn apply_env_overrides(config: &mut Value) {
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped.split("__").collect::<Vec<_>>();
            let yaml_value = serde_yaml::from_str::<Value>(&value)
                .unwrap_or_else(|_| Value::String(value.clone()));
            let _ = set_value_internal(config, &key_path, yaml_value);
        }
    }
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lower_keys_value(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Recursively merges `external` into `default`; scalars and sequences replace
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
