use crate::cache::DEFAULT_TTL_SECONDS;
use crate::error::{Error, Result};
use crate::security::NameValidator;
use crate::views::engine::{DEFAULT_ERROR_TEMPLATE, DEFAULT_MAX_INCLUDE_DEPTH};
use crate::views::source::{DEFAULT_EXTENSION, DEFAULT_TEMPLATE_DIRECTORY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Engine configuration, usually loaded from a TOML file
///
/// ```toml
/// template_directory = "views"
/// extension = "html"
/// error_template = "error"
/// max_include_depth = 32
///
/// [cache]
/// enabled = true
/// directory = "cache"
/// ttl = 3600
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_template_directory")]
    pub template_directory: PathBuf,

    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_error_template")]
    pub error_template: String,

    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Required when `enabled` is true
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Entry lifetime in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u64,
}

fn default_template_directory() -> PathBuf {
    PathBuf::from(DEFAULT_TEMPLATE_DIRECTORY)
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_error_template() -> String {
    DEFAULT_ERROR_TEMPLATE.to_string()
}

fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_SECONDS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_directory: default_template_directory(),
            extension: default_extension(),
            error_template: default_error_template(),
            max_include_depth: default_max_include_depth(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            ttl: default_ttl(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from a TOML file
    ///
    /// Relative directories are resolved against the file's own directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let content = fs::read_to_string(path_ref).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path_ref.display(),
                e
            ))
        })?;

        let mut config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}. Check TOML syntax.",
                path_ref.display(),
                e
            ))
        })?;

        let base_dir = path_ref.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base_dir);

        log::debug!("Loaded configuration from: {}", path_ref.display());
        Ok(config)
    }

    /// Make relative directories relative to `base_dir`
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        if self.template_directory.is_relative() {
            self.template_directory = base_dir.join(&self.template_directory);
        }
        if let Some(directory) = self.cache.directory.as_mut() {
            if directory.is_relative() {
                *directory = base_dir.join(&*directory);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_include_depth == 0 {
            return Err(Error::config("max_include_depth must be at least 1"));
        }

        if self.extension.contains(['/', '\\']) {
            return Err(Error::config(format!(
                "extension '{}' must not contain path separators",
                self.extension
            )));
        }

        if !NameValidator::is_valid_template_name(&self.error_template) {
            return Err(Error::config(format!(
                "error_template '{}' is not a valid template name",
                self.error_template
            )));
        }

        if self.cache.enabled && self.cache.directory.is_none() {
            return Err(Error::config(
                "cache.enabled is true but cache.directory is not set",
            ));
        }

        Ok(())
    }
}

// TOML support
#[cfg(not(feature = "config"))]
mod toml {
    use crate::error::Error;
    use serde::de::DeserializeOwned;

    pub fn from_str<T: DeserializeOwned>(_: &str) -> Result<T, Error> {
        Err(Error::config("TOML support not enabled. Add 'config' feature."))
    }
}
