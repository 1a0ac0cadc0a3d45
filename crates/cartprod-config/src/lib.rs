//! Configuration primitives and loader for cartprod.
//!
//! The loader resolves configuration using a precedence stack:
//! override flag → working directory → git root → built-in defaults.
//! Parsed settings are normalised into typed structures so the engine and the
//! CLI never touch raw TOML.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE_NAME: &str = ".cartprod.toml";
const DEFAULT_VARIABLE_PREFIX: &str = "V";
const DEFAULT_DATASET_PREFIX: &str = "D";

/// Complete configuration resolved from defaults and on-disk overrides.
#[derive(Clone, Debug)]
pub struct Config {
    pub storage: StorageSettings,
    pub naming: NamingSettings,
    pub sources: ConfigSources,
}

/// Where intermediate case files are written.
#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub temp_dir: PathBuf,
}

/// Prefixes used when allocating synthetic variable and dataset names.
#[derive(Clone, Debug)]
pub struct NamingSettings {
    pub variable_prefix: String,
    pub dataset_prefix: String,
}

/// Provenance for the resolved configuration.
#[derive(Clone, Debug)]
pub struct ConfigSources {
    pub working_directory: PathBuf,
    pub layers: Vec<ConfigSource>,
}

/// Specific layer of configuration (default/git/local/override).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigSource {
    pub kind: ConfigSourceKind,
    pub path: Option<PathBuf>,
    pub base_dir: PathBuf,
}

impl ConfigSource {
    fn default(base_dir: PathBuf) -> Self {
        ConfigSource {
            kind: ConfigSourceKind::Default,
            path: None,
            base_dir,
        }
    }

    fn for_file(kind: ConfigSourceKind, path: PathBuf) -> Self {
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        ConfigSource {
            kind,
            path: Some(path),
            base_dir,
        }
    }

    fn describe(&self) -> String {
        match (&self.kind, &self.path) {
            (ConfigSourceKind::Default, _) => "built-in defaults".to_owned(),
            (kind, Some(path)) => format!("{} at {}", kind, path.display()),
            (kind, None) => kind.to_string(),
        }
    }
}

/// Kinds of configuration sources, ordered from lowest to highest precedence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigSourceKind {
    Default,
    GitRoot,
    Local,
    Override,
}

impl fmt::Display for ConfigSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigSourceKind::Default => "defaults",
            ConfigSourceKind::GitRoot => "git-root config",
            ConfigSourceKind::Local => "local config",
            ConfigSourceKind::Override => "override config",
        };
        f.write_str(label)
    }
}

/// Loader options, typically supplied by the CLI layer.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub override_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl LoadOptions {
    pub fn with_override_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }
}

/// Errors surfaced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to resolve working directory {attempted}: {source}")]
    WorkingDirectory {
        attempted: PathBuf,
        source: io::Error,
    },
    #[error("override config {path} not found")]
    OverrideNotFound { path: PathBuf },
    #[error("failed to read config {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("configuration validation failed:\n{0}")]
    Validation(ConfigValidationErrors),
}

impl Config {
    /// Loads configuration using the precedence rules and returns typed settings.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let working_dir = resolve_working_dir(options.working_dir)?;
        let override_path = options
            .override_path
            .map(|path| make_absolute(&path, &working_dir));

        if let Some(path) = &override_path {
            if !path.exists() {
                return Err(ConfigError::OverrideNotFound { path: path.clone() });
            }
        }

        let default_source = ConfigSource::default(working_dir.clone());
        let mut merged = PartialConfig::default();
        merged.merge(defaults_layer(default_source.clone()));

        let mut source_layers = vec![default_source];

        let git_root = find_git_root(&working_dir);
        let git_config_path = git_root.as_ref().map(|root| root.join(CONFIG_FILE_NAME));
        let local_config_path = working_dir.join(CONFIG_FILE_NAME);

        if let Some(path) = git_config_path.as_ref() {
            if path.exists() && Some(path) != override_path.as_ref() && path != &local_config_path {
                let source = ConfigSource::for_file(ConfigSourceKind::GitRoot, path.clone());
                merged.merge(load_layer(path, source.clone())?);
                source_layers.push(source);
            }
        }

        if local_config_path.exists() && Some(&local_config_path) != override_path.as_ref() {
            let source = ConfigSource::for_file(ConfigSourceKind::Local, local_config_path.clone());
            merged.merge(load_layer(&local_config_path, source.clone())?);
            source_layers.push(source);
        }

        if let Some(path) = override_path {
            let source = ConfigSource::for_file(ConfigSourceKind::Override, path.clone());
            merged.merge(load_layer(&path, source.clone())?);
            source_layers.push(source);
        }

        let resolved = merged.finalize().map_err(ConfigError::Validation)?;
        Ok(Config {
            storage: resolved.storage,
            naming: resolved.naming,
            sources: ConfigSources {
                working_directory: working_dir,
                layers: source_layers,
            },
        })
    }
}

impl Default for Config {
    /// Built-in defaults only, without consulting the filesystem for layers.
    fn default() -> Self {
        let working_directory = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Config {
            storage: StorageSettings {
                temp_dir: env::temp_dir(),
            },
            naming: NamingSettings {
                variable_prefix: DEFAULT_VARIABLE_PREFIX.to_owned(),
                dataset_prefix: DEFAULT_DATASET_PREFIX.to_owned(),
            },
            sources: ConfigSources {
                layers: vec![ConfigSource::default(working_directory.clone())],
                working_directory,
            },
        }
    }
}

fn resolve_working_dir(override_dir: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    match override_dir {
        Some(path) => fs::canonicalize(&path).map_err(|source| ConfigError::WorkingDirectory {
            attempted: path,
            source,
        }),
        None => env::current_dir().map_err(|source| ConfigError::WorkingDirectory {
            attempted: PathBuf::from("."),
            source,
        }),
    }
}

fn make_absolute(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn load_layer(path: &Path, source: ConfigSource) -> Result<PartialConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.into(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.into(),
        source,
    })?;
    Ok(raw.into_partial(source))
}

fn defaults_layer(source: ConfigSource) -> PartialConfig {
    PartialConfig {
        storage: Some(StoragePartial {
            temp_dir: Some(Located::new(env::temp_dir(), source.clone())),
        }),
        naming: Some(NamingPartial {
            variable_prefix: Some(Located::new(
                DEFAULT_VARIABLE_PREFIX.to_owned(),
                source.clone(),
            )),
            dataset_prefix: Some(Located::new(DEFAULT_DATASET_PREFIX.to_owned(), source)),
        }),
    }
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

#[derive(Clone, Debug, Default)]
struct PartialConfig {
    storage: Option<StoragePartial>,
    naming: Option<NamingPartial>,
}

struct ResolvedConfig {
    storage: StorageSettings,
    naming: NamingSettings,
}

impl PartialConfig {
    fn merge(&mut self, mut other: PartialConfig) {
        if let Some(other_storage) = other.storage.take() {
            match &mut self.storage {
                Some(storage) => storage.merge(other_storage),
                None => self.storage = Some(other_storage),
            }
        }

        if let Some(other_naming) = other.naming.take() {
            match &mut self.naming {
                Some(naming) => naming.merge(other_naming),
                None => self.naming = Some(other_naming),
            }
        }
    }

    fn finalize(self) -> Result<ResolvedConfig, ConfigValidationErrors> {
        let mut errors = Vec::new();
        let fallback = || ConfigSource::default(PathBuf::from("."));

        let storage_partial = self.storage.unwrap_or_default();
        let temp_dir_loc = storage_partial
            .temp_dir
            .unwrap_or_else(|| Located::new(env::temp_dir(), fallback()));
        let temp_dir = resolve_path(&temp_dir_loc);

        let naming_partial = self.naming.unwrap_or_default();
        let variable_prefix = naming_partial
            .variable_prefix
            .unwrap_or_else(|| Located::new(DEFAULT_VARIABLE_PREFIX.to_owned(), fallback()));
        let dataset_prefix = naming_partial
            .dataset_prefix
            .unwrap_or_else(|| Located::new(DEFAULT_DATASET_PREFIX.to_owned(), fallback()));

        validate_prefix(&variable_prefix, "naming.variable_prefix", &mut errors);
        validate_prefix(&dataset_prefix, "naming.dataset_prefix", &mut errors);

        if !errors.is_empty() {
            return Err(ConfigValidationErrors(errors));
        }

        Ok(ResolvedConfig {
            storage: StorageSettings { temp_dir },
            naming: NamingSettings {
                variable_prefix: variable_prefix.value,
                dataset_prefix: dataset_prefix.value,
            },
        })
    }
}

#[derive(Clone, Debug, Default)]
struct StoragePartial {
    temp_dir: Option<Located<PathBuf>>,
}

impl StoragePartial {
    fn merge(&mut self, other: StoragePartial) {
        if other.temp_dir.is_some() {
            self.temp_dir = other.temp_dir;
        }
    }
}

#[derive(Clone, Debug, Default)]
struct NamingPartial {
    variable_prefix: Option<Located<String>>,
    dataset_prefix: Option<Located<String>>,
}

impl NamingPartial {
    fn merge(&mut self, other: NamingPartial) {
        if other.variable_prefix.is_some() {
            self.variable_prefix = other.variable_prefix;
        }
        if other.dataset_prefix.is_some() {
            self.dataset_prefix = other.dataset_prefix;
        }
    }
}

#[derive(Clone, Debug)]
struct Located<T> {
    value: T,
    source: ConfigSource,
}

impl<T> Located<T> {
    fn new(value: T, source: ConfigSource) -> Self {
        Located { value, source }
    }
}

fn resolve_path(located: &Located<PathBuf>) -> PathBuf {
    let path = &located.value;
    if path.is_absolute() {
        path.clone()
    } else {
        located.source.base_dir.join(path)
    }
}

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").expect("valid prefix regex"))
}

fn validate_prefix(
    located: &Located<String>,
    context: &str,
    errors: &mut Vec<ConfigValidationError>,
) {
    if !prefix_pattern().is_match(&located.value) {
        errors.push(
            ConfigValidationError::new(
                Some(located.source.clone()),
                format!(
                    "'{}' must start with a letter and contain only letters, digits, '_' or '.'",
                    located.value
                ),
            )
            .with_context(context),
        );
    }
}

/// Container for validation failures, formatted as a bullet list.
#[derive(Debug)]
pub struct ConfigValidationErrors(pub Vec<ConfigValidationError>);

impl fmt::Display for ConfigValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "- {err}")?;
        }
        Ok(())
    }
}

impl ConfigValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ConfigValidationError> {
        self.0.iter()
    }
}

/// Validation failure with optional provenance.
#[derive(Clone, Debug)]
pub struct ConfigValidationError {
    pub source: Option<ConfigSource>,
    pub message: String,
    pub context: Option<String>,
}

impl ConfigValidationError {
    fn new(source: Option<ConfigSource>, message: String) -> Self {
        ConfigValidationError {
            source,
            message,
            context: None,
        }
    }

    fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{}: {}", context, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, " ({})", source.describe())?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    storage: Option<RawStorage>,
    #[serde(default)]
    naming: Option<RawNaming>,
}

impl RawConfig {
    fn into_partial(self, source: ConfigSource) -> PartialConfig {
        PartialConfig {
            storage: self.storage.map(|storage| StoragePartial {
                temp_dir: storage
                    .temp_dir
                    .map(|value| Located::new(value, source.clone())),
            }),
            naming: self.naming.map(|naming| NamingPartial {
                variable_prefix: naming
                    .variable_prefix
                    .map(|value| Located::new(value, source.clone())),
                dataset_prefix: naming
                    .dataset_prefix
                    .map(|value| Located::new(value, source.clone())),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStorage {
    #[serde(default)]
    temp_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNaming {
    #[serde(default)]
    variable_prefix: Option<String>,
    #[serde(default)]
    dataset_prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pattern_accepts_variable_like_names() {
        assert!(prefix_pattern().is_match("V"));
        assert!(prefix_pattern().is_match("tmp_var.1"));
        assert!(!prefix_pattern().is_match("1abc"));
        assert!(!prefix_pattern().is_match(""));
        assert!(!prefix_pattern().is_match("has space"));
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let base = ConfigSource::default(PathBuf::from("/base"));
        let local = ConfigSource::for_file(ConfigSourceKind::Local, PathBuf::from("/work/x.toml"));

        let mut merged = defaults_layer(base);
        merged.merge(PartialConfig {
            storage: None,
            naming: Some(NamingPartial {
                variable_prefix: Some(Located::new("SEQ".into(), local)),
                dataset_prefix: None,
            }),
        });

        let resolved = merged.finalize().unwrap();
        assert_eq!(resolved.naming.variable_prefix, "SEQ");
        assert_eq!(resolved.naming.dataset_prefix, DEFAULT_DATASET_PREFIX);
    }
}
