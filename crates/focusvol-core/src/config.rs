use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitor::DEFAULT_POLL_INTERVAL_MS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write config to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml_edit::de::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize { source: toml_edit::ser::Error },
    #[error("failed to create config directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
}

/// Monitor loop parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Push the current level every tick even when focus did not change.
    /// Overrides volume changes made by other mixers between ticks.
    #[serde(default = "default_true")]
    pub reassert: bool,
    #[serde(default = "default_actuation_timeout_ms")]
    pub actuation_timeout_ms: u64,
}

/// Levels used when no saved settings exist for an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_focused_volume")]
    pub focused_volume: f64,
    #[serde(default = "default_unfocused_volume")]
    pub unfocused_volume: f64,
}

/// Application picker refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickerSection {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_actuation_timeout_ms() -> u64 {
    400
}
fn default_focused_volume() -> f64 {
    1.0
}
fn default_unfocused_volume() -> f64 {
    0.1
}
fn default_refresh_interval_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

impl Default for MonitorSection {
    fn default() -> Self {
        MonitorSection {
            poll_interval_ms: default_poll_interval_ms(),
            reassert: true,
            actuation_timeout_ms: default_actuation_timeout_ms(),
        }
    }
}

impl Default for DefaultsSection {
    fn default() -> Self {
        DefaultsSection {
            focused_volume: default_focused_volume(),
            unfocused_volume: default_unfocused_volume(),
        }
    }
}

impl Default for PickerSection {
    fn default() -> Self {
        PickerSection {
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

/// Top-level configuration.
///
/// Forward-compatible: unknown fields are silently ignored (no `deny_unknown_fields`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub picker: PickerSection,
}

impl Config {
    /// Floor for the tick period; anything lower would spin the audio server.
    pub const MIN_POLL_INTERVAL_MS: u64 = 50;

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms.max(Self::MIN_POLL_INTERVAL_MS))
    }

    #[must_use]
    pub fn actuation_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor.actuation_timeout_ms.max(1))
    }

    #[must_use]
    pub fn picker_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.picker.refresh_interval_secs.max(1))
    }

    /// Load config from a TOML file. Returns default config if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                toml_edit::de::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_owned(),
                    source,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// Serialize this config to a TOML string with one `[section]` per group.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let mut doc = toml_edit::ser::to_document(self)
            .map_err(|source| ConfigError::Serialize { source })?;
        expand_top_level_tables(&mut doc);
        Ok(doc.to_string())
    }

    /// Returns the default config directory path.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("focusvol"))
    }

    /// Returns the default config file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        Some(Self::default_dir()?.join("config.toml"))
    }
}

/// Convert top-level `InlineTable` values into proper `Table` entries so they
/// render as `[section]` headers instead of `section = { ... }` one-liners.
fn expand_top_level_tables(doc: &mut toml_edit::DocumentMut) {
    use toml_edit::{Item, Value};

    let keys: Vec<String> = doc.iter().map(|(k, _)| k.to_owned()).collect();
    for key in keys {
        let Some(item) = doc.get_mut(&key) else {
            continue;
        };
        if let Item::Value(Value::InlineTable(inline)) = item {
            let table = inline.clone().into_table();
            *item = Item::Table(table);
        }
    }
}

const HEADER: &str = "\
# focusvol configuration
# Changes are picked up automatically and apply to the next `focusvol start`.
#
# [monitor]
# poll_interval_ms      tick period of the focus monitor
# reassert              re-apply the current level every tick, overriding
#                       changes made by other mixers; false only acts on
#                       focus changes
# actuation_timeout_ms  how long one volume change may wait on the server
#
# [defaults]            levels used when nothing is saved for an application
# [picker]              how often the application list is refreshed

";

/// Generate the default config file content for new users.
pub fn default_config_content() -> Result<String, ConfigError> {
    let body = Config::default().to_toml()?;
    Ok(format!("{HEADER}{body}"))
}

/// Write the default config with comments to the given path if it doesn't exist.
/// Creates parent directories as needed. Returns true if the file was created.
pub fn bootstrap_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }

    write_atomic(path, &default_config_content()?)?;

    Ok(true)
}

/// Write `contents` to `path.tmp` and rename it over `path`, creating parent
/// directories as needed.
fn write_atomic(path: &Path, contents: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_owned(),
            source,
        })?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, contents).map_err(|source| ConfigError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| ConfigError::Write {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = Config::default();
        assert_eq!(config.monitor.poll_interval_ms, 500);
        assert!(config.monitor.reassert);
        assert_eq!(config.defaults.focused_volume, 1.0);
        assert_eq!(config.defaults.unfocused_volume, 0.1);
        assert_eq!(config.picker.refresh_interval_secs, 10);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml_edit::de::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_toml_preserves_defaults() {
        let config: Config = toml_edit::de::from_str(
            r#"
            [monitor]
            reassert = false
            "#,
        )
        .unwrap();

        assert!(!config.monitor.reassert);
        assert_eq!(config.monitor.poll_interval_ms, 500);
        assert_eq!(config.defaults, DefaultsSection::default());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config: Config = toml_edit::de::from_str(
            r#"
            [defaults]
            unfocused_volume = 0.3
            future_field = "hello"

            [some_future_section]
            key = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.defaults.unfocused_volume, 0.3);
    }

    #[test]
    fn malformed_toml_returns_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid [toml").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn load_nonexistent_returns_defaults() {
        let config = Config::load(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn durations_have_floors() {
        let mut config = Config::default();
        config.monitor.poll_interval_ms = 0;
        config.monitor.actuation_timeout_ms = 0;
        config.picker.refresh_interval_secs = 0;
        assert_eq!(
            config.poll_interval(),
            Duration::from_millis(Config::MIN_POLL_INTERVAL_MS)
        );
        assert_eq!(config.actuation_timeout(), Duration::from_millis(1));
        assert_eq!(config.picker_refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn to_toml_renders_section_headers() {
        let toml = Config::default().to_toml().unwrap();
        assert!(toml.contains("[monitor]"), "{toml}");
        assert!(toml.contains("[defaults]"), "{toml}");
        assert!(toml.contains("[picker]"), "{toml}");
    }

    #[test]
    fn written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.monitor.reassert = false;
        config.defaults.unfocused_volume = 0.25;

        write_atomic(&path, &config.to_toml().unwrap()).unwrap();
        assert!(!path.with_extension("toml.tmp").exists());
        let loaded = Config::load(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn default_config_content_round_trips() {
        let content = default_config_content().unwrap();
        assert!(content.starts_with("# focusvol configuration"));
        let parsed: Config = toml_edit::de::from_str(&content).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn bootstrap_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focusvol").join("config.toml");

        assert!(bootstrap_config(&path).unwrap());
        std::fs::write(&path, "[monitor]\nreassert = false\n").unwrap();
        assert!(!bootstrap_config(&path).unwrap());

        let config = Config::load(&path).unwrap();
        assert!(!config.monitor.reassert);
    }
}
