use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write settings to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to parse settings from {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize settings: {source}")]
    Serialize { source: serde_json::Error },
    #[error("failed to create settings directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("no application name given")]
    EmptyName,
}

fn default_volume_in() -> f64 {
    1.0
}
fn default_volume_out() -> f64 {
    0.1
}

/// Saved pair of levels for one application, as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedLevels {
    /// Level while the application is focused.
    #[serde(default = "default_volume_in")]
    pub volume_in: f64,
    /// Level while the application is in the background.
    #[serde(default = "default_volume_out")]
    pub volume_out: f64,
}

/// The whole settings file: application name -> levels.
///
/// Keys are exact, case-sensitive application names as shown in the picker.
pub type SavedSettings = BTreeMap<String, SavedLevels>;

/// File-backed store of per-application level pairs.
///
/// Stateless between calls: every operation reads the file afresh. Saves are
/// read-modify-write and assume a single writer.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        SettingsStore { path }
    }

    /// Store at the default per-user location, if one can be resolved.
    #[must_use]
    pub fn at_default_path() -> Option<Self> {
        Some(Self::new(Self::default_path()?))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full mapping. A missing file is an empty mapping.
    pub fn read_all(&self) -> Result<SavedSettings, SettingsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SavedSettings::new()),
            Err(source) => Err(SettingsError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Look up the `(focused, unfocused)` pair saved for `app_name`.
    /// Surrounding whitespace in the name is ignored.
    pub fn load(&self, app_name: &str) -> Result<Option<(f64, f64)>, SettingsError> {
        Ok(self
            .read_all()?
            .get(app_name.trim())
            .map(|levels| (levels.volume_in, levels.volume_out)))
    }

    /// Overwrite the entry for `app_name` and rewrite the whole file.
    ///
    /// The name is stored trimmed. Other entries are preserved as read. The write is atomic: contents go
    /// to `settings.json.tmp` first and are renamed over the target.
    pub fn save(&self, app_name: &str, focused: f64, unfocused: f64) -> Result<(), SettingsError> {
        let app_name = app_name.trim();
        if app_name.is_empty() {
            return Err(SettingsError::EmptyName);
        }

        let mut all = self.read_all()?;
        all.insert(
            app_name.to_owned(),
            SavedLevels {
                volume_in: focused,
                volume_out: unfocused,
            },
        );

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::CreateDir {
                path: parent.to_owned(),
                source,
            })?;
        }

        let contents =
            serde_json::to_string_pretty(&all).map_err(|source| SettingsError::Serialize { source })?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, contents).map_err(|source| SettingsError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })?;

        Ok(())
    }

    /// Returns the default data directory.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        Some(dirs::data_dir()?.join("focusvol"))
    }

    /// Returns the default settings file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        Some(Self::default_dir()?.join("settings.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("focusvol").join("settings.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_is_empty_mapping() {
        let (_dir, store) = temp_store();
        assert!(store.read_all().unwrap().is_empty());
        assert_eq!(store.load("App.exe").unwrap(), None);
    }

    #[test]
    fn save_then_load_returns_exact_values() {
        let (_dir, store) = temp_store();
        store.save("App.exe", 0.8, 0.2).unwrap();
        assert_eq!(store.load("App.exe").unwrap(), Some((0.8, 0.2)));
    }

    #[test]
    fn saving_another_app_keeps_first_entry() {
        let (_dir, store) = temp_store();
        store.save("App.exe", 0.8, 0.2).unwrap();
        store.save("Other.exe", 0.5, 0.0).unwrap();

        assert_eq!(store.load("App.exe").unwrap(), Some((0.8, 0.2)));
        assert_eq!(store.load("Other.exe").unwrap(), Some((0.5, 0.0)));
    }

    #[test]
    fn save_overwrites_entry_wholesale() {
        let (_dir, store) = temp_store();
        store.save("App.exe", 0.8, 0.2).unwrap();
        store.save("App.exe", 0.6, 0.4).unwrap();
        assert_eq!(store.load("App.exe").unwrap(), Some((0.6, 0.4)));
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn keys_are_case_sensitive() {
        let (_dir, store) = temp_store();
        store.save("App.exe", 0.8, 0.2).unwrap();
        assert_eq!(store.load("app.exe").unwrap(), None);
    }

    #[test]
    fn names_are_stored_trimmed() {
        let (_dir, store) = temp_store();
        store.save(" mpv ", 0.6, 0.3).unwrap();

        assert_eq!(store.load("mpv").unwrap(), Some((0.6, 0.3)));
        assert_eq!(store.load("  mpv").unwrap(), Some((0.6, 0.3)));
        let keys: Vec<String> = store.read_all().unwrap().into_keys().collect();
        assert_eq!(keys, vec!["mpv".to_owned()]);
    }

    #[test]
    fn save_rejects_empty_name() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.save("  ", 0.5, 0.5),
            Err(SettingsError::EmptyName)
        ));
        assert!(!store.path().exists());
    }

    #[test]
    fn file_format_uses_volume_in_and_volume_out() {
        let (_dir, store) = temp_store();
        store.save("firefox", 1.0, 0.1).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["firefox"]["volume_in"], 1.0);
        assert_eq!(value["firefox"]["volume_out"], 0.1);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let (_dir, store) = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"a": {"volume_in": 0.7}, "b": {"volume_out": 0.3}, "c": {}}"#,
        )
        .unwrap();

        assert_eq!(store.load("a").unwrap(), Some((0.7, 0.1)));
        assert_eq!(store.load("b").unwrap(), Some((1.0, 0.3)));
        assert_eq!(store.load("c").unwrap(), Some((1.0, 0.1)));
    }

    #[test]
    fn reads_file_written_by_other_tools() {
        let (_dir, store) = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"spotify": {"volume_in": 1.0, "volume_out": 0.25}}"#,
        )
        .unwrap();

        store.save("firefox", 0.9, 0.1).unwrap();
        assert_eq!(store.load("spotify").unwrap(), Some((1.0, 0.25)));
    }

    #[test]
    fn malformed_file_is_parse_error_and_left_untouched() {
        let (_dir, store) = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();

        assert!(matches!(store.load("x"), Err(SettingsError::Parse { .. })));
        assert!(matches!(
            store.save("x", 0.5, 0.5),
            Err(SettingsError::Parse { .. })
        ));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "not json");
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let (_dir, store) = temp_store();
        store.save("App.exe", 0.8, 0.2).unwrap();
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn default_path_ends_with_settings_json() {
        if let Some(path) = SettingsStore::default_path() {
            assert!(path.ends_with("focusvol/settings.json"));
        }
    }
}
