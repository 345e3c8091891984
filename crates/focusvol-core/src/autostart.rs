use std::path::{Path, PathBuf};

use auto_launch::{AutoLaunch, AutoLaunchBuilder};
use thiserror::Error;
use tracing::info;

/// Name of the login entry; on Linux this becomes `focusvol.desktop` in the
/// XDG autostart directory.
pub const APP_NAME: &str = "focusvol";

#[derive(Error, Debug)]
pub enum AutostartError {
    #[error("cannot locate the running executable: {0}")]
    NoExecutable(std::io::Error),
    #[error("executable {path} does not exist")]
    SourceMissing { path: PathBuf },
    #[error("executable path {path} is not valid UTF-8")]
    NonUtf8Path { path: PathBuf },
    #[error("failed to {action} login entry: {message}")]
    Backend {
        action: &'static str,
        message: String,
    },
}

/// Login registration that launches `<exe> daemon` at session start.
///
/// The entry's presence on disk is the toggle state; nothing is cached.
#[derive(Debug, Clone)]
pub struct Autostart {
    exe: PathBuf,
}

impl Autostart {
    #[must_use]
    pub fn new(exe: PathBuf) -> Self {
        Autostart { exe }
    }

    /// Registration for the currently running binary.
    pub fn for_current_exe() -> Result<Self, AutostartError> {
        std::env::current_exe()
            .map(Self::new)
            .map_err(AutostartError::NoExecutable)
    }

    #[must_use]
    pub fn exe(&self) -> &Path {
        &self.exe
    }

    fn launcher(&self) -> Result<AutoLaunch, AutostartError> {
        let path = self.exe.to_str().ok_or_else(|| AutostartError::NonUtf8Path {
            path: self.exe.clone(),
        })?;
        AutoLaunchBuilder::new()
            .set_app_name(APP_NAME)
            .set_app_path(path)
            .set_args(&["daemon"])
            .build()
            .map_err(|e| AutostartError::Backend {
                action: "build",
                message: e.to_string(),
            })
    }

    /// Whether the login entry currently exists.
    pub fn is_enabled(&self) -> Result<bool, AutostartError> {
        self.launcher()?
            .is_enabled()
            .map_err(|e| AutostartError::Backend {
                action: "query",
                message: e.to_string(),
            })
    }

    /// Create the login entry. Fails without touching anything if the
    /// executable is gone.
    pub fn enable(&self) -> Result<(), AutostartError> {
        if !self.exe.is_file() {
            return Err(AutostartError::SourceMissing {
                path: self.exe.clone(),
            });
        }
        self.launcher()?
            .enable()
            .map_err(|e| AutostartError::Backend {
                action: "create",
                message: e.to_string(),
            })?;
        info!("startup entry enabled for {}", self.exe.display());
        Ok(())
    }

    /// Remove the login entry. Removing an absent entry is not an error.
    pub fn disable(&self) -> Result<(), AutostartError> {
        let launcher = self.launcher()?;
        let enabled = launcher.is_enabled().map_err(|e| AutostartError::Backend {
            action: "query",
            message: e.to_string(),
        })?;
        if !enabled {
            return Ok(());
        }
        launcher.disable().map_err(|e| AutostartError::Backend {
            action: "remove",
            message: e.to_string(),
        })?;
        info!("startup entry disabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_rejects_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("focusvol");
        let autostart = Autostart::new(missing.clone());

        match autostart.enable() {
            Err(AutostartError::SourceMissing { path }) => assert_eq!(path, missing),
            other => panic!("expected SourceMissing, got {other:?}"),
        }
    }

    #[test]
    fn enable_rejects_directory_as_executable() {
        let dir = tempfile::tempdir().unwrap();
        let autostart = Autostart::new(dir.path().to_owned());
        assert!(matches!(
            autostart.enable(),
            Err(AutostartError::SourceMissing { .. })
        ));
    }

    #[test]
    fn current_exe_resolves() {
        let autostart = Autostart::for_current_exe().unwrap();
        assert!(autostart.exe().is_absolute());
    }

    #[test]
    fn source_missing_message_names_path() {
        let err = AutostartError::SourceMissing {
            path: PathBuf::from("/opt/focusvol"),
        };
        assert_eq!(err.to_string(), "executable /opt/focusvol does not exist");
    }
}
