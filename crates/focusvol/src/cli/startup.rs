use anyhow::{Context, Result};
use focusvol_core::autostart::Autostart;

use crate::StartupCommands;

/// Manage the login entry directly; the daemon is not involved.
pub fn run(command: StartupCommands) -> Result<()> {
    let autostart = Autostart::for_current_exe()?;
    match command {
        StartupCommands::Enable => {
            autostart
                .enable()
                .with_context(|| failure("enable", &autostart))?;
            println!(
                "focusvol will start at login ({} daemon).",
                autostart.exe().display()
            );
        }
        StartupCommands::Disable => {
            autostart
                .disable()
                .with_context(|| failure("disable", &autostart))?;
            println!("focusvol will no longer start at login.");
        }
        StartupCommands::Status => {
            let enabled = autostart.is_enabled()?;
            println!("Start at login: {}", state_label(enabled));
        }
    }
    Ok(())
}

/// Error context naming the state the entry was actually left in.
fn failure(action: &str, autostart: &Autostart) -> String {
    match autostart.is_enabled() {
        Ok(enabled) => format!(
            "failed to {action} start at login (currently {})",
            state_label(enabled)
        ),
        Err(_) => format!("failed to {action} start at login"),
    }
}

fn state_label(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_names_current_state() {
        let dir = tempfile::tempdir().unwrap();
        let autostart = Autostart::new(dir.path().join("gone"));
        let msg = failure("enable", &autostart);
        assert!(msg.starts_with("failed to enable start at login"), "{msg}");
    }
}
