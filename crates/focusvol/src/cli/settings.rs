use anyhow::Result;
use focusvol_core::ipc::{IpcRequest, IpcResponse};
use focusvol_core::settings::SavedLevels;

use super::request;

pub async fn run_save(app: String, focused: Option<f64>, unfocused: Option<f64>) -> Result<()> {
    let resp = request(IpcRequest::SaveSettings {
        app,
        focused_volume: focused,
        unfocused_volume: unfocused,
    })
    .await?;
    match resp {
        IpcResponse::Saved {
            app,
            levels: Some(levels),
        } => {
            println!("Saved {}", describe(&app, &levels));
            Ok(())
        }
        _ => anyhow::bail!("unexpected response"),
    }
}

pub async fn run_load(app: String) -> Result<()> {
    match request(IpcRequest::LoadSettings { app }).await? {
        IpcResponse::Saved {
            app,
            levels: Some(levels),
        } => println!("{}", describe(&app, &levels)),
        IpcResponse::Saved { app, levels: None } => println!("No saved settings for {app}."),
        _ => anyhow::bail!("unexpected response"),
    }
    Ok(())
}

fn describe(app: &str, levels: &SavedLevels) -> String {
    format!(
        "{app}: focused {:.2}, unfocused {:.2}",
        levels.volume_in, levels.volume_out
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_prints_both_levels() {
        let levels = SavedLevels {
            volume_in: 0.8,
            volume_out: 0.2,
        };
        assert_eq!(
            describe("App.exe", &levels),
            "App.exe: focused 0.80, unfocused 0.20"
        );
    }
}
