use anyhow::Result;
use focusvol_core::ipc::{IpcRequest, IpcResponse};

use super::{percent, request};

pub async fn run_start(app: String, focused: Option<f64>, unfocused: Option<f64>) -> Result<()> {
    let resp = request(IpcRequest::Start {
        target: app,
        focused_volume: focused,
        unfocused_volume: unfocused,
    })
    .await?;
    print_levels("Monitoring", resp)
}

pub async fn run_stop() -> Result<()> {
    request(IpcRequest::Stop).await?;
    println!("Monitoring stopped; volume restored to 100%.");
    Ok(())
}

/// Adjust the running monitor's levels. With no flags, print them.
pub async fn run_levels(focused: Option<f64>, unfocused: Option<f64>) -> Result<()> {
    let resp = request(IpcRequest::SetLevels {
        focused_volume: focused,
        unfocused_volume: unfocused,
    })
    .await?;
    print_levels("Levels for", resp)
}

fn print_levels(prefix: &str, resp: IpcResponse) -> Result<()> {
    match resp {
        IpcResponse::Levels {
            target,
            focused_volume,
            unfocused_volume,
        } => {
            println!(
                "{prefix} {target}: focused {}, unfocused {}",
                percent(focused_volume),
                percent(unfocused_volume)
            );
            Ok(())
        }
        _ => anyhow::bail!("unexpected response"),
    }
}
