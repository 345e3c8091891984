use anyhow::Result;
use focusvol_core::ipc::{IpcRequest, IpcResponse};

use super::request;

pub async fn run(refresh: bool) -> Result<()> {
    match request(IpcRequest::ListApps { refresh }).await? {
        IpcResponse::Apps { apps } => {
            if apps.is_empty() {
                println!("No windowed applications found.");
            }
            for app in &apps {
                println!("{app}");
            }
            Ok(())
        }
        _ => anyhow::bail!("unexpected response"),
    }
}
