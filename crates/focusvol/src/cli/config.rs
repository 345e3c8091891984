use anyhow::Result;
use focusvol_core::config::Config;
use focusvol_core::ipc::{IpcRequest, IpcResponse};

use super::request;
use crate::ConfigCommands;

pub async fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => match request(IpcRequest::GetConfig).await? {
            IpcResponse::Config { toml } => print!("{toml}"),
            _ => anyhow::bail!("unexpected response"),
        },
        ConfigCommands::Dir => {
            let dir = Config::default_dir()
                .ok_or_else(|| anyhow::anyhow!("failed to resolve XDG config directory"))?;
            println!("{}", dir.display());
        }
    }
    Ok(())
}
