mod apps;
mod config;
mod monitor;
mod sessions;
mod settings;
mod startup;
mod status;

use std::path::Path;

use anyhow::{Context, Result};
use focusvol_core::audio::Volume;
use focusvol_core::ipc::{self, IpcRequest, IpcResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::Commands;

/// Run a CLI command. Everything except `startup` is one IPC round trip.
pub async fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Status => status::run().await,
        Commands::Apps { refresh } => apps::run(refresh).await,
        Commands::Sessions => sessions::run().await,
        Commands::Start {
            app,
            focused,
            unfocused,
        } => monitor::run_start(app, focused, unfocused).await,
        Commands::Stop => monitor::run_stop().await,
        Commands::Levels { focused, unfocused } => monitor::run_levels(focused, unfocused).await,
        Commands::Save {
            app,
            focused,
            unfocused,
        } => settings::run_save(app, focused, unfocused).await,
        Commands::Load { app } => settings::run_load(app).await,
        Commands::Startup { command } => startup::run(command),
        Commands::Config { command } => config::run(command).await,
        Commands::Daemon { .. } => unreachable!("daemon command handled in main"),
    }
}

fn check_response(resp: IpcResponse) -> Result<IpcResponse> {
    match resp {
        IpcResponse::Error { message } => anyhow::bail!("{message}"),
        other => Ok(other),
    }
}

/// Send `request` to the daemon on the default socket and fail on an
/// error reply.
async fn request(request: IpcRequest) -> Result<IpcResponse> {
    check_response(send_request(&ipc::default_socket_path(), &request).await?)
}

pub(crate) async fn send_request(socket_path: &Path, request: &IpcRequest) -> Result<IpcResponse> {
    let mut stream = UnixStream::connect(socket_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::ConnectionRefused
            || e.kind() == std::io::ErrorKind::NotFound
        {
            anyhow::anyhow!(
                "Could not connect to the focusvol daemon.\n\
                 Is it running? Start it with: focusvol daemon"
            )
        } else {
            anyhow::anyhow!("failed to connect to daemon: {e}")
        }
    })?;

    let encoded = ipc::encode_request(request)?;
    stream.write_all(&encoded).await?;
    stream.flush().await?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = ipc::read_length_prefix(&len_buf)?;

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;

    serde_json::from_slice(&payload).context("failed to parse daemon response")
}

fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        &s[..s.floor_char_boundary(max_len)]
    }
}

/// Render a level the way the CLI prints it, e.g. `10%`.
fn percent(volume: Volume) -> String {
    format!("{:.0}%", volume.get() * 100.0)
}
