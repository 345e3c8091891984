use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use focusvol_core::ipc::{self, IpcRequest, IpcResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::IpcMessage;

/// Remove a socket file left behind by a crashed daemon.
///
/// A socket that still accepts connections belongs to a live daemon, which
/// is an error.
pub async fn cleanup_stale_socket(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    if UnixStream::connect(path).await.is_ok() {
        anyhow::bail!(
            "another focusvol daemon is already running (socket {} is active)",
            path.display()
        );
    }

    info!("removing stale socket file: {}", path.display());
    tokio::fs::remove_file(path)
        .await
        .with_context(|| format!("failed to remove stale socket {}", path.display()))
}

/// Bind the IPC socket with owner-only permissions.
pub fn bind(socket_path: &Path) -> Result<UnixListener> {
    // umask is process-global; this runs at startup before other threads
    // create files.
    let old_umask = unsafe { libc::umask(0o077) };
    let listener = UnixListener::bind(socket_path);
    unsafe { libc::umask(old_umask) };

    listener.with_context(|| format!("failed to bind IPC socket at {}", socket_path.display()))
}

/// Serve IPC clients until cancelled, forwarding each request to the engine.
pub async fn run(
    listener: UnixListener,
    socket_path: PathBuf,
    request_tx: mpsc::Sender<IpcMessage>,
    cancel: CancellationToken,
) {
    info!("IPC server listening on {}", socket_path.display());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, _addr)) => {
                    let tx = request_tx.clone();
                    let client_cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, tx, client_cancel).await {
                            debug!("IPC client error: {e}");
                        }
                    });
                }
                Err(e) => warn!("failed to accept IPC connection: {e}"),
            },
        }
    }

    let _ = tokio::fs::remove_file(&socket_path).await;
    info!("IPC server stopped");
}

async fn handle_client(
    mut stream: UnixStream,
    request_tx: mpsc::Sender<IpcMessage>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = read_request(&mut stream) => match result {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(e) => {
                    debug!("IPC read error: {e}");
                    let resp = IpcResponse::Error {
                        message: format!("{e:#}"),
                    };
                    return write_response(&mut stream, &resp).await;
                }
            },
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if request_tx
            .send(IpcMessage { request, reply_tx })
            .await
            .is_err()
        {
            return Ok(());
        }

        let response = reply_rx.await.unwrap_or_else(|_| IpcResponse::Error {
            message: "daemon shutting down".into(),
        });
        write_response(&mut stream, &response).await?;
    }
}

async fn read_request(stream: &mut UnixStream) -> Result<Option<IpcRequest>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = ipc::read_length_prefix(&len_buf)?;
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;

    let request = serde_json::from_slice(&payload).context("failed to parse IPC request")?;
    Ok(Some(request))
}

async fn write_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<()> {
    let encoded = ipc::encode_response(response)?;
    stream.write_all(&encoded).await?;
    stream.flush().await?;
    Ok(())
}
