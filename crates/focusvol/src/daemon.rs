use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use focusvol_core::config::{self, Config};
use focusvol_core::ipc;
use focusvol_core::settings::SettingsStore;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config_watcher, engine, ipc_server, kwin, pulse, tray};

/// Run the daemon with the given log level.
pub fn run(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("focusvol v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path =
        Config::default_path().context("failed to resolve XDG config directory")?;
    match config::bootstrap_config(&config_path) {
        Ok(true) => info!("created default config at {}", config_path.display()),
        Ok(false) => {}
        Err(e) => warn!("failed to bootstrap config: {e}"),
    }

    let config = Config::load(&config_path).context("failed to load config")?;
    info!("loaded config from {}", config_path.display());
    match config.to_toml() {
        Ok(toml) => info!("active config:\n{toml}"),
        Err(e) => warn!("failed to serialize config for logging: {e}"),
    }

    let settings =
        SettingsStore::at_default_path().context("failed to resolve XDG data directory")?;
    info!("saved settings at {}", settings.path().display());

    let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    let result = rt.block_on(async_main(config, config_path, settings));
    // The PulseAudio and monitor threads use blocking APIs; don't let the
    // runtime drop wait on them forever.
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn wait_for_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
    Ok(())
}

async fn async_main(config: Config, config_path: PathBuf, settings: SettingsStore) -> Result<()> {
    let cancel = CancellationToken::new();
    // Outlives `cancel`: the monitor's final reset needs a live PA thread.
    let audio_cancel = CancellationToken::new();

    let socket_path = ipc::default_socket_path();
    ipc_server::cleanup_stale_socket(&socket_path).await?;
    let listener = ipc_server::bind(&socket_path)?;

    let (audio_cmd_tx, audio_cmd_rx) = mpsc::channel(32);
    let (audio_notify_tx, audio_notify_rx) = mpsc::channel(32);
    let (ipc_request_tx, ipc_request_rx) = mpsc::channel(8);
    let (tray_action_tx, tray_action_rx) = mpsc::channel(4);
    let (config_reload_tx, config_reload_rx) = mpsc::channel(4);
    let (target_tx, target_rx) = watch::channel(None);
    let (active_tx, active_rx) = watch::channel(None);
    let (windows_tx, windows_rx) = watch::channel(Vec::new());

    let pa_cancel = audio_cancel.clone();
    let pa_join = std::thread::Builder::new()
        .name("pulse".into())
        .spawn(move || pulse::run(audio_cmd_rx, audio_notify_tx, pa_cancel))
        .context("failed to spawn PulseAudio thread")?;

    let ipc_handle = tokio::spawn(ipc_server::run(
        listener,
        socket_path.clone(),
        ipc_request_tx,
        cancel.clone(),
    ));

    let tray_handle = tokio::spawn(tray::run(tray_action_tx, target_rx, cancel.clone()));

    let feed = kwin::WindowFeed {
        active_tx,
        windows_tx,
    };
    let kwin_handle = tokio::spawn(kwin::run(feed, cancel.clone()));

    let config_dir = config_path
        .parent()
        .context("config path has no parent directory")?
        .to_owned();
    let config_filename = config_path
        .file_name()
        .and_then(|f| f.to_str())
        .context("config file name is not valid UTF-8")?
        .to_owned();
    tokio::spawn(config_watcher::run(
        config_dir,
        config_filename,
        config_reload_tx,
        cancel.clone(),
    ));

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            warn!("{e:#}; stop the daemon with `focusvol` or the tray instead");
            return;
        }
        signal_cancel.cancel();
    });

    let sampler = Arc::new(kwin::KwinFocusSampler::new(active_rx, windows_rx));
    let channels = engine::EngineChannels {
        audio_cmd_tx,
        audio_notify_rx,
        ipc_request_rx,
        tray_action_rx,
        config_reload_rx,
        target_tx,
    };
    // Returns only after an active monitor has reset its volume.
    engine::run(config, config_path, settings, sampler, channels, cancel.clone()).await;

    info!("engine stopped, shutting down subsystems");
    cancel.cancel();
    audio_cancel.cancel();

    let _ = tokio::time::timeout(Duration::from_millis(500), async {
        let _ = tokio::task::spawn_blocking(move || pa_join.join()).await;
    })
    .await;

    let _ = tokio::time::timeout(Duration::from_millis(500), async {
        let _ = ipc_handle.await;
        let _ = tray_handle.await;
        let _ = kwin_handle.await;
    })
    .await;

    let _ = tokio::fs::remove_file(&socket_path).await;

    info!("shutdown complete");
    Ok(())
}
