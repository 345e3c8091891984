use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use focusvol_core::config::Config;
use focusvol_core::ipc::{IpcRequest, IpcResponse, MonitorStatus};
use focusvol_core::monitor::{check_level, FocusSampler, LevelKind, Monitor, MonitorConfig};
use focusvol_core::settings::{SavedLevels, SettingsStore};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::monitor_thread::{self, MonitorHandle};
use crate::pulse::{AudioCommand, AudioNotification, PulseActuator};
use crate::tray::TrayAction;

/// How long `sessions` waits for the PA thread.
const SESSION_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// An IPC request bundled with its reply channel.
pub struct IpcMessage {
    pub request: IpcRequest,
    pub reply_tx: oneshot::Sender<IpcResponse>,
}

/// All channel endpoints consumed by the engine.
pub struct EngineChannels {
    pub audio_cmd_tx: mpsc::Sender<AudioCommand>,
    pub audio_notify_rx: mpsc::Receiver<AudioNotification>,
    pub ipc_request_rx: mpsc::Receiver<IpcMessage>,
    pub tray_action_rx: mpsc::Receiver<TrayAction>,
    pub config_reload_rx: mpsc::Receiver<()>,
    /// Monitored target, mirrored into the tray.
    pub target_tx: watch::Sender<Option<String>>,
}

/// Mutable state owned by the engine loop.
struct EngineState {
    config: Config,
    config_path: PathBuf,
    settings: SettingsStore,
    sampler: Arc<dyn FocusSampler>,
    audio_cmd_tx: mpsc::Sender<AudioCommand>,
    target_tx: watch::Sender<Option<String>>,
    monitor: Option<MonitorHandle>,
    /// Cached picker list, refreshed on a timer or on demand.
    apps: Vec<String>,
    pulse_connected: bool,
}

impl EngineState {
    fn refresh_apps(&mut self) {
        self.apps = self.sampler.list_visible_owner_processes();
        debug!("picker refreshed: {} application(s)", self.apps.len());
    }

    /// Stop the running monitor, if any, waiting for its volume reset.
    async fn stop_monitor(&mut self) -> bool {
        let Some(handle) = self.monitor.take() else {
            return false;
        };
        handle.stop().await;
        self.target_tx.send_replace(None);
        true
    }

    /// Levels for `start`/`save` when the caller omitted them.
    fn saved_or_default_levels(&self, app: &str) -> (f64, f64) {
        match self.settings.load(app) {
            Ok(Some(levels)) => levels,
            Ok(None) => self.default_levels(),
            Err(e) => {
                warn!("failed to read saved settings, using defaults: {e}");
                self.default_levels()
            }
        }
    }

    fn default_levels(&self) -> (f64, f64) {
        (
            self.config.defaults.focused_volume,
            self.config.defaults.unfocused_volume,
        )
    }

    fn monitor_status(&self) -> Option<MonitorStatus> {
        self.monitor.as_ref().map(|m| {
            let (focused_volume, unfocused_volume) = m.levels().snapshot();
            MonitorStatus {
                target: m.target().to_owned(),
                state: m.state(),
                focused_volume,
                unfocused_volume,
            }
        })
    }
}

fn picker_interval(config: &Config) -> Interval {
    let mut interval = tokio::time::interval(config.picker_refresh_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn error(message: impl Into<String>) -> IpcResponse {
    IpcResponse::Error {
        message: message.into(),
    }
}

/// Central engine loop.
///
/// On exit an active monitor is stopped, including its reset to full
/// volume, before this returns; the audio backend must still be running.
pub async fn run(
    config: Config,
    config_path: PathBuf,
    settings: SettingsStore,
    sampler: Arc<dyn FocusSampler>,
    channels: EngineChannels,
    cancel: CancellationToken,
) {
    let EngineChannels {
        audio_cmd_tx,
        mut audio_notify_rx,
        mut ipc_request_rx,
        mut tray_action_rx,
        mut config_reload_rx,
        target_tx,
    } = channels;

    let mut picker_timer = picker_interval(&config);
    let mut state = EngineState {
        config,
        config_path,
        settings,
        sampler,
        audio_cmd_tx,
        target_tx,
        monitor: None,
        apps: Vec::new(),
        pulse_connected: false,
    };

    info!("engine started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("engine received shutdown signal");
                break;
            }

            _ = picker_timer.tick() => state.refresh_apps(),

            Some(notification) = audio_notify_rx.recv() => {
                match notification {
                    AudioNotification::Connected => {
                        state.pulse_connected = true;
                        info!("PulseAudio connected");
                    }
                    AudioNotification::Disconnected => {
                        state.pulse_connected = false;
                        warn!("PulseAudio disconnected");
                    }
                }
            }

            Some(msg) = ipc_request_rx.recv() => {
                let response = handle_ipc_request(msg.request, &mut state, &cancel).await;
                // Client may have disconnected; reply is best-effort.
                let _ = msg.reply_tx.send(response);
            }

            Some(action) = tray_action_rx.recv() => {
                match action {
                    TrayAction::StopMonitoring => {
                        info!("stop requested from tray");
                        state.stop_monitor().await;
                    }
                    TrayAction::Quit => {
                        info!("quit requested from tray");
                        cancel.cancel();
                        break;
                    }
                }
            }

            Some(()) = config_reload_rx.recv() => {
                info!("config reload triggered");
                match Config::load(&state.config_path) {
                    Ok(new_config) => {
                        if new_config.picker != state.config.picker {
                            picker_timer = picker_interval(&new_config);
                        }
                        state.config = new_config;
                        info!("config reloaded; changes apply to the next start");
                        match state.config.to_toml() {
                            Ok(toml) => debug!("active config:\n{toml}"),
                            Err(e) => warn!("failed to serialize config for logging: {e}"),
                        }
                    }
                    Err(e) => {
                        warn!("config reload failed (keeping previous config): {e}");
                    }
                }
            }
        }
    }

    state.stop_monitor().await;
    info!("engine stopped");
}

async fn handle_ipc_request(
    request: IpcRequest,
    state: &mut EngineState,
    cancel: &CancellationToken,
) -> IpcResponse {
    match request {
        IpcRequest::GetStatus => IpcResponse::Status {
            pulse_connected: state.pulse_connected,
            monitor: state.monitor_status(),
        },
        IpcRequest::ListApps { refresh } => {
            if refresh {
                state.refresh_apps();
            }
            IpcResponse::Apps {
                apps: state.apps.clone(),
            }
        }
        IpcRequest::ListSessions => list_sessions(&state.audio_cmd_tx).await,
        IpcRequest::Start {
            target,
            focused_volume,
            unfocused_volume,
        } => start_monitor(state, &target, focused_volume, unfocused_volume, cancel).await,
        IpcRequest::Stop => {
            if state.stop_monitor().await {
                IpcResponse::Ok
            } else {
                error("not monitoring")
            }
        }
        IpcRequest::SetLevels {
            focused_volume,
            unfocused_volume,
        } => {
            let Some(monitor) = state.monitor.as_ref() else {
                return error("not monitoring");
            };
            let focused = match focused_volume.map(|v| check_level(LevelKind::Focused, v)) {
                Some(Err(e)) => return error(e.to_string()),
                Some(Ok(v)) => Some(v),
                None => None,
            };
            let unfocused = match unfocused_volume.map(|v| check_level(LevelKind::Unfocused, v)) {
                Some(Err(e)) => return error(e.to_string()),
                Some(Ok(v)) => Some(v),
                None => None,
            };
            let levels = monitor.levels();
            if let Some(v) = focused {
                levels.set_focused(v);
            }
            if let Some(v) = unfocused {
                levels.set_unfocused(v);
            }
            let (focused_volume, unfocused_volume) = levels.snapshot();
            info!(
                "levels for '{}' set to {:.2} / {:.2}",
                monitor.target(),
                focused_volume.get(),
                unfocused_volume.get()
            );
            IpcResponse::Levels {
                target: monitor.target().to_owned(),
                focused_volume,
                unfocused_volume,
            }
        }
        IpcRequest::SaveSettings {
            app,
            focused_volume,
            unfocused_volume,
        } => save_settings(state, &app, focused_volume, unfocused_volume),
        IpcRequest::LoadSettings { app } => match state.settings.load(&app) {
            Ok(levels) => IpcResponse::Saved {
                app,
                levels: levels.map(|(volume_in, volume_out)| SavedLevels {
                    volume_in,
                    volume_out,
                }),
            },
            Err(e) => error(e.to_string()),
        },
        IpcRequest::GetConfig => match state.config.to_toml() {
            Ok(toml) => IpcResponse::Config { toml },
            Err(e) => error(format!("failed to serialize config: {e}")),
        },
        IpcRequest::Shutdown => {
            cancel.cancel();
            IpcResponse::Ok
        }
    }
}

async fn start_monitor(
    state: &mut EngineState,
    target: &str,
    focused_volume: Option<f64>,
    unfocused_volume: Option<f64>,
    cancel: &CancellationToken,
) -> IpcResponse {
    let target = target.trim();
    let (saved_focused, saved_unfocused) = if focused_volume.is_none() || unfocused_volume.is_none() {
        state.saved_or_default_levels(target)
    } else {
        state.default_levels()
    };
    let config = match MonitorConfig::new(
        target,
        focused_volume.unwrap_or(saved_focused),
        unfocused_volume.unwrap_or(saved_unfocused),
    ) {
        Ok(config) => config,
        Err(e) => return error(e.to_string()),
    };

    // Restarting moves the previous target back to full volume first.
    if state.stop_monitor().await {
        debug!("previous monitor stopped before restart");
    }

    let actuator = Arc::new(PulseActuator::new(
        state.audio_cmd_tx.clone(),
        state.config.actuation_timeout(),
    ));
    let focused = config.focused_volume();
    let unfocused = config.unfocused_volume();
    let monitor = Monitor::new(
        config,
        state.config.monitor.reassert,
        Arc::clone(&state.sampler),
        actuator,
    );

    match monitor_thread::spawn(monitor, state.config.poll_interval(), cancel) {
        Ok(handle) => {
            let target = handle.target().to_owned();
            state.target_tx.send_replace(Some(target.clone()));
            state.monitor = Some(handle);
            IpcResponse::Levels {
                target,
                focused_volume: focused,
                unfocused_volume: unfocused,
            }
        }
        Err(e) => error(format!("{e:#}")),
    }
}

fn save_settings(
    state: &EngineState,
    app: &str,
    focused_volume: Option<f64>,
    unfocused_volume: Option<f64>,
) -> IpcResponse {
    let app = app.trim();
    let (live_focused, live_unfocused) = match state.monitor.as_ref() {
        Some(m) => {
            let (f, u) = m.levels().snapshot();
            (f.get(), u.get())
        }
        None => state.default_levels(),
    };

    let focused = match check_level(LevelKind::Focused, focused_volume.unwrap_or(live_focused)) {
        Ok(v) => v.get(),
        Err(e) => return error(e.to_string()),
    };
    let unfocused =
        match check_level(LevelKind::Unfocused, unfocused_volume.unwrap_or(live_unfocused)) {
            Ok(v) => v.get(),
            Err(e) => return error(e.to_string()),
        };

    match state.settings.save(app, focused, unfocused) {
        Ok(()) => {
            info!("saved settings for '{app}': {focused:.2} / {unfocused:.2}");
            IpcResponse::Saved {
                app: app.to_owned(),
                levels: Some(SavedLevels {
                    volume_in: focused,
                    volume_out: unfocused,
                }),
            }
        }
        Err(e) => {
            warn!("failed to save settings: {e}");
            error(e.to_string())
        }
    }
}

async fn list_sessions(audio_cmd_tx: &mpsc::Sender<AudioCommand>) -> IpcResponse {
    let (reply, reply_rx) = oneshot::channel();
    if audio_cmd_tx
        .send(AudioCommand::ListSessions { reply })
        .await
        .is_err()
    {
        return error("audio backend is not running");
    }
    match tokio::time::timeout(SESSION_QUERY_TIMEOUT, reply_rx).await {
        Ok(Ok(sessions)) => IpcResponse::Sessions { sessions },
        Ok(Err(_)) | Err(_) => error("audio server did not answer (is PulseAudio running?)"),
    }
}
