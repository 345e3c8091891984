use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use focusvol_core::audio::{process_matches, SessionInfo, Volume};
use focusvol_core::monitor::VolumeActuator;
use libpulse_binding as pulse;
use libpulse_binding::callbacks::ListResult;
use libpulse_binding::context::introspect::SinkInputInfo;
use libpulse_binding::context::{Context, FlagSet as CtxFlagSet, State as CtxState};
use libpulse_binding::mainloop::threaded::Mainloop;
use libpulse_binding::proplist::Proplist;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Commands from the engine and the monitor thread to the PA thread.
#[derive(Debug)]
pub enum AudioCommand {
    /// Set the volume of the first sink-input whose process binary contains
    /// `name` and reply whether one matched.
    SetAppVolume {
        name: String,
        volume: Volume,
        /// Requests still queued after this instant are dropped unanswered.
        deadline: Instant,
        reply: std_mpsc::SyncSender<bool>,
    },
    ListSessions {
        reply: oneshot::Sender<Vec<SessionInfo>>,
    },
}

/// Notifications from the PA thread to the engine.
#[derive(Debug)]
pub enum AudioNotification {
    Connected,
    Disconnected,
}

/// Main PulseAudio thread function.
///
/// Runs the PA threaded mainloop and serves commands until cancelled,
/// reconnecting with backoff when the server goes away.
pub fn run(
    mut cmd_rx: mpsc::Receiver<AudioCommand>,
    notify_tx: mpsc::Sender<AudioNotification>,
    cancel: CancellationToken,
) {
    let mut retry_delay_ms: u64 = 1000;
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let session_start = Instant::now();
        match run_session(&mut cmd_rx, &notify_tx, &cancel) {
            Ok(()) => break,
            Err(e) => {
                warn!("PulseAudio session ended: {e}");
                let _ = notify_tx.blocking_send(AudioNotification::Disconnected);
                if cancel.is_cancelled() {
                    return;
                }
                // Requests queued while disconnected are stale by now.
                while cmd_rx.try_recv().is_ok() {}
                if session_start.elapsed() > Duration::from_secs(30) {
                    retry_delay_ms = 1000;
                }
                std::thread::sleep(Duration::from_millis(retry_delay_ms));
                retry_delay_ms = (retry_delay_ms * 2).min(4000);
            }
        }
    }

    info!("PulseAudio thread exiting");
}

fn run_session(
    cmd_rx: &mut mpsc::Receiver<AudioCommand>,
    notify_tx: &mpsc::Sender<AudioNotification>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    // Rc<RefCell> is fine: this whole function runs on one std::thread and
    // introspection callbacks run on the mainloop thread with the lock held.
    let mainloop =
        Rc::new(RefCell::new(Mainloop::new().ok_or_else(|| {
            anyhow::anyhow!("failed to create PA mainloop")
        })?));

    let mut proplist =
        Proplist::new().ok_or_else(|| anyhow::anyhow!("failed to create PA proplist"))?;
    proplist
        .set_str(pulse::proplist::properties::APPLICATION_NAME, "focusvol")
        .map_err(|_| anyhow::anyhow!("failed to set proplist"))?;

    let context = Rc::new(RefCell::new(
        Context::new_with_proplist(&*mainloop.borrow(), "focusvol", &proplist)
            .ok_or_else(|| anyhow::anyhow!("failed to create PA context"))?,
    ));

    context
        .borrow_mut()
        .connect(None, CtxFlagSet::NOFLAGS, None)
        .map_err(|e| anyhow::anyhow!("PA connect failed: {e}"))?;

    mainloop
        .borrow_mut()
        .start()
        .map_err(|e| anyhow::anyhow!("PA mainloop start failed: {e}"))?;

    // Must hold the mainloop lock when accessing the context from our thread.
    loop {
        if cancel.is_cancelled() {
            mainloop.borrow_mut().stop();
            return Ok(());
        }

        mainloop.borrow_mut().lock();
        let state = context.borrow().get_state();
        mainloop.borrow_mut().unlock();

        match state {
            CtxState::Ready => break,
            CtxState::Failed | CtxState::Terminated => {
                mainloop.borrow_mut().stop();
                return Err(anyhow::anyhow!("PA context failed to connect"));
            }
            _ => std::thread::sleep(Duration::from_millis(50)),
        }
    }

    info!("PulseAudio connected");
    let _ = notify_tx.blocking_send(AudioNotification::Connected);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        mainloop.borrow_mut().lock();

        let state = context.borrow().get_state();
        if state != CtxState::Ready {
            mainloop.borrow_mut().unlock();
            mainloop.borrow_mut().stop();
            return Err(anyhow::anyhow!("PA context disconnected"));
        }

        let mut had_work = false;
        while let Ok(cmd) = cmd_rx.try_recv() {
            execute_command(&context, cmd);
            had_work = true;
        }

        mainloop.borrow_mut().unlock();

        // Lock is not held while sleeping.
        let sleep_ms = if had_work { 5 } else { 20 };
        std::thread::sleep(Duration::from_millis(sleep_ms));
    }

    mainloop.borrow_mut().lock();
    context.borrow_mut().disconnect();
    mainloop.borrow_mut().unlock();
    mainloop.borrow_mut().stop();
    Ok(())
}

/// Owning process name of a sink-input, as PulseAudio reports it.
fn sink_input_process(info: &SinkInputInfo<'_>) -> Option<String> {
    info.proplist.get_str("application.process.binary")
}

fn session_from_info(info: &SinkInputInfo<'_>) -> SessionInfo {
    let name = info
        .name
        .as_ref()
        .map(|s| s.to_string())
        .or_else(|| info.proplist.get_str("application.name"))
        .unwrap_or_default();
    SessionInfo {
        index: info.index,
        name,
        process: sink_input_process(info),
        pid: info
            .proplist
            .get_str("application.process.id")
            .and_then(|s| s.parse::<u32>().ok()),
        volume: Volume::new(pulse::volume::VolumeLinear::from(info.volume.avg()).0),
        muted: info.mute,
    }
}

/// Execute a PA command. Caller must hold the mainloop lock.
///
/// Every request walks the server's current sink-input list; nothing is
/// remembered between requests.
fn execute_command(context: &Rc<RefCell<Context>>, cmd: AudioCommand) {
    let introspect = context.borrow().introspect();

    match cmd {
        AudioCommand::SetAppVolume {
            name,
            volume,
            deadline,
            reply,
        } => {
            if Instant::now() > deadline {
                debug!("dropping expired volume request for '{name}'");
                return;
            }
            let mut setter = context.borrow().introspect();
            // (index, process binary, channel count) of every sink-input.
            let mut seen: Vec<(u32, Option<String>, u8)> = Vec::new();
            let mut reply = Some(reply);
            introspect.get_sink_input_info_list(move |result| match result {
                ListResult::Item(info) => {
                    seen.push((info.index, sink_input_process(info), info.volume.len()));
                }
                ListResult::End => {
                    let index = first_matching_session(
                        seen.iter().map(|(index, process, _)| (*index, process.as_deref())),
                        &name,
                    );
                    if let Some((index, _, channels)) =
                        index.and_then(|i| seen.iter().find(|(idx, _, _)| *idx == i))
                    {
                        let cv = make_channel_volumes(volume, *channels);
                        setter.set_sink_input_volume(*index, &cv, None);
                    }
                    if let Some(tx) = reply.take() {
                        let _ = tx.try_send(index.is_some());
                    }
                }
                ListResult::Error => {
                    if let Some(tx) = reply.take() {
                        let _ = tx.try_send(false);
                    }
                }
            });
        }
        AudioCommand::ListSessions { reply } => {
            let mut sessions = Vec::new();
            let mut reply = Some(reply);
            introspect.get_sink_input_info_list(move |result| match result {
                ListResult::Item(info) => sessions.push(session_from_info(info)),
                ListResult::End | ListResult::Error => {
                    if let Some(tx) = reply.take() {
                        let _ = tx.send(std::mem::take(&mut sessions));
                    }
                }
            });
        }
    }
}

/// Index of the first session whose process binary contains `target`
/// (case-insensitive). Sessions without a binary never match.
fn first_matching_session<'a>(
    sessions: impl IntoIterator<Item = (u32, Option<&'a str>)>,
    target: &str,
) -> Option<u32> {
    sessions
        .into_iter()
        .find(|(_, process)| process.is_some_and(|p| process_matches(p, target)))
        .map(|(index, _)| index)
}

fn make_channel_volumes(volume: Volume, channels: u8) -> pulse::volume::ChannelVolumes {
    let pa_vol = pulse::volume::Volume::from(pulse::volume::VolumeLinear(volume.get()));
    let mut cv = pulse::volume::ChannelVolumes::default();
    cv.set(channels.max(1), pa_vol);
    cv
}

/// Volume actuator backed by the PA thread.
///
/// Called from the monitor thread. Each call is one request/reply round
/// trip bounded by `timeout`; a full queue, a closed PA thread, or a late
/// reply all count as "no session matched".
pub struct PulseActuator {
    cmd_tx: mpsc::Sender<AudioCommand>,
    timeout: Duration,
}

impl PulseActuator {
    pub fn new(cmd_tx: mpsc::Sender<AudioCommand>, timeout: Duration) -> Self {
        PulseActuator { cmd_tx, timeout }
    }
}

impl VolumeActuator for PulseActuator {
    fn set_volume(&self, name_substring: &str, level: Volume) -> bool {
        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        let cmd = AudioCommand::SetAppVolume {
            name: name_substring.to_owned(),
            volume: level,
            deadline: Instant::now() + self.timeout,
            reply: reply_tx,
        };
        if let Err(e) = self.cmd_tx.try_send(cmd) {
            debug!("volume request not queued: {e}");
            return false;
        }
        reply_rx.recv_timeout(self.timeout).unwrap_or(false)
    }
}
