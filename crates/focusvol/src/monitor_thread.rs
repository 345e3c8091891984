use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use focusvol_core::monitor::{FocusState, Levels, Monitor, Tick};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A monitor running on its own OS thread.
///
/// Dropping the handle cancels the thread without waiting for it; use
/// [`MonitorHandle::stop`] to wait for the full-volume cleanup.
pub struct MonitorHandle {
    target: String,
    levels: Arc<Levels>,
    state_rx: watch::Receiver<FocusState>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Live levels; writes are picked up on the next tick.
    pub fn levels(&self) -> &Levels {
        &self.levels
    }

    pub fn state(&self) -> FocusState {
        *self.state_rx.borrow()
    }

    /// Signal the thread and wait until it has reset the volume and exited.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let Some(join) = self.join.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || join.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("monitor thread panicked"),
            Err(e) => warn!("failed to join monitor thread: {e}"),
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start ticking `monitor` every `poll_interval` on a new thread.
///
/// The thread observes `cancel` (a child of `parent`) at the top of each
/// tick, so stopping takes at most one interval plus the final actuation.
pub fn spawn(
    monitor: Monitor,
    poll_interval: Duration,
    parent: &CancellationToken,
) -> Result<MonitorHandle> {
    let cancel = parent.child_token();
    let (state_tx, state_rx) = watch::channel(monitor.state());
    let target = monitor.target().to_owned();
    let levels = monitor.levels();

    let thread_cancel = cancel.clone();
    let join = std::thread::Builder::new()
        .name("monitor".into())
        .spawn(move || run(monitor, poll_interval, state_tx, thread_cancel))
        .context("failed to spawn monitor thread")?;

    info!(
        "monitoring '{target}' every {}ms",
        poll_interval.as_millis()
    );

    Ok(MonitorHandle {
        target,
        levels,
        state_rx,
        cancel,
        join: Some(join),
    })
}

fn run(
    mut monitor: Monitor,
    poll_interval: Duration,
    state_tx: watch::Sender<FocusState>,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        if let Tick::Transitioned { state, .. } = monitor.tick() {
            state_tx.send_replace(state);
        }
        std::thread::sleep(poll_interval);
    }

    monitor.finish();
    state_tx.send_replace(monitor.state());
    debug!("monitor thread exiting");
}
