use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::{process_matches, Volume};

/// Default tick period of the monitor loop.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("no application selected")]
    EmptyTarget,
    #[error("{which} volume {value} is outside 0.0..=1.0")]
    VolumeOutOfRange { which: LevelKind, value: f64 },
}

/// Which of the two configured levels a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Focused,
    Unfocused,
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKind::Focused => write!(f, "focused"),
            LevelKind::Unfocused => write!(f, "unfocused"),
        }
    }
}

/// Validate a user-supplied level for `which`, rejecting out-of-range input.
pub fn check_level(which: LevelKind, value: f64) -> Result<Volume, MonitorError> {
    Volume::parse_level(value).ok_or(MonitorError::VolumeOutOfRange { which, value })
}

/// Answers "which process owns the focused window?" and "which processes own
/// visible windows?".
///
/// Implementations must not fail: a missing window, a window without a
/// process, or a process that exited mid-query all resolve to `None`.
pub trait FocusSampler: Send + Sync {
    /// Executable name (no path) of the process owning the focused window.
    fn current_focused_process(&self) -> Option<String>;

    /// Distinct, sorted names of processes owning visible titled windows.
    fn list_visible_owner_processes(&self) -> Vec<String>;
}

/// Pushes a volume level to the first active audio session whose owning
/// process name contains `name_substring` (case-insensitive).
///
/// Returns whether a session matched. Implementations re-enumerate sessions
/// on every call; sessions come and go independently of the monitor.
pub trait VolumeActuator: Send + Sync {
    fn set_volume(&self, name_substring: &str, level: Volume) -> bool;
}

/// Committed focus state of the monitored application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusState {
    /// No actuation has succeeded yet in this run, or the monitor is stopped.
    #[default]
    Uninitialized,
    Focused,
    Unfocused,
}

impl fmt::Display for FocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusState::Uninitialized => write!(f, "uninitialized"),
            FocusState::Focused => write!(f, "focused"),
            FocusState::Unfocused => write!(f, "unfocused"),
        }
    }
}

/// Parameters of one monitoring run. Only constructible through
/// [`MonitorConfig::new`], which rejects invalid input.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    target: String,
    focused_volume: Volume,
    unfocused_volume: Volume,
}

impl MonitorConfig {
    /// Validate and build a config. The target is trimmed; levels must lie
    /// in [0.0, 1.0] and are never clamped.
    pub fn new(target: &str, focused: f64, unfocused: f64) -> Result<Self, MonitorError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(MonitorError::EmptyTarget);
        }
        Ok(MonitorConfig {
            target: target.to_owned(),
            focused_volume: check_level(LevelKind::Focused, focused)?,
            unfocused_volume: check_level(LevelKind::Unfocused, unfocused)?,
        })
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn focused_volume(&self) -> Volume {
        self.focused_volume
    }

    #[must_use]
    pub fn unfocused_volume(&self) -> Volume {
        self.unfocused_volume
    }
}

/// The two live levels, shared between the monitor thread and whoever
/// adjusts them while monitoring runs.
///
/// Each scalar is an independent atomic (f64 bits); a reader may observe one
/// updated and the other not yet, which costs at most one tick of staleness.
#[derive(Debug)]
pub struct Levels {
    focused: AtomicU64,
    unfocused: AtomicU64,
}

impl Levels {
    #[must_use]
    pub fn new(focused: Volume, unfocused: Volume) -> Self {
        Levels {
            focused: AtomicU64::new(focused.get().to_bits()),
            unfocused: AtomicU64::new(unfocused.get().to_bits()),
        }
    }

    #[must_use]
    pub fn focused(&self) -> Volume {
        Volume::new(f64::from_bits(self.focused.load(Ordering::Relaxed)))
    }

    #[must_use]
    pub fn unfocused(&self) -> Volume {
        Volume::new(f64::from_bits(self.unfocused.load(Ordering::Relaxed)))
    }

    pub fn set_focused(&self, volume: Volume) {
        self.focused.store(volume.get().to_bits(), Ordering::Relaxed);
    }

    pub fn set_unfocused(&self, volume: Volume) {
        self.unfocused.store(volume.get().to_bits(), Ordering::Relaxed);
    }

    /// Read both levels for one tick.
    #[must_use]
    pub fn snapshot(&self) -> (Volume, Volume) {
        (self.focused(), self.unfocused())
    }
}

/// What a single [`Monitor::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Focus changed and the actuator accepted the new level.
    Transitioned { state: FocusState, level: Volume },
    /// Focus changed but no session matched; state left as it was.
    Pending { wanted: FocusState },
    /// Focus unchanged; the current level was pushed again.
    Reasserted,
    /// Focus unchanged and re-assertion is disabled.
    Idle,
}

/// The focus-to-volume state machine.
///
/// Owns the target, the committed [`FocusState`], and the shared [`Levels`]
/// for the duration of one run.
pub struct Monitor {
    target: String,
    levels: Arc<Levels>,
    state: FocusState,
    /// Transition already reported as pending, to log retries only once.
    pending: Option<FocusState>,
    reassert: bool,
    sampler: Arc<dyn FocusSampler>,
    actuator: Arc<dyn VolumeActuator>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        reassert: bool,
        sampler: Arc<dyn FocusSampler>,
        actuator: Arc<dyn VolumeActuator>,
    ) -> Self {
        Monitor {
            levels: Arc::new(Levels::new(
                config.focused_volume,
                config.unfocused_volume,
            )),
            target: config.target,
            state: FocusState::Uninitialized,
            pending: None,
            reassert,
            sampler,
            actuator,
        }
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn state(&self) -> FocusState {
        self.state
    }

    /// Handle to the live levels; writes are picked up on the next tick.
    #[must_use]
    pub fn levels(&self) -> Arc<Levels> {
        Arc::clone(&self.levels)
    }

    /// Sample focus once and actuate as needed.
    pub fn tick(&mut self) -> Tick {
        let (focused_level, unfocused_level) = self.levels.snapshot();

        let is_focused = self
            .sampler
            .current_focused_process()
            .is_some_and(|name| process_matches(&name, &self.target));

        let (wanted, level) = if is_focused {
            (FocusState::Focused, focused_level)
        } else {
            (FocusState::Unfocused, unfocused_level)
        };

        if wanted != self.state {
            if self.actuator.set_volume(&self.target, level) {
                info!(
                    "[{}] '{}' volume -> {:.2}",
                    wanted.to_string().to_uppercase(),
                    self.target,
                    level.get()
                );
                self.state = wanted;
                self.pending = None;
                Tick::Transitioned {
                    state: wanted,
                    level,
                }
            } else {
                if self.pending != Some(wanted) {
                    debug!(
                        "no audio session for '{}' yet, will retry {wanted} transition",
                        self.target
                    );
                    self.pending = Some(wanted);
                }
                Tick::Pending { wanted }
            }
        } else if self.reassert {
            // Result ignored: a vanished session surfaces as a transition
            // retry once focus changes.
            self.actuator.set_volume(&self.target, level);
            Tick::Reasserted
        } else {
            Tick::Idle
        }
    }

    /// Stop cleanup: restore full volume with one best-effort actuation and
    /// return to [`FocusState::Uninitialized`].
    pub fn finish(&mut self) {
        self.levels.set_focused(Volume::MAX);
        self.levels.set_unfocused(Volume::MAX);
        let matched = self.actuator.set_volume(&self.target, Volume::MAX);
        debug!("reset '{}' to full volume (matched: {matched})", self.target);
        self.state = FocusState::Uninitialized;
        self.pending = None;
        info!("stopped monitoring '{}'", self.target);
    }
}
