use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use focusvol_core::monitor::FocusSampler;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DBUS_SERVICE: &str = "io.focusvol.WindowTracker";
const DBUS_PATH: &str = "/io/focusvol/WindowTracker";
const DBUS_IFACE: &str = "io.focusvol.WindowTracker";
const KWIN_SCRIPT_NAME: &str = "focusvol";

/// Senders fed by the KWin script.
pub struct WindowFeed {
    /// PID of the window holding focus; `None` when nothing is focused.
    pub active_tx: watch::Sender<Option<u32>>,
    /// PIDs owning normal, titled windows.
    pub windows_tx: watch::Sender<Vec<u32>>,
}

/// D-Bus interface that receives window updates from the KWin script.
struct WindowTrackerReceiver {
    feed: WindowFeed,
}

#[zbus::interface(name = "io.focusvol.WindowTracker")]
impl WindowTrackerReceiver {
    fn activated(&self, pid: i32) {
        let pid = u32::try_from(pid).ok().filter(|&p| p > 0);
        debug!("KWin script reported active window pid {pid:?}");
        let _ = self.feed.active_tx.send(pid);
    }

    fn windows(&self, pids: &str) {
        let pids = parse_pid_list(pids);
        debug!("KWin script reported {} window(s)", pids.len());
        let _ = self.feed.windows_tx.send(pids);
    }
}

/// Parse the comma-separated PID list sent by the script. Garbage entries
/// and non-positive PIDs are skipped.
fn parse_pid_list(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<u32>().ok())
        .filter(|&p| p > 0)
        .collect()
}

/// Generates the KWin script content. Pushes the active window PID on every
/// activation (0 for desktop or panel focus) and the PID list of normal
/// titled windows whenever the window set changes.
fn kwin_script_content() -> String {
    format!(
        r#"function sendActive(window) {{
    callDBus("{DBUS_SERVICE}", "{DBUS_PATH}", "{DBUS_IFACE}", "Activated",
        (window && window.pid) || 0);
}}
function sendWindows() {{
    var pids = [];
    var windows = workspace.windowList();
    for (var i = 0; i < windows.length; i++) {{
        var w = windows[i];
        if (w.normalWindow && !w.skipTaskbar && w.caption && w.pid > 0) {{
            pids.push(w.pid);
        }}
    }}
    callDBus("{DBUS_SERVICE}", "{DBUS_PATH}", "{DBUS_IFACE}", "Windows", pids.join(","));
}}
workspace.windowActivated.connect(function (window) {{
    sendActive(window);
    sendWindows();
}});
workspace.windowAdded.connect(sendWindows);
workspace.windowRemoved.connect(sendWindows);
sendActive(workspace.activeWindow);
sendWindows();
"#
    )
}

/// Tracks KDE Plasma windows by loading a KWin script that pushes updates
/// via D-Bus.
///
/// 1. Registers `io.focusvol.WindowTracker` on the session bus
/// 2. Writes the script to `$XDG_RUNTIME_DIR/focusvol-kwin.js`
/// 3. Loads it via `org.kde.kwin.Scripting`
///
/// If any step fails this logs a warning and waits for cancellation; the
/// sampler then reports no focused window and an empty picker.
pub async fn run(feed: WindowFeed, cancel: CancellationToken) {
    // The script fires immediately on load, so the service must exist first.
    let conn = match setup_dbus_service(feed).await {
        Ok(c) => c,
        Err(e) => {
            warn!("failed to register D-Bus service for window tracking: {e}");
            cancel.cancelled().await;
            return;
        }
    };

    let script_path = match write_kwin_script() {
        Ok(p) => p,
        Err(e) => {
            warn!("failed to write KWin script (window tracking disabled): {e}");
            cancel.cancelled().await;
            return;
        }
    };

    // KWin may not be up yet at login.
    let mut loaded = false;
    for attempt in 1..=5u64 {
        match load_kwin_script(&conn, &script_path).await {
            Ok(()) => {
                loaded = true;
                break;
            }
            Err(e) if attempt < 5 => {
                warn!("KWin script load failed (attempt {attempt}/5): {e}");
                tokio::time::sleep(Duration::from_millis(500 * attempt)).await;
            }
            Err(e) => {
                warn!("KWin script load failed after {attempt} attempts (window tracking disabled): {e}");
            }
        }
    }
    if !loaded {
        let _ = std::fs::remove_file(&script_path);
        cancel.cancelled().await;
        return;
    }

    info!("KWin window tracking active");
    cancel.cancelled().await;

    if let Err(e) = unload_kwin_script(&conn).await {
        debug!("failed to unload KWin script on shutdown: {e}");
    }
    let _ = std::fs::remove_file(&script_path);
}

async fn setup_dbus_service(feed: WindowFeed) -> Result<zbus::Connection, zbus::Error> {
    let receiver = WindowTrackerReceiver { feed };

    zbus::connection::Builder::session()?
        .name(DBUS_SERVICE)?
        .serve_at(DBUS_PATH, receiver)?
        .build()
        .await
}

fn write_kwin_script() -> Result<PathBuf, std::io::Error> {
    let path = focusvol_core::ipc::xdg_runtime_dir().join("focusvol-kwin.js");
    std::fs::write(&path, kwin_script_content())?;
    Ok(path)
}

async fn load_kwin_script(conn: &zbus::Connection, script_path: &Path) -> Result<(), zbus::Error> {
    // A previous run killed with SIGKILL may have left its script loaded.
    let _ = unload_kwin_script(conn).await;

    let path_str = script_path.to_str().unwrap_or_default();
    let reply = conn
        .call_method(
            Some("org.kde.KWin"),
            "/Scripting",
            Some("org.kde.kwin.Scripting"),
            "loadScript",
            &(path_str, KWIN_SCRIPT_NAME),
        )
        .await?;

    let script_id: i32 = reply.body().deserialize()?;
    debug!("loaded KWin script '{KWIN_SCRIPT_NAME}' with id {script_id}");

    conn.call_method(
        Some("org.kde.KWin"),
        "/Scripting",
        Some("org.kde.kwin.Scripting"),
        "start",
        &(),
    )
    .await?;
    Ok(())
}

async fn unload_kwin_script(conn: &zbus::Connection) -> Result<(), zbus::Error> {
    conn.call_method(
        Some("org.kde.KWin"),
        "/Scripting",
        Some("org.kde.kwin.Scripting"),
        "unloadScript",
        &(KWIN_SCRIPT_NAME,),
    )
    .await?;
    debug!("unloaded KWin script '{KWIN_SCRIPT_NAME}'");
    Ok(())
}

/// Executable name (no path) of `pid`, read from a procfs root.
///
/// Prefers the `exe` link since `comm` is truncated to 15 bytes; falls back
/// to `comm` for processes whose `exe` is unreadable. An exited process
/// yields `None`.
fn process_name(proc_root: &Path, pid: u32) -> Option<String> {
    let dir = proc_root.join(pid.to_string());

    if let Ok(exe) = std::fs::read_link(dir.join("exe")) {
        if let Some(name) = exe.file_name().and_then(|n| n.to_str()) {
            let name = name.strip_suffix(" (deleted)").unwrap_or(name);
            if !name.is_empty() {
                return Some(name.to_owned());
            }
        }
    }

    let comm = std::fs::read_to_string(dir.join("comm")).ok()?;
    let comm = comm.trim();
    (!comm.is_empty()).then(|| comm.to_owned())
}

/// Distinct, sorted process names for a set of window PIDs.
fn owner_names(proc_root: &Path, pids: &[u32]) -> Vec<String> {
    pids.iter()
        .filter_map(|&pid| process_name(proc_root, pid))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Focus sampler over the KWin feed. PIDs are resolved at query time.
pub struct KwinFocusSampler {
    active_rx: watch::Receiver<Option<u32>>,
    windows_rx: watch::Receiver<Vec<u32>>,
    proc_root: PathBuf,
}

impl KwinFocusSampler {
    pub fn new(
        active_rx: watch::Receiver<Option<u32>>,
        windows_rx: watch::Receiver<Vec<u32>>,
    ) -> Self {
        KwinFocusSampler {
            active_rx,
            windows_rx,
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl FocusSampler for KwinFocusSampler {
    fn current_focused_process(&self) -> Option<String> {
        let pid = (*self.active_rx.borrow())?;
        process_name(&self.proc_root, pid)
    }

    fn list_visible_owner_processes(&self) -> Vec<String> {
        let pids = self.windows_rx.borrow().clone();
        owner_names(&self.proc_root, &pids)
    }
}
