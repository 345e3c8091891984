use std::path::PathBuf;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Editors often write a file in several steps; wait this long after the
/// first event before reloading.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// True for create/modify events touching `config_filename`.
fn is_config_write(event: &Event, config_filename: &str) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name().and_then(|f| f.to_str()) == Some(config_filename))
}

/// Watch the config directory (not the file, to survive editor renames) and
/// send one reload request per burst of writes.
pub async fn run(
    config_dir: PathBuf,
    config_filename: String,
    reload_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    let (tx, mut rx) = mpsc::channel(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if is_config_write(&event, &config_filename) {
                    // Full channel means a reload is already pending.
                    let _ = tx.try_send(());
                }
            }
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("failed to create config file watcher: {e}");
            return;
        }
    };

    if let Err(e) = watcher.watch(&config_dir, RecursiveMode::NonRecursive) {
        error!(
            "failed to watch config directory {}: {e}",
            config_dir.display()
        );
        return;
    }

    info!("watching config directory: {}", config_dir.display());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(()) = rx.recv() => {
                tokio::time::sleep(DEBOUNCE).await;
                while rx.try_recv().is_ok() {}

                debug!("config file changed, triggering reload");
                // Engine may have shut down already.
                let _ = reload_tx.send(()).await;
            }
        }
    }

    drop(watcher);
}
