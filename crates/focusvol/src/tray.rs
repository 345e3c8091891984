use std::time::Duration;

use ksni::TrayMethods;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Actions from the system tray to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayAction {
    StopMonitoring,
    Quit,
}

struct FocusvolTray {
    action_tx: mpsc::Sender<TrayAction>,
    /// Application being monitored, if any.
    target: Option<String>,
}

impl FocusvolTray {
    fn send(&self, action: TrayAction) {
        // ksni callbacks run on a background thread, outside the runtime.
        let _ = self.action_tx.blocking_send(action);
    }
}

fn tray_title(target: Option<&str>) -> String {
    match target {
        Some(target) => format!("focusvol: {target}"),
        None => "focusvol: idle".into(),
    }
}

impl ksni::Tray for FocusvolTray {
    fn id(&self) -> String {
        "focusvol".into()
    }

    fn title(&self) -> String {
        tray_title(self.target.as_deref())
    }

    fn icon_name(&self) -> String {
        if self.target.is_some() {
            "audio-volume-medium".into()
        } else {
            "audio-volume-high".into()
        }
    }

    fn menu(&self) -> Vec<ksni::MenuItem<Self>> {
        vec![
            ksni::MenuItem::Standard(ksni::menu::StandardItem {
                label: "Stop monitoring".into(),
                enabled: self.target.is_some(),
                activate: Box::new(|tray: &mut Self| tray.send(TrayAction::StopMonitoring)),
                ..Default::default()
            }),
            ksni::MenuItem::Separator,
            ksni::MenuItem::Standard(ksni::menu::StandardItem {
                label: "Quit".into(),
                activate: Box::new(|tray: &mut Self| tray.send(TrayAction::Quit)),
                ..Default::default()
            }),
        ]
    }
}

/// Run the system tray, mirroring the monitored target into its title.
///
/// Uses ksni for SNI (StatusNotifierItem) registration on KDE/Wayland.
pub async fn run(
    action_tx: mpsc::Sender<TrayAction>,
    mut target_rx: watch::Receiver<Option<String>>,
    cancel: CancellationToken,
) {
    // spawn() consumes the tray, so rebuild it on each retry.
    let handle = 'retry: {
        for attempt in 1..=5u64 {
            let tray = FocusvolTray {
                action_tx: action_tx.clone(),
                target: target_rx.borrow_and_update().clone(),
            };
            match tray.spawn().await {
                Ok(handle) => break 'retry handle,
                Err(e) if attempt < 5 => {
                    warn!("tray spawn failed (attempt {attempt}/5): {e}");
                    tokio::time::sleep(Duration::from_millis(500 * attempt)).await;
                }
                Err(e) => {
                    warn!("tray spawn failed after {attempt} attempts: {e}");
                    return;
                }
            }
        }
        return;
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = target_rx.changed() => {
                if changed.is_err() {
                    cancel.cancelled().await;
                    break;
                }
                let target = target_rx.borrow_and_update().clone();
                handle.update(move |tray: &mut FocusvolTray| tray.target = target).await;
            }
        }
    }

    handle.shutdown().await;
}
