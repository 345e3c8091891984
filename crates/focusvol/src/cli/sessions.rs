use anyhow::Result;
use focusvol_core::audio::SessionInfo;
use focusvol_core::ipc::{IpcRequest, IpcResponse};

use super::{percent, request, truncate};

pub async fn run() -> Result<()> {
    match request(IpcRequest::ListSessions).await? {
        IpcResponse::Sessions { sessions } => {
            if sessions.is_empty() {
                println!("No audio sessions active.");
            } else {
                print!("{}", render(&sessions));
            }
            Ok(())
        }
        _ => anyhow::bail!("unexpected response"),
    }
}

fn render(sessions: &[SessionInfo]) -> String {
    let mut out = format!(
        "{:<6} {:<20} {:<30} {:<8} {:<7} {}\n",
        "INDEX", "PROCESS", "NAME", "PID", "VOLUME", "MUTED"
    );
    for s in sessions {
        let pid = s
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<6} {:<20} {:<30} {:<8} {:<7} {}\n",
            s.index,
            truncate(s.process.as_deref().unwrap_or("-"), 19),
            truncate(&s.name, 29),
            pid,
            percent(s.volume),
            if s.muted { "yes" } else { "no" },
        ));
    }
    out
}
