use anyhow::Result;
use focusvol_core::ipc::{IpcRequest, IpcResponse, MonitorStatus};

use super::{percent, request};

pub async fn run() -> Result<()> {
    match request(IpcRequest::GetStatus).await? {
        IpcResponse::Status {
            pulse_connected,
            monitor,
        } => {
            print!("{}", render(pulse_connected, monitor.as_ref()));
            Ok(())
        }
        _ => anyhow::bail!("unexpected response"),
    }
}

fn render(pulse_connected: bool, monitor: Option<&MonitorStatus>) -> String {
    let mut out = format!(
        "PulseAudio: {}\n",
        if pulse_connected {
            "connected"
        } else {
            "disconnected"
        }
    );
    match monitor {
        Some(m) => {
            out.push_str(&format!("Monitoring: {}\n", m.target));
            out.push_str(&format!("  state:     {}\n", m.state));
            out.push_str(&format!("  focused:   {}\n", percent(m.focused_volume)));
            out.push_str(&format!("  unfocused: {}\n", percent(m.unfocused_volume)));
        }
        None => out.push_str("Monitoring: stopped\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusvol_core::audio::Volume;
    use focusvol_core::monitor::FocusState;

    #[test]
    fn render_running_monitor() {
        let status = MonitorStatus {
            target: "firefox".into(),
            state: FocusState::Focused,
            focused_volume: Volume::new(0.9),
            unfocused_volume: Volume::new(0.1),
        };
        assert_eq!(
            render(true, Some(&status)),
            "PulseAudio: connected\n\
             Monitoring: firefox\n  state:     focused\n  focused:   90%\n  unfocused: 10%\n"
        );
    }

    #[test]
    fn render_stopped() {
        assert_eq!(
            render(false, None),
            "PulseAudio: disconnected\nMonitoring: stopped\n"
        );
    }
}
