use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{SessionInfo, Volume};
use crate::monitor::FocusState;
use crate::settings::SavedLevels;

/// Maximum IPC message size (1 MB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IPC message too large: {size} bytes (max {MAX_MESSAGE_SIZE})")]
    MessageTooLarge { size: u32 },
    #[error("failed to serialize IPC message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Requests from the focusvol CLI to the daemon.
///
/// Volume fields are raw floats; the daemon validates them and answers with
/// an error instead of clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    GetStatus,
    ListApps {
        #[serde(default)]
        refresh: bool,
    },
    ListSessions,
    Start {
        target: String,
        #[serde(default)]
        focused_volume: Option<f64>,
        #[serde(default)]
        unfocused_volume: Option<f64>,
    },
    Stop,
    SetLevels {
        #[serde(default)]
        focused_volume: Option<f64>,
        #[serde(default)]
        unfocused_volume: Option<f64>,
    },
    SaveSettings {
        app: String,
        #[serde(default)]
        focused_volume: Option<f64>,
        #[serde(default)]
        unfocused_volume: Option<f64>,
    },
    LoadSettings {
        app: String,
    },
    GetConfig,
    Shutdown,
}

/// The running monitor as reported via IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub target: String,
    pub state: FocusState,
    pub focused_volume: Volume,
    pub unfocused_volume: Volume,
}

/// Responses from the daemon to the focusvol CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    Ok,
    Error {
        message: String,
    },
    Status {
        pulse_connected: bool,
        monitor: Option<MonitorStatus>,
    },
    Apps {
        apps: Vec<String>,
    },
    Sessions {
        sessions: Vec<SessionInfo>,
    },
    /// Levels now in effect after `Start` or `SetLevels`.
    Levels {
        target: String,
        focused_volume: Volume,
        unfocused_volume: Volume,
    },
    Saved {
        app: String,
        levels: Option<SavedLevels>,
    },
    Config {
        toml: String,
    },
}

/// Encode a message with a 4-byte little-endian length prefix.
pub fn encode_message(msg: &[u8]) -> Result<Vec<u8>, IpcError> {
    let len = u32::try_from(msg.len()).map_err(|_| IpcError::MessageTooLarge { size: u32::MAX })?;
    if len > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge { size: len });
    }
    let mut buf = Vec::with_capacity(4 + msg.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(msg);
    Ok(buf)
}

/// Encode a request as length-prefixed JSON.
pub fn encode_request(req: &IpcRequest) -> Result<Vec<u8>, IpcError> {
    let json = serde_json::to_vec(req)?;
    encode_message(&json)
}

/// Encode a response as length-prefixed JSON.
pub fn encode_response(resp: &IpcResponse) -> Result<Vec<u8>, IpcError> {
    let json = serde_json::to_vec(resp)?;
    encode_message(&json)
}

/// Read a length prefix from a 4-byte buffer, rejecting oversized frames.
pub fn read_length_prefix(buf: &[u8; 4]) -> Result<u32, IpcError> {
    let len = u32::from_le_bytes(*buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge { size: len });
    }
    Ok(len)
}

/// Returns the XDG runtime directory, falling back to `/run/user/{uid}`.
#[must_use]
pub fn xdg_runtime_dir() -> std::path::PathBuf {
    let dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| {
        let uid = unsafe { libc::getuid() };
        format!("/run/user/{uid}")
    });
    std::path::PathBuf::from(dir)
}

/// Returns the default IPC socket path.
#[must_use]
pub fn default_socket_path() -> std::path::PathBuf {
    xdg_runtime_dir().join("focusvol.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format_is_tagged() {
        let json = serde_json::to_string(&IpcRequest::Start {
            target: "firefox".into(),
            focused_volume: Some(0.8),
            unfocused_volume: None,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"start","target":"firefox","focused_volume":0.8,"unfocused_volume":null}"#
        );
    }

    #[test]
    fn omitted_optional_fields_deserialize() {
        let req: IpcRequest = serde_json::from_str(r#"{"type":"list_apps"}"#).unwrap();
        assert_eq!(req, IpcRequest::ListApps { refresh: false });

        let req: IpcRequest =
            serde_json::from_str(r#"{"type":"start","target":"spotify"}"#).unwrap();
        assert_eq!(
            req,
            IpcRequest::Start {
                target: "spotify".into(),
                focused_volume: None,
                unfocused_volume: None,
            }
        );

        let req: IpcRequest =
            serde_json::from_str(r#"{"type":"set_levels","unfocused_volume":0.05}"#).unwrap();
        assert_eq!(
            req,
            IpcRequest::SetLevels {
                focused_volume: None,
                unfocused_volume: Some(0.05),
            }
        );
    }

    #[test]
    fn status_response_serializes_monitor_state() {
        let resp = IpcResponse::Status {
            pulse_connected: true,
            monitor: Some(MonitorStatus {
                target: "firefox".into(),
                state: FocusState::Unfocused,
                focused_volume: Volume::new(1.0),
                unfocused_volume: Volume::new(0.1),
            }),
        };
        let value: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["monitor"]["state"], "unfocused");
        assert_eq!(value["monitor"]["unfocused_volume"], 0.1);

        let parsed: IpcResponse = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn saved_response_carries_absent_levels() {
        let resp = IpcResponse::Saved {
            app: "mpv".into(),
            levels: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"type":"saved","app":"mpv","levels":null}"#);
    }

    #[test]
    fn length_prefix_encode_decode() {
        let msg = b"hello world";
        let encoded = encode_message(msg).unwrap();
        assert_eq!(encoded.len(), 4 + msg.len());

        let len_bytes: [u8; 4] = encoded[..4].try_into().unwrap();
        let len = read_length_prefix(&len_bytes).unwrap();
        assert_eq!(len as usize, msg.len());
        assert_eq!(&encoded[4..], msg);
    }

    #[test]
    fn oversized_message_rejected() {
        let len = MAX_MESSAGE_SIZE + 1;
        match read_length_prefix(&len.to_le_bytes()) {
            Err(IpcError::MessageTooLarge { size }) => assert_eq!(size, len),
            other => panic!("expected MessageTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn max_valid_length_accepted() {
        let bytes = MAX_MESSAGE_SIZE.to_le_bytes();
        assert_eq!(read_length_prefix(&bytes).unwrap(), MAX_MESSAGE_SIZE);
    }

    #[test]
    fn zero_length_message() {
        let encoded = encode_message(b"").unwrap();
        assert_eq!(encoded.len(), 4);
        let len_bytes: [u8; 4] = encoded[..4].try_into().unwrap();
        assert_eq!(read_length_prefix(&len_bytes).unwrap(), 0);
    }

    #[test]
    fn encoded_request_decodes_from_payload() {
        let req = IpcRequest::SaveSettings {
            app: "Müsik-Plàyér 音楽".into(),
            focused_volume: Some(0.9),
            unfocused_volume: Some(0.2),
        };

        let encoded = encode_request(&req).unwrap();
        let len_bytes: [u8; 4] = encoded[..4].try_into().unwrap();
        let len = read_length_prefix(&len_bytes).unwrap() as usize;
        let decoded: IpcRequest = serde_json::from_slice(&encoded[4..4 + len]).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn socket_path_is_deterministic() {
        let path = default_socket_path();
        assert_eq!(path.file_name().unwrap(), "focusvol.sock");
    }
}
