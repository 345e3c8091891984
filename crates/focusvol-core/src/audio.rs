use serde::{Deserialize, Serialize};

/// Volume as a normalized value in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Volume(f64);

impl Volume {
    pub const ZERO: Volume = Volume(0.0);
    pub const MAX: Volume = Volume(1.0);

    /// Create a Volume from a normalized float, clamped to [0.0, 1.0].
    ///
    /// Non-finite input clamps to zero.
    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Volume::ZERO;
        }
        Volume(value.clamp(0.0, 1.0))
    }

    /// Accept a user-supplied level only if it already lies in [0.0, 1.0].
    ///
    /// Unlike [`Volume::new`] this never clamps: out-of-range values are
    /// returned as `None` so the caller can report them.
    #[must_use]
    pub fn parse_level(value: f64) -> Option<Self> {
        (value.is_finite() && (0.0..=1.0).contains(&value)).then_some(Volume(value))
    }

    /// Get the raw normalized value.
    #[must_use]
    pub fn get(self) -> f64 {
        self.0
    }
}

/// Case-insensitive substring match of a configured target name against a
/// process name.
///
/// Deliberately a containment check, not equality: `"Target"` matches both
/// `"target.exe"` and `"NotTarget.exe"`.
#[must_use]
pub fn process_matches(process_name: &str, target: &str) -> bool {
    process_name
        .to_lowercase()
        .contains(&target.to_lowercase())
}

/// One active playback session as reported by the volume sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub index: u32,
    /// Display name of the stream (e.g. "Firefox" or "Playback").
    pub name: String,
    /// Owning process name, when the server knows it.
    pub process: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
    pub volume: Volume,
    pub muted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_clamped_to_valid_range() {
        assert_eq!(Volume::new(-0.5).get(), 0.0);
        assert_eq!(Volume::new(0.0).get(), 0.0);
        assert_eq!(Volume::new(0.5).get(), 0.5);
        assert_eq!(Volume::new(1.0).get(), 1.0);
        assert_eq!(Volume::new(1.5).get(), 1.0);
        assert_eq!(Volume::new(f64::NAN).get(), 0.0);
    }

    #[test]
    fn parse_level_accepts_closed_unit_interval() {
        for v in [0.0, 0.01, 0.25, 0.5, 0.99, 1.0] {
            assert_eq!(Volume::parse_level(v).map(Volume::get), Some(v));
        }
    }

    #[test]
    fn parse_level_rejects_instead_of_clamping() {
        for v in [-0.01, 1.01, -1.0, 2.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(Volume::parse_level(v).is_none(), "{v} should be rejected");
        }
    }

    #[test]
    fn process_match_is_case_insensitive() {
        assert!(process_matches("target.exe", "Target"));
        assert!(process_matches("TARGET", "target"));
        assert!(process_matches("firefox", "FireFox"));
    }

    #[test]
    fn process_match_is_substring_not_exact() {
        // "NotTarget.exe" contains "target", so it matches too.
        assert!(process_matches("NotTarget.exe", "Target"));
        assert!(process_matches("firefox-bin", "firefox"));
        assert!(!process_matches("chrome", "firefox"));
        assert!(!process_matches("fire", "firefox"));
    }

    #[test]
    fn volume_serde_round_trip() {
        let vol = Volume::new(0.42);
        let json = serde_json::to_string(&vol).unwrap();
        let parsed: Volume = serde_json::from_str(&json).unwrap();
        assert!((vol.get() - parsed.get()).abs() < f64::EPSILON);
    }

    #[test]
    fn session_info_missing_pid_defaults_to_none() {
        let json = r#"{
            "index": 1,
            "name": "Playback",
            "process": "spotify",
            "volume": 0.5,
            "muted": false
        }"#;
        let parsed: SessionInfo = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.pid, None);
        assert_eq!(parsed.process.as_deref(), Some("spotify"));
    }
}
