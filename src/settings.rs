// src/settings.rs
//
// Bridge settings file: serial link, worker timing and reassembly limits.
// JSON by default; a `.toml` path is read and written as TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::io::{LinkConfig, OverflowPolicy, Parity, ReassemblerConfig, SessionConfig};

const SETTINGS_DIR: &str = "canbus-serial";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Default port for commands that take an optional one
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    // Worker loop
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,

    // Line reassembly
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: Option<usize>, // null = unbounded
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Mirror log output into this directory
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_baud_rate() -> u32 {
    115_200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_idle_interval_ms() -> u64 {
    50
}
fn default_read_chunk() -> usize {
    1024
}
fn default_max_line_bytes() -> Option<usize> {
    Some(crate::io::canbus::DEFAULT_MAX_BUFFERED)
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            read_timeout_ms: default_read_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            read_chunk: default_read_chunk(),
            max_line_bytes: default_max_line_bytes(),
            overflow_policy: OverflowPolicy::default(),
            log_dir: None,
        }
    }
}

impl BridgeSettings {
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            read_timeout_ms: self.read_timeout_ms,
        }
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval_ms: self.poll_interval_ms,
            idle_interval_ms: self.idle_interval_ms,
            read_chunk: self.read_chunk,
            reassembler: ReassemblerConfig {
                max_buffered: self.max_line_bytes,
                on_overflow: self.overflow_policy,
            },
        }
    }

    /// Reject values the serial layer would silently coerce
    pub fn validate(&self) -> Result<(), String> {
        if self.baud_rate == 0 {
            return Err("baud_rate must be greater than 0".to_string());
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(format!("data_bits must be 5-8, got {}", self.data_bits));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(format!("stop_bits must be 1 or 2, got {}", self.stop_bits));
        }
        if self.read_chunk == 0 {
            return Err("read_chunk must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}

/// `<config dir>/canbus-serial/settings.json`
pub fn default_settings_path() -> Result<PathBuf, String> {
    let config_dir = dirs::config_dir().ok_or_else(|| "Failed to get config dir".to_string())?;
    Ok(config_dir.join(SETTINGS_DIR).join(SETTINGS_FILE))
}

/// Load settings from `path`, or from the default location.
/// A missing file yields defaults.
pub fn load_settings(path: Option<&Path>) -> Result<BridgeSettings, String> {
    let settings_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_settings_path()?,
    };

    if !settings_path.exists() {
        return Ok(BridgeSettings::default());
    }

    let content = std::fs::read_to_string(&settings_path)
        .map_err(|e| format!("Failed to read settings: {}", e))?;

    let settings: BridgeSettings = if is_toml(&settings_path) {
        toml::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))?
    } else {
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))?
    };

    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &BridgeSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings dir: {}", e))?;
    }

    let content = if is_toml(path) {
        toml::to_string_pretty(settings)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?
    } else {
        serde_json::to_string_pretty(settings)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?
    };

    std::fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("canbus-serial-settings-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let settings = load_settings(Some(&temp_path("does-not-exist.json"))).unwrap();
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: BridgeSettings =
            serde_json::from_str(r#"{ "port": "/dev/ttyACM0", "baud_rate": 9600 }"#).unwrap();
        assert_eq!(settings.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.poll_interval_ms, 10);
        assert_eq!(settings.max_line_bytes, Some(4096));
    }

    #[test]
    fn test_json_null_line_limit_is_unbounded() {
        let settings: BridgeSettings =
            serde_json::from_str(r#"{ "max_line_bytes": null, "overflow_policy": "reset" }"#)
                .unwrap();
        let config = settings.to_session_config();
        assert_eq!(config.reassembler.max_buffered, None);
        assert_eq!(config.reassembler.on_overflow, OverflowPolicy::Reset);
    }

    #[test]
    fn test_toml_settings() {
        let settings: BridgeSettings = toml::from_str(
            r#"
            port = "COM3"
            parity = "even"
            read_chunk = 64
            "#,
        )
        .unwrap();
        assert_eq!(settings.port.as_deref(), Some("COM3"));
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.to_session_config().read_chunk, 64);
    }

    #[test]
    fn test_save_and_load_by_extension() {
        let mut settings = BridgeSettings::default();
        settings.port = Some("/dev/ttyUSB1".to_string());
        settings.baud_rate = 57_600;

        for name in ["roundtrip.json", "roundtrip.toml"] {
            let path = temp_path(name);
            save_settings(&path, &settings).unwrap();
            assert_eq!(load_settings(Some(&path)).unwrap(), settings);
            let _ = std::fs::remove_file(&path);
        }
    }

    #[test]
    fn test_invalid_file_is_error() {
        let path = temp_path("broken.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_settings(Some(&path)).unwrap_err();
        assert!(err.starts_with("Failed to parse settings"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_validate_rejects_bad_link_values() {
        let mut settings = BridgeSettings::default();
        settings.data_bits = 9;
        assert!(settings.validate().is_err());

        let mut settings = BridgeSettings::default();
        settings.baud_rate = 0;
        assert!(settings.validate().is_err());

        assert!(BridgeSettings::default().validate().is_ok());
    }

    #[test]
    fn test_to_link_config() {
        let mut settings = BridgeSettings::default();
        settings.baud_rate = 250_000;
        settings.stop_bits = 2;
        let link = settings.to_link_config();
        assert_eq!(link.baud_rate, 250_000);
        assert_eq!(link.stop_bits, 2);
        assert_eq!(link, LinkConfig { baud_rate: 250_000, stop_bits: 2, ..LinkConfig::default() });
    }
}
