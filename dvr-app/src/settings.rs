//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use dvr_core::EngineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Directory holding the recorded stream.
    pub storage_dir: PathBuf,
    /// `sine`, `silence` or `host`.
    pub source: String,
    /// `null` or `host`.
    pub output: String,
    /// Test tone frequency for the `sine` source.
    pub tone_hz: f32,
    /// Control-loop polling interval.
    pub poll_interval_ms: u64,
    pub engine: EngineConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            storage_dir: default_data_dir().join("recordings"),
            source: "sine".into(),
            output: "null".into(),
            tone_hz: 440.0,
            poll_interval_ms: 2,
            engine: EngineConfig::default(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.source = normalize_source(&self.source);
        self.output = normalize_output(&self.output);
        self.tone_hz = self.tone_hz.clamp(20.0, 4_000.0);
        self.poll_interval_ms = self.poll_interval_ms.clamp(1, 50);
        self.engine.stream_name = self.engine.stream_name.trim().to_string();
        if self.engine.stream_name.is_empty() {
            self.engine.stream_name = EngineConfig::default().stream_name;
        }
    }
}

pub fn normalize_source(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "silence" | "mute" => "silence".into(),
        "host" | "mic" | "microphone" => "host".into(),
        _ => "sine".into(),
    }
}

pub fn normalize_output(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "host" | "speaker" | "speakers" => "host".into(),
        _ => "null".into(),
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("dvr")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("dvr")
    }
}

pub fn default_settings_path() -> PathBuf {
    default_data_dir().join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!("ignoring malformed settings at {}: {e}", path.display());
                None
            }
        })
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
