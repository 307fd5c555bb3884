use crate::domain::device::{self, WireVersion, DEFAULT_MIN_WRITE_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "mdasp_companion".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Devices
    #[serde(default)]
    pub known_bluetooth_addresses: Vec<u64>,
    #[serde(default)]
    pub last_connected_address: Option<u64>,

    // Discovery
    /// Advertised local name a board must carry to be listed
    #[serde(default = "default_device_name")]
    pub device_name_filter: String,
    #[serde(default = "default_scan_duration_secs")]
    pub scan_duration_secs: u64,

    // Write behavior
    /// Transmit slider values while dragging
    #[serde(default = "default_false")]
    pub live_mode: bool,
    #[serde(default = "default_min_write_interval_ms")]
    pub min_write_interval_ms: u64,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Advanced BLE Settings
    #[serde(default)]
    pub wire_version: WireVersion,
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: Uuid,
    #[serde(default = "default_parameter_uuid")]
    pub ble_parameter_char_uuid: Uuid,
    #[serde(default = "default_false")]
    pub debug_show_all_devices: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            known_bluetooth_addresses: Vec::new(),
            last_connected_address: None,
            device_name_filter: default_device_name(),
            scan_duration_secs: default_scan_duration_secs(),
            live_mode: false,
            min_write_interval_ms: default_min_write_interval_ms(),
            log_settings: LogSettings::default(),
            wire_version: WireVersion::default(),
            ble_service_uuid: default_service_uuid(),
            ble_parameter_char_uuid: default_parameter_uuid(),
            debug_show_all_devices: false,
        }
    }
}

fn default_device_name() -> String {
    device::DEFAULT_DEVICE_NAME.to_string()
}
fn default_scan_duration_secs() -> u64 {
    5
}
fn default_min_write_interval_ms() -> u64 {
    DEFAULT_MIN_WRITE_INTERVAL_MS
}
fn default_service_uuid() -> Uuid {
    device::SERVICE_UUID
}
fn default_parameter_uuid() -> Uuid {
    device::PARAMETER_CHAR_UUID
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("MDASPCompanion");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    /// Record a successful connection
    pub fn remember_device(&mut self, address: u64) -> anyhow::Result<()> {
        if !self.settings.known_bluetooth_addresses.contains(&address) {
            self.settings.known_bluetooth_addresses.push(address);
        }
        self.settings.last_connected_address = Some(address);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let service = SettingsService::with_path(dir.path().join("settings.json"));
        let settings = service.get();
        assert!(!settings.live_mode);
        assert_eq!(settings.min_write_interval_ms, 14);
        assert_eq!(settings.wire_version, WireVersion::V108);
        assert_eq!(settings.ble_parameter_char_uuid, device::PARAMETER_CHAR_UUID);
        assert_eq!(settings.device_name_filter, "MDASP Audio Processor");
        assert_eq!(settings.scan_duration_secs, 5);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "live_mode": true, "wire_version": "V104" }"#).unwrap();

        let service = SettingsService::with_path(path);
        assert!(service.get().live_mode);
        assert_eq!(service.get().wire_version, WireVersion::V104);
        assert_eq!(service.get().log_settings.level, "info");
    }

    #[test]
    fn test_get_mut_changes_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut service = SettingsService::with_path(path.clone());
        service.get_mut().live_mode = true;
        service.save().unwrap();

        assert!(SettingsService::with_path(path).get().live_mode);
    }

    #[test]
    fn test_remember_device_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut service = SettingsService::with_path(path.clone());
        service.remember_device(0xAABBCCDDEEFF).unwrap();
        service.remember_device(0xAABBCCDDEEFF).unwrap();

        let reloaded = SettingsService::with_path(path);
        assert_eq!(reloaded.get().known_bluetooth_addresses, vec![0xAABBCCDDEEFF]);
        assert_eq!(reloaded.get().last_connected_address, Some(0xAABBCCDDEEFF));
    }
}
