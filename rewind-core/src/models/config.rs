use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::audio_models::PcmFormat;
use super::error::CaptureError;

/// Timer-driven snapshot settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub enabled: bool,

    /// Seconds between two auto-saved snapshots.
    pub interval_seconds: u32,

    /// Seconds of trailing history written per snapshot.
    pub snapshot_seconds: u32,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 600,
            snapshot_seconds: 300,
        }
    }
}

/// Engine parameters consumed from external settings storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start listening as soon as the engine is spawned.
    pub listening_enabled: bool,

    /// Ring buffer capacity in bytes (0 disables the memory).
    pub buffer_capacity_bytes: u64,

    /// Capture sample rate in Hz (mono, 16-bit).
    pub sample_rate: u32,

    pub auto_save: AutoSaveConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_sample_rate(self.sample_rate)?;
        validate_capacity(self.buffer_capacity_bytes)?;
        if self.auto_save.enabled && self.auto_save.interval_seconds == 0 {
            return Err("auto-save interval must be positive".into());
        }
        Ok(())
    }

    pub fn format(&self) -> PcmFormat {
        PcmFormat::mono_16(self.sample_rate)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.format().bytes_per_second()
    }

    /// Read a JSON settings file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let json = fs::read_to_string(path)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to read settings: {}", e)))?;
        let config: EngineConfig = serde_json::from_str(&json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to parse settings: {}", e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), CaptureError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to create directory: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to serialize settings: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to write settings: {}", e)))?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let sample_rate = 48000;
        Self {
            listening_enabled: true,
            // five minutes of mono 16-bit audio
            buffer_capacity_bytes: PcmFormat::mono_16(sample_rate).bytes_per_second() * 300,
            sample_rate,
            auto_save: AutoSaveConfig::default(),
        }
    }
}

pub(crate) fn validate_sample_rate(sample_rate: u32) -> Result<(), String> {
    if !(1000..=384_000).contains(&sample_rate) {
        return Err(format!("unsupported sample rate: {}", sample_rate));
    }
    Ok(())
}

pub(crate) fn validate_capacity(capacity: u64) -> Result<(), String> {
    if usize::try_from(capacity).is_err() {
        return Err(format!("buffer capacity {} does not fit in memory", capacity));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("rewind_config_test_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bytes_per_second(), 96000);
        assert_eq!(config.buffer_capacity_bytes, 96000 * 300);
        assert!(!config.auto_save.enabled);
    }

    #[test]
    fn rejects_bad_values() {
        let config = EngineConfig {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            auto_save: AutoSaveConfig {
                enabled: true,
                interval_seconds: 0,
                snapshot_seconds: 10,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_is_allowed() {
        let config = EngineConfig {
            buffer_capacity_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_then_load() {
        let path = temp_settings_path("roundtrip");
        let config = EngineConfig {
            listening_enabled: false,
            buffer_capacity_bytes: 4096,
            sample_rate: 16000,
            auto_save: AutoSaveConfig {
                enabled: true,
                interval_seconds: 60,
                snapshot_seconds: 30,
            },
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let path = temp_settings_path("partial");
        fs::write(&path, r#"{ "sample_rate": 22050, "auto_save": { "enabled": true } }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.sample_rate, 22050);
        assert!(config.listening_enabled);
        assert!(config.auto_save.enabled);
        assert_eq!(config.auto_save.interval_seconds, 600);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn load_rejects_invalid_settings() {
        let path = temp_settings_path("invalid");
        fs::write(&path, r#"{ "sample_rate": 5 }"#).unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(CaptureError::ConfigurationFailed(_))
        ));
        fs::remove_file(&path).ok();
    }
}
