use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{CcdError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Base URL of the camera-control server, e.g. `http://localhost:8081`.
    pub base_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval_ms: u64,
    /// Consecutive failed fetches before the connection is reported lost.
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub log_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    pub exposure_time_s: f64,
    pub cooler_setpoint_c: f64,
    pub save_prefix: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            exposure_time_s: 0.5,
            cooler_setpoint_c: 0.0,
            save_prefix: "image".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub camera: CameraConfig,
    pub poll: PollConfig,
    pub ops: OpsConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                base_url: "http://127.0.0.1:8081".into(),
                request_timeout_ms: 5_000,
            },
            poll: PollConfig {
                interval_ms: 1_000,
                failure_threshold: 5,
            },
            ops: OpsConfig {
                log_level: "info".into(),
                log_dir: "logs".into(),
            },
            ui: UiConfig::default(),
        }
    }
}

impl DashboardConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            CcdError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            CcdError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.camera.base_url.as_str();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(CcdError::Configuration(
                "camera.base_url must start with http:// or https://".into(),
            ));
        }
        if self.camera.request_timeout_ms == 0 {
            return Err(CcdError::Configuration(
                "camera.request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.poll.interval_ms == 0 {
            return Err(CcdError::Configuration(
                "poll.interval_ms must be greater than zero".into(),
            ));
        }
        if self.poll.failure_threshold == 0 {
            return Err(CcdError::Configuration(
                "poll.failure_threshold must be greater than zero".into(),
            ));
        }
        if self.ui.exposure_time_s.is_nan() || self.ui.exposure_time_s <= 0.0 {
            return Err(CcdError::Configuration(
                "ui.exposure_time_s must be positive".into(),
            ));
        }
        if self.ui.save_prefix.is_empty() || self.ui.save_prefix.contains('/') {
            return Err(CcdError::Configuration(
                "ui.save_prefix must be a non-empty name without '/'".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_dashboard_config_from_file() {
        let temp_path = std::env::temp_dir().join("ccd-dash-config-test.toml");
        let mut config = DashboardConfig::default();
        config.camera.base_url = "http://camera.local:8081".into();
        config.poll.interval_ms = 250;
        config.ops.log_level = "debug".into();
        config.ui.save_prefix = "m31".into();

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = DashboardConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.camera.base_url, config.camera.base_url);
        assert_eq!(loaded.poll.interval_ms, 250);
        assert_eq!(loaded.ui.save_prefix, "m31");
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn ui_section_is_optional() {
        let doc = r#"
            [camera]
            base_url = "http://localhost:8081"
            request_timeout_ms = 2000

            [poll]
            interval_ms = 1000
            failure_threshold = 3

            [ops]
            log_level = "info"
            log_dir = "logs"
        "#;
        let config: DashboardConfig = toml::from_str(doc).expect("parse config");
        assert_eq!(config.ui.save_prefix, "image");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = DashboardConfig::default();
        assert!(config.validate().is_ok());

        config.camera.base_url = "camera.local".into();
        assert!(config.validate().is_err());
        config.camera.base_url = "http://camera.local".into();
        config.camera.request_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.camera.request_timeout_ms = 1_000;
        config.poll.interval_ms = 0;
        assert!(config.validate().is_err());
        config.poll.interval_ms = 1_000;
        config.poll.failure_threshold = 0;
        assert!(config.validate().is_err());
        config.poll.failure_threshold = 2;
        config.ui.exposure_time_s = 0.0;
        assert!(config.validate().is_err());
        config.ui.exposure_time_s = 1.0;
        config.ui.save_prefix = "a/b".into();
        assert!(config.validate().is_err());
        config.ui.save_prefix = "frame".into();
        assert!(config.validate().is_ok());
    }
}
