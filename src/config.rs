use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::LabelPolicy;
use crate::camera::Facing;

const DEFAULT_DB_PATH: &str = "driver_watch.db";
const DEFAULT_MONITORED_LABEL: &str = "distracted";
const DEFAULT_PREFERRED_LABEL: &str = "focused";
const DEFAULT_HAPTIC_INTERVAL_MS: u64 = 1000;
const DEFAULT_HAPTIC_PULSE_MS: u64 = 500;
const DEFAULT_RESYNC_INTERVAL_MS: u64 = 20_000;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const MAX_CAMERA_FPS: u32 = 120;
const MAX_CAMERA_PIXELS: u64 = 4096 * 4096;

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    user_id: Option<String>,
    db_path: Option<String>,
    alert: Option<AlertConfigFile>,
    camera: Option<CameraConfigFile>,
    engine: Option<EngineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    monitored_labels: Option<Vec<String>>,
    preferred_label: Option<String>,
    class_names: Option<HashMap<String, String>>,
    haptic_interval_ms: Option<u64>,
    haptic_pulse_ms: Option<u64>,
    resync_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    facing: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    display_rotation: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    script_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub user_id: String,
    pub db_path: String,
    pub alert: AlertSettings,
    pub camera: CameraSettings,
    pub engine: EngineSettings,
}

/// Alerting constants, fixed for the lifetime of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSettings {
    pub monitored_labels: Vec<String>,
    pub preferred_label: Option<String>,
    pub class_names: HashMap<String, String>,
    pub haptic_interval: Duration,
    pub haptic_pulse: Duration,
    pub resync_interval: Duration,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            monitored_labels: vec![DEFAULT_MONITORED_LABEL.to_string()],
            preferred_label: Some(DEFAULT_PREFERRED_LABEL.to_string()),
            class_names: HashMap::new(),
            haptic_interval: Duration::from_millis(DEFAULT_HAPTIC_INTERVAL_MS),
            haptic_pulse: Duration::from_millis(DEFAULT_HAPTIC_PULSE_MS),
            resync_interval: Duration::from_millis(DEFAULT_RESYNC_INTERVAL_MS),
        }
    }
}

impl AlertSettings {
    pub fn policy(&self) -> LabelPolicy {
        LabelPolicy {
            monitored: self.monitored_labels.clone(),
            preferred: self.preferred_label.clone(),
            class_names: self.class_names.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    pub facing: Facing,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub display_rotation: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            facing: Facing::Front,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            fps: DEFAULT_CAMERA_FPS,
            display_rotation: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Detection script for the scripted engine; built-in script when unset.
    pub script_path: Option<PathBuf>,
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DRIVER_WATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Result<Self> {
        let alert_defaults = AlertSettings::default();
        let alert_file = file.alert.unwrap_or_default();
        let alert = AlertSettings {
            monitored_labels: alert_file
                .monitored_labels
                .unwrap_or(alert_defaults.monitored_labels),
            preferred_label: match alert_file.preferred_label {
                Some(label) if label.trim().is_empty() => None,
                Some(label) => Some(label),
                None => alert_defaults.preferred_label,
            },
            class_names: alert_file.class_names.unwrap_or_default(),
            haptic_interval: alert_file
                .haptic_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(alert_defaults.haptic_interval),
            haptic_pulse: alert_file
                .haptic_pulse_ms
                .map(Duration::from_millis)
                .unwrap_or(alert_defaults.haptic_pulse),
            resync_interval: alert_file
                .resync_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(alert_defaults.resync_interval),
        };

        let camera_defaults = CameraSettings::default();
        let camera_file = file.camera.unwrap_or_default();
        let facing = match camera_file.facing.as_deref() {
            Some(facing) => facing.parse()?,
            None => camera_defaults.facing,
        };
        let camera = CameraSettings {
            facing,
            width: camera_file.width.unwrap_or(camera_defaults.width),
            height: camera_file.height.unwrap_or(camera_defaults.height),
            fps: camera_file.fps.unwrap_or(camera_defaults.fps),
            display_rotation: camera_file
                .display_rotation
                .unwrap_or(camera_defaults.display_rotation),
        };

        let engine = EngineSettings {
            script_path: file.engine.and_then(|engine| engine.script_path),
        };

        Ok(Self {
            user_id: file.user_id.unwrap_or_default(),
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            alert,
            camera,
            engine,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(user_id) = std::env::var("DRIVER_WATCH_USER_ID") {
            if !user_id.trim().is_empty() {
                self.user_id = user_id.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("DRIVER_WATCH_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(labels) = std::env::var("DRIVER_WATCH_MONITORED_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.alert.monitored_labels = parsed;
            }
        }
        if let Ok(resync) = std::env::var("DRIVER_WATCH_RESYNC_MS") {
            let millis: u64 = resync.parse().map_err(|_| {
                anyhow!("DRIVER_WATCH_RESYNC_MS must be an integer number of milliseconds")
            })?;
            self.alert.resync_interval = Duration::from_millis(millis);
        }
        if let Ok(facing) = std::env::var("DRIVER_WATCH_FACING") {
            if !facing.trim().is_empty() {
                self.camera.facing = facing.parse()?;
            }
        }
        if let Ok(path) = std::env::var("DRIVER_WATCH_SCRIPT") {
            if !path.trim().is_empty() {
                self.engine.script_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.user_id.is_empty() {
            return Err(anyhow!(
                "user id is required (set DRIVER_WATCH_USER_ID or user_id in the config file)"
            ));
        }
        crate::store::validate_segment(&self.user_id)
            .map_err(|e| anyhow!("invalid user id '{}': {}", self.user_id, e))?;

        self.alert.monitored_labels.retain(|label| !label.trim().is_empty());
        if self.alert.monitored_labels.is_empty() {
            return Err(anyhow!("at least one monitored label is required"));
        }

        for (name, value) in [
            ("haptic interval", self.alert.haptic_interval),
            ("haptic pulse", self.alert.haptic_pulse),
            ("resync interval", self.alert.resync_interval),
        ] {
            if value.is_zero() {
                return Err(anyhow!("{} must be greater than zero", name));
            }
        }

        if !matches!(self.camera.display_rotation, 0 | 90 | 180 | 270) {
            return Err(anyhow!(
                "display rotation must be 0, 90, 180 or 270 (got {})",
                self.camera.display_rotation
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 || self.camera.fps == 0 {
            return Err(anyhow!("camera width, height and fps must be greater than zero"));
        }
        if self.camera.fps > MAX_CAMERA_FPS {
            return Err(anyhow!(
                "camera fps must be at most {} (got {})",
                MAX_CAMERA_FPS,
                self.camera.fps
            ));
        }
        if u64::from(self.camera.width) * u64::from(self.camera.height) > MAX_CAMERA_PIXELS {
            return Err(anyhow!(
                "camera size {}x{} is too large",
                self.camera.width,
                self.camera.height
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_defaults_fill_every_field() {
        let cfg = MonitorConfig::from_file(MonitorConfigFile::default()).unwrap();
        assert_eq!(cfg.db_path, DEFAULT_DB_PATH);
        assert_eq!(cfg.alert, AlertSettings::default());
        assert_eq!(cfg.camera, CameraSettings::default());
        assert!(cfg.engine.script_path.is_none());
    }

    #[test]
    fn empty_preferred_label_disables_preference() {
        let file: MonitorConfigFile =
            serde_json::from_str(r#"{"alert": {"preferred_label": ""}}"#).unwrap();
        let cfg = MonitorConfig::from_file(file).unwrap();
        assert_eq!(cfg.alert.preferred_label, None);
    }

    #[test]
    fn split_csv_trims_and_skips_blanks() {
        assert_eq!(split_csv(" a, ,b ,"), vec!["a", "b"]);
    }
}
