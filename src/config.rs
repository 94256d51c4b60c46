use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "SchedulerConfig::default_tick_hz")]
    pub tick_hz: u32,
    #[serde(default = "SchedulerConfig::default_resize_debounce_ms")]
    pub resize_debounce_ms: u64,
    /// 0 picks a worker count from the available parallelism.
    #[serde(default)]
    pub worker_threads: usize,
    #[serde(default = "SchedulerConfig::default_worker_queue_depth")]
    pub worker_queue_depth: usize,
    #[serde(default = "SchedulerConfig::default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_move_speed")]
    pub move_speed: f32,
    #[serde(default = "CameraConfig::default_boost_multiplier")]
    pub boost_multiplier: f32,
    #[serde(default = "CameraConfig::default_look_sensitivity")]
    pub look_sensitivity: f32,
    #[serde(default = "CameraConfig::default_fov_degrees")]
    pub fov_degrees: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "PreviewConfig::default_size")]
    pub size: u32,
    #[serde(default = "PreviewConfig::default_passes")]
    pub passes: u32,
    #[serde(default = "PreviewConfig::default_border_px")]
    pub border_px: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracerConfig {
    #[serde(default = "TracerConfig::default_max_bounces")]
    pub max_bounces: u32,
    #[serde(default = "TracerConfig::default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub tracer: TracerConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub worker_threads: Option<usize>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Lumen Editor".to_string(), width: 640, height: 360 }
    }
}

impl SchedulerConfig {
    const fn default_tick_hz() -> u32 {
        60
    }

    const fn default_resize_debounce_ms() -> u64 {
        100
    }

    const fn default_worker_queue_depth() -> usize {
        2
    }

    const fn default_shutdown_timeout_ms() -> u64 {
        2_000
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism().map(|n| n.get().clamp(1, 4)).unwrap_or(1)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_hz: Self::default_tick_hz(),
            resize_debounce_ms: Self::default_resize_debounce_ms(),
            worker_threads: 0,
            worker_queue_depth: Self::default_worker_queue_depth(),
            shutdown_timeout_ms: Self::default_shutdown_timeout_ms(),
        }
    }
}

impl CameraConfig {
    fn default_move_speed() -> f32 {
        2.5
    }

    fn default_boost_multiplier() -> f32 {
        4.0
    }

    fn default_look_sensitivity() -> f32 {
        0.003
    }

    fn default_fov_degrees() -> f32 {
        50.0
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            move_speed: Self::default_move_speed(),
            boost_multiplier: Self::default_boost_multiplier(),
            look_sensitivity: Self::default_look_sensitivity(),
            fov_degrees: Self::default_fov_degrees(),
        }
    }
}

impl PreviewConfig {
    const fn default_size() -> u32 {
        96
    }

    const fn default_passes() -> u32 {
        16
    }

    const fn default_border_px() -> u32 {
        2
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { size: Self::default_size(), passes: Self::default_passes(), border_px: Self::default_border_px() }
    }
}

impl TracerConfig {
    const fn default_max_bounces() -> u32 {
        4
    }

    const fn default_seed() -> u64 {
        0x5eed
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self { max_bounces: Self::default_max_bounces(), seed: Self::default_seed() }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!("Config load error: {err:#}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(workers) = overrides.worker_threads {
            self.scheduler.worker_threads = workers;
        }
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.worker_threads.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.worker_threads.is_some() {
            fields.push("workers");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_config_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        write!(file, r#"{{"scheduler":{{"resize_debounce_ms":250}},"preview":{{"passes":4}}}}"#)
            .expect("write config");
        let cfg = AppConfig::load(file.path()).expect("load config");
        assert_eq!(cfg.scheduler.resize_debounce(), Duration::from_millis(250));
        assert_eq!(cfg.scheduler.tick_hz, 60);
        assert_eq!(cfg.preview.passes, 4);
        assert_eq!(cfg.preview.size, 96);
        assert_eq!(cfg.window.width, 640);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load_or_default("does/not/exist.json");
        assert_eq!(cfg.scheduler.resize_debounce_ms, 100);
    }

    #[test]
    fn overrides_replace_fields() {
        let mut cfg = AppConfig::default();
        let overrides = AppConfigOverrides { width: Some(320), height: None, worker_threads: Some(3) };
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.window.width, 320);
        assert_eq!(cfg.window.height, 360);
        assert_eq!(cfg.scheduler.resolved_worker_threads(), 3);
        assert_eq!(overrides.applied_fields(), vec!["width", "workers"]);
    }
}
