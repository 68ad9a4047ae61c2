//! Engine configuration and persisted viewer settings.
//!
//! Configuration can be loaded from a JSON file, environment variables, or
//! created programmatically with the `with_*` builders.

use crate::detector::DetectorConfig;
use crate::floor_plan::FloorPlanOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunable constants of the measurement engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Distance (world units) under which a click closes the drawing loop
    pub loop_close_threshold: f64,
    /// Maximum relative difference between opposite edges of a rectangle
    pub rectangle_tolerance: f64,
    /// Radius of the panorama sphere, used when copying surfaces to the floor
    pub sphere_radius: f64,
    pub floor_plan: FloorPlanOptions,
    pub detector: DetectorConfig,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            loop_close_threshold: 50.0,
            rectangle_tolerance: 0.10,
            sphere_radius: 500.0,
            floor_plan: FloorPlanOptions::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl PlanConfig {
    pub fn with_loop_close_threshold(mut self, threshold: f64) -> Self {
        self.loop_close_threshold = threshold;
        self
    }

    pub fn with_rectangle_tolerance(mut self, tolerance: f64) -> Self {
        self.rectangle_tolerance = tolerance;
        self
    }

    /// Sets a square floor-plan canvas.
    pub fn with_canvas_size(mut self, size: u32) -> Self {
        self.floor_plan.width = size;
        self.floor_plan.height = size;
        self
    }

    pub fn with_canvas_margin(mut self, margin: u32) -> Self {
        self.floor_plan.margin = margin;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PANOPLAN_LOOP_CLOSE_THRESHOLD`: loop closing distance (default: 50)
    /// - `PANOPLAN_RECTANGLE_TOLERANCE`: rectangle tolerance (default: 0.10)
    /// - `PANOPLAN_CANVAS_SIZE`: floor-plan canvas edge in pixels (default: 800)
    /// - `PANOPLAN_CANVAS_MARGIN`: floor-plan margin in pixels (default: 50)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(val) = env_value::<f64>("PANOPLAN_LOOP_CLOSE_THRESHOLD")? {
            config.loop_close_threshold = val;
        }
        if let Some(val) = env_value::<f64>("PANOPLAN_RECTANGLE_TOLERANCE")? {
            config.rectangle_tolerance = val;
        }
        if let Some(val) = env_value::<u32>("PANOPLAN_CANVAS_SIZE")? {
            config = config.with_canvas_size(val);
        }
        if let Some(val) = env_value::<u32>("PANOPLAN_CANVAS_MARGIN")? {
            config.floor_plan.margin = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file. Missing fields keep defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.loop_close_threshold.is_finite() && self.loop_close_threshold >= 0.0) {
            return Err(ConfigError::InvalidValue("loop_close_threshold".to_string()));
        }
        if !(self.rectangle_tolerance.is_finite() && self.rectangle_tolerance >= 0.0) {
            return Err(ConfigError::InvalidValue("rectangle_tolerance".to_string()));
        }
        if !(self.sphere_radius.is_finite() && self.sphere_radius > 0.0) {
            return Err(ConfigError::InvalidValue("sphere_radius".to_string()));
        }
        let inner = self.floor_plan.width.min(self.floor_plan.height);
        if self.floor_plan.margin.saturating_mul(2) >= inner {
            return Err(ConfigError::InvalidValue("floor_plan.margin".to_string()));
        }
        Ok(())
    }
}

fn env_value<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur when loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Viewer settings block persisted with every project export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerSettings {
    pub show_helpers: bool,
    pub point_size: f64,
    pub line_width: f64,
    /// Physical units (cm) per world unit
    pub scale: f64,
    pub is_calibrated: bool,
    /// Reference length (cm) entered at calibration
    pub calibration_value: f64,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            show_helpers: true,
            point_size: 3.0,
            line_width: 2.0,
            scale: 1.0,
            is_calibrated: false,
            calibration_value: 80.0,
        }
    }
}
