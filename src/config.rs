use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("both top_marker and bottom_marker are empty; fill at least one of them")]
    NoViewMarkers,
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    #[error("fps must be > 0")]
    ZeroFps,
    #[error("speed_factor must be a finite number > 0, got {0}")]
    InvalidSpeedFactor(String),
}

/// Pixel margins around and between the two stacked clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Margins {
    pub top: u32,
    pub middle: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 50,
            middle: 50,
            bottom: 50,
            left: 30,
            right: 30,
        }
    }
}

/// Everything a run needs, built once at startup and shared by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MergeConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub input_extension: String,
    pub output_extension: String,
    pub split_char: String,
    pub subject_marker: String,
    pub trial_marker: String,
    pub right_marker: String,
    pub left_marker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cage_marker: Option<String>,
    pub top_marker: String,
    pub bottom_marker: String,
    pub name_separator: String,
    pub fps: u32,
    pub speed_factor: f64,
    pub margins: Margins,
    pub codec: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("output"),
            input_extension: ".avi".to_owned(),
            output_extension: "mp4".to_owned(),
            split_char: "_".to_owned(),
            subject_marker: "Mouse".to_owned(),
            trial_marker: "Run".to_owned(),
            right_marker: "Right".to_owned(),
            left_marker: "Left".to_owned(),
            cage_marker: None,
            top_marker: "SIDEVIEW".to_owned(),
            bottom_marker: "VENTRALVIEW".to_owned(),
            name_separator: "_".to_owned(),
            fps: 30,
            speed_factor: 0.1,
            margins: Margins::default(),
            codec: "libx264".to_owned(),
        }
    }
}

impl MergeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_marker.is_empty() && self.bottom_marker.is_empty() {
            return Err(ConfigError::NoViewMarkers);
        }

        for (name, value) in [
            ("split_char", &self.split_char),
            ("subject_marker", &self.subject_marker),
            ("trial_marker", &self.trial_marker),
            ("input_extension", &self.input_extension),
            ("output_extension", &self.output_extension),
            ("codec", &self.codec),
        ] {
            if value.is_empty() {
                return Err(ConfigError::EmptyField(name));
            }
        }

        if matches!(self.cage_marker.as_deref(), Some("")) {
            return Err(ConfigError::EmptyField("cage_marker"));
        }

        if self.fps == 0 {
            return Err(ConfigError::ZeroFps);
        }

        if !self.speed_factor.is_finite() || self.speed_factor <= 0.0 {
            return Err(ConfigError::InvalidSpeedFactor(self.speed_factor.to_string()));
        }

        Ok(())
    }

    /// `<output_dir>/<subject><name_separator><group_key>.<output_extension>`
    pub fn output_path(&self, subject: &str, group_key: &str) -> PathBuf {
        let extension = self.output_extension.trim_start_matches('.');
        self.output_dir.join(format!(
            "{subject}{}{group_key}.{extension}",
            self.name_separator
        ))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize configuration")
    }
}

pub fn load_config(path: &Path) -> Result<MergeConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })
}
