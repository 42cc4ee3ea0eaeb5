pub mod path;


use std::{io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drivers::synaptics_tcm::{
    driver::{BoardData, DriverConfig},
    report_config::ReportProgram,
    InputParams, DEBOUNCE_INTERVAL, DIAG_POLL_TIMEOUT,
};

/// Represents all possible errors loading a [DeviceConfig]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read: {0}")]
    IoError(#[from] io::Error),
    #[error("Unable to deserialize: {0}")]
    DeserializeError(#[from] serde_yaml::Error),
}

/// Board and timing configuration for a touch controller
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DeviceConfig {
    pub version: u32,
    pub kind: String,
    pub name: String,
    pub description: Option<String>,
    pub board: Option<BoardConfig>,
    /// Frame interval in milliseconds after which the previous position of a
    /// lifted finger is reported again
    pub debounce_ms: Option<u64>,
    /// How long a diagnostic consumer waits for a new frame in milliseconds
    pub diag_poll_ms: Option<u64>,
    /// Input parameters to use when the device is not in application mode
    pub default_params: Option<InputParams>,
    pub report_config: Option<ReportConfigOptions>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct BoardConfig {
    pub swap_axes: Option<bool>,
    pub x_flip: Option<bool>,
    pub y_flip: Option<bool>,
}

impl From<BoardConfig> for BoardData {
    fn from(value: BoardConfig) -> Self {
        Self {
            swap_axes: value.swap_axes.unwrap_or_default(),
            x_flip: value.x_flip.unwrap_or_default(),
            y_flip: value.y_flip.unwrap_or_default(),
        }
    }
}

/// Whether the host installs its own touch report config on the device
/// instead of using the firmware default
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct ReportConfigOptions {
    pub use_default: Option<bool>,
    pub double_tap: Option<bool>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            version: 1,
            kind: "DeviceConfig".to_string(),
            name: "Synaptics TCM".to_string(),
            description: None,
            board: None,
            debounce_ms: None,
            diag_poll_ms: None,
            default_params: None,
            report_config: None,
        }
    }
}

impl DeviceConfig {
    /// Load a [DeviceConfig] from the given YAML string
    pub fn from_yaml(content: String) -> Result<DeviceConfig, LoadError> {
        let device: DeviceConfig = serde_yaml::from_str(content.as_str())?;
        Ok(device)
    }

    /// Load a [DeviceConfig] from the given YAML file path
    pub fn from_yaml_path(path: &Path) -> Result<DeviceConfig, LoadError> {
        let file = std::fs::File::open(path)?;
        let device: DeviceConfig = serde_yaml::from_reader(file)?;
        Ok(device)
    }

    /// Search the device config directories for a config with the given
    /// name. Configs that fail to load are skipped.
    pub fn find(name: &str) -> Option<DeviceConfig> {
        let paths = path::get_devices_paths();
        let files = path::get_multidir_sorted_files(paths.as_slice(), |entry| {
            entry.path().extension().is_some_and(|ext| ext == "yaml")
        });

        for file in files {
            let config = match Self::from_yaml_path(&file) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Failed to load device config {file:?}: {e}");
                    continue;
                }
            };
            if config.name == name {
                log::debug!("Found device config {file:?}");
                return Some(config);
            }
        }

        None
    }

    /// Returns the driver configuration described by this config
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            board: self.board.unwrap_or_default().into(),
            debounce: self
                .debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(DEBOUNCE_INTERVAL),
        }
    }

    pub fn diag_poll_timeout(&self) -> Duration {
        self.diag_poll_ms
            .map(Duration::from_millis)
            .unwrap_or(DIAG_POLL_TIMEOUT)
    }

    /// Returns the report config the host should install on the device, or
    /// None to keep the firmware default.
    pub fn report_program(&self) -> Option<ReportProgram> {
        let options = self.report_config.unwrap_or_default();
        if !options.use_default.unwrap_or_default() {
            return None;
        }
        Some(ReportProgram::default_config(
            options.double_tap.unwrap_or_default(),
        ))
    }
}
