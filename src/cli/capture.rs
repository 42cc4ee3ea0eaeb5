//! Recorded touch report captures that can be replayed through the driver

use std::{fmt::Write, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::LoadError, drivers::synaptics_tcm::InputParams};

/// Possible errors parsing hex encoded bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("hex string has an odd number of digits: {0}")]
    OddLength(usize),
    #[error("invalid hex digit `{value}` at position {offset}")]
    InvalidDigit { offset: usize, value: char },
}

/// Parse hex encoded bytes. Whitespace, `:` and `,` separators are allowed
/// between bytes.
pub fn parse_hex(value: &str) -> Result<Vec<u8>, HexError> {
    let digits: Vec<(usize, char)> = value
        .char_indices()
        .filter(|(_, c)| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(HexError::OddLength(digits.len()));
    }

    let digit = |(offset, value): (usize, char)| {
        value
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or(HexError::InvalidDigit { offset, value })
    };
    digits
        .chunks(2)
        .map(|pair| -> Result<u8, HexError> { Ok((digit(pair[0])? << 4) | digit(pair[1])?) })
        .collect()
}

/// Format bytes as space separated hex
pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// What happened at a point in the capture
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureAction {
    /// A touch report was read from the device
    #[default]
    Report,
    Suspend,
    Resume,
    FreeObjects,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CaptureEntry {
    /// Milliseconds since the start of the capture
    pub time_ms: u64,
    #[serde(default)]
    pub action: CaptureAction,
    /// Hex encoded touch report
    pub data: Option<String>,
}

/// A recording of the touch report config, input parameters and touch
/// reports read from a device
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Capture {
    pub version: u32,
    pub kind: String,
    pub name: String,
    /// Hex encoded touch report config. The host default config is used if
    /// none was recorded.
    pub report_config: Option<String>,
    pub params: InputParams,
    pub entries: Vec<CaptureEntry>,
}

impl Capture {
    /// Load a [Capture] from the given YAML string
    pub fn from_yaml(content: String) -> Result<Capture, LoadError> {
        let capture: Capture = serde_yaml::from_str(content.as_str())?;
        Ok(capture)
    }

    /// Load a [Capture] from the given YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Capture, LoadError> {
        let file = std::fs::File::open(path)?;
        let capture: Capture = serde_yaml::from_reader(file)?;
        Ok(capture)
    }
}
