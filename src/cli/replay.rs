use std::{
    error::Error,
    path::PathBuf,
    time::{Duration, Instant},
};

use serde::Serialize;
use tabled::settings::{Panel, Style};
use tabled::{Table, Tabled};
use thiserror::Error;

use crate::{
    cli::capture::{parse_hex, Capture, CaptureAction, HexError},
    config::DeviceConfig,
    drivers::synaptics_tcm::{
        device::{DeviceError, TouchDevice},
        diag::PollResult,
        event::Event,
        report_config::ReportProgram,
    },
};

/// Name of the device config used when no config file is given
const DEFAULT_DEVICE_NAME: &str = "Synaptics TCM";

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("invalid hex in {context}: {source}")]
    Hex { context: String, source: HexError },
    #[error("report entry at {0} ms has no data")]
    MissingData(u64),
    #[error("{0}")]
    Device(#[from] DeviceError),
}

/// Events produced by a single capture entry
#[derive(Debug, Clone, Serialize)]
pub struct ReplayFrame {
    pub time_ms: u64,
    pub action: CaptureAction,
    pub events: Vec<Event>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    pub name: String,
    /// Events produced when the device was identified
    pub identify: Vec<Event>,
    pub frames: Vec<ReplayFrame>,
    /// Diagnostic report of the last frame, empty if no frame arrived
    pub diagnostics: String,
}

/// Feed every entry of the capture through a new touch device session.
/// Entries that fail are recorded in their frame and do not stop the replay.
pub async fn replay(
    capture: &Capture,
    config: &DeviceConfig,
) -> Result<ReplayResult, ReplayError> {
    let device =
        TouchDevice::with_poll_timeout(config.driver_config(), config.diag_poll_timeout());
    if let Some(params) = config.default_params {
        device.reset_defaults(params)?;
    }

    let report_config = match capture.report_config.as_deref() {
        Some(hex) => parse_hex(hex).map_err(|source| ReplayError::Hex {
            context: "report config".to_string(),
            source,
        })?,
        None => config
            .report_program()
            .unwrap_or_else(|| ReportProgram::default_config(false))
            .encode(),
    };
    let identify = device.identify(&report_config, capture.params)?;

    let start = Instant::now();
    let mut frames = Vec::with_capacity(capture.entries.len());
    for entry in capture.entries.iter() {
        let now = start + Duration::from_millis(entry.time_ms);
        let result = match entry.action {
            CaptureAction::Report => {
                let data = entry
                    .data
                    .as_deref()
                    .ok_or(ReplayError::MissingData(entry.time_ms))?;
                let report = parse_hex(data).map_err(|source| ReplayError::Hex {
                    context: format!("report at {} ms", entry.time_ms),
                    source,
                })?;
                device.report_at(&report, now)
            }
            CaptureAction::Suspend => device.suspend(),
            CaptureAction::Resume => device.resume().map(|_| Vec::new()),
            CaptureAction::FreeObjects => device.free_objects(),
        };

        let (events, error) = match result {
            Ok(events) => (events, None),
            Err(DeviceError::Poisoned) => return Err(DeviceError::Poisoned.into()),
            Err(e) => {
                log::warn!("Entry at {} ms failed: {e}", entry.time_ms);
                (Vec::new(), Some(e.to_string()))
            }
        };
        frames.push(ReplayFrame {
            time_ms: entry.time_ms,
            action: entry.action,
            events,
            error,
        });
    }

    let diagnostics = match device.poll_diagnostics().await {
        PollResult::Ready => device.read_diagnostics(),
        result => {
            log::debug!("No diagnostic frame after replay: {result:?}");
            String::new()
        }
    };
    device.remove();

    Ok(ReplayResult {
        name: capture.name.clone(),
        identify,
        frames,
        diagnostics,
    })
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Time (ms)")]
    time: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Slot")]
    slot: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "X")]
    x: String,
    #[tabled(rename = "Y")]
    y: String,
    #[tabled(rename = "Major")]
    major: String,
    #[tabled(rename = "Minor")]
    minor: String,
    #[tabled(rename = "Pressure")]
    pressure: String,
}

impl EventRow {
    fn new(time: String, event: &Event) -> Self {
        let mut row = EventRow {
            time,
            event: String::new(),
            slot: String::new(),
            status: String::new(),
            x: String::new(),
            y: String::new(),
            major: String::new(),
            minor: String::new(),
            pressure: String::new(),
        };
        match event {
            Event::Contact(contact) => {
                row.event = "contact".to_string();
                row.slot = contact.slot.to_string();
                row.status = format!("{:?}", contact.status);
                row.x = contact.x.to_string();
                row.y = contact.y.to_string();
                row.major = contact.touch_major.to_string();
                row.minor = contact.touch_minor.to_string();
                row.pressure = contact.pressure.to_string();
            }
            Event::Lift(lift) => {
                row.event = "lift".to_string();
                row.slot = lift.slot.to_string();
                row.status = format!("{:?}", lift.status);
            }
            Event::Sync => row.event = "sync".to_string(),
            Event::Presence(present) => row.event = format!("presence {present}"),
        }
        row
    }
}

pub async fn handle_replay(
    path: PathBuf,
    config: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let config = match config {
        Some(path) => DeviceConfig::from_yaml_path(&path)?,
        None => DeviceConfig::find(DEFAULT_DEVICE_NAME).unwrap_or_default(),
    };
    log::debug!("Using device config: {}", config.name);
    let capture = Capture::from_yaml_file(&path)?;

    let result = replay(&capture, &config).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let mut rows: Vec<EventRow> = result
        .identify
        .iter()
        .map(|event| EventRow::new("identify".to_string(), event))
        .collect();
    for frame in result.frames.iter() {
        if let Some(error) = frame.error.as_ref() {
            eprintln!("{} ms: {error}", frame.time_ms);
        }
        rows.extend(
            frame
                .events
                .iter()
                .map(|event| EventRow::new(frame.time_ms.to_string(), event)),
        );
    }
    let mut table = Table::new(rows);
    table
        .with(Style::modern_rounded())
        .with(Panel::header(result.name.as_str()));
    println!("{table}");

    if result.diagnostics.is_empty() {
        println!("No new diagnostic frame");
    } else {
        print!("{}", result.diagnostics);
    }

    Ok(())
}
