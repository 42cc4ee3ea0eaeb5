use std::{
    collections::TryReserveError,
    sync::Arc,
    time::{Duration, Instant},
};

use thiserror::Error;

use super::{
    diag::{Diagnostics, TouchInfo},
    event::{ContactInput, Event, LiftInput},
    report_config::{ProgramError, ReportProgram},
    touch_report::{ObjectStatus, ParseError, TouchFrame},
    InputParams, DEBOUNCE_INTERVAL,
};

/// Possible errors processing touch reports
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("no touch report config has been set")]
    NoReportConfig,
    #[error("failed to parse touch report: {0}")]
    Parse(#[from] ParseError),
    #[error("invalid touch report config: {0}")]
    Program(#[from] ProgramError),
    #[error("failed to allocate touch state for {max_objects} objects: {source}")]
    Alloc {
        max_objects: u32,
        source: TryReserveError,
    },
}

/// Board specific coordinate transforms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoardData {
    pub swap_axes: bool,
    pub x_flip: bool,
    pub y_flip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub board: BoardData,
    /// Frame interval after which the last known position of a lifted finger
    /// is reported again before the lift
    pub debounce: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            board: BoardData::default(),
            debounce: DEBOUNCE_INTERVAL,
        }
    }
}

/// Status and last touch position of every object slot, kept across frames
#[derive(Debug, Clone, Default)]
pub struct ObjectStateTable {
    prev_status: Vec<ObjectStatus>,
    prev_touch_info: Vec<TouchInfo>,
}

impl ObjectStateTable {
    /// Allocate a table with every slot lifted
    pub fn new(max_objects: usize) -> Result<Self, TryReserveError> {
        let mut table = Self::default();
        table.prev_status.try_reserve_exact(max_objects)?;
        table.prev_touch_info.try_reserve_exact(max_objects)?;
        table.prev_status.resize(max_objects, ObjectStatus::Lift);
        table.prev_touch_info.resize(max_objects, TouchInfo::default());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.prev_status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prev_status.is_empty()
    }

    /// Mark every slot as lifted
    pub fn reset(&mut self) {
        for status in self.prev_status.iter_mut() {
            *status = ObjectStatus::Lift;
        }
        for info in self.prev_touch_info.iter_mut() {
            info.state = ObjectStatus::Lift;
        }
    }

    pub fn status(&self, slot: usize) -> Option<ObjectStatus> {
        self.prev_status.get(slot).copied()
    }

    pub fn touch_info(&self, slot: usize) -> Option<TouchInfo> {
        self.prev_touch_info.get(slot).copied()
    }

    /// Returns the number of slots that were last reported in contact
    pub fn touch_count(&self) -> usize {
        self.prev_status
            .iter()
            .filter(|status| status.is_touching())
            .count()
    }

    /// Record what was reported for the slot in this frame
    fn update(&mut self, slot: usize, info: TouchInfo) {
        self.prev_status[slot] = info.state;
        if info.state != ObjectStatus::Lift {
            self.prev_touch_info[slot] = info;
        }
    }

    /// Returns the status to report for the slot given its new status, or
    /// None if nothing needs to be reported.
    fn effective_status(&self, slot: usize, status: ObjectStatus) -> Option<ObjectStatus> {
        let prev = self.prev_status[slot];
        if prev.is_lift_or_palm() && status.is_lift_or_palm() {
            return None;
        }
        Some(status)
    }
}

/// Decodes touch reports with the report config received from the device
/// and turns the objects in each frame into touch events.
#[derive(Debug)]
pub struct Driver {
    config: DriverConfig,
    program: Option<ReportProgram>,
    params: InputParams,
    table: ObjectStateTable,
    diag: Arc<Diagnostics>,
    /// Whether touch reports should be processed
    report_touch: bool,
    suspended: bool,
    /// When the last touch report was reconciled
    last_report: Option<Instant>,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Self::with_diagnostics(config, Arc::new(Diagnostics::new()))
    }

    pub fn with_diagnostics(config: DriverConfig, diag: Arc<Diagnostics>) -> Self {
        Self {
            config,
            program: None,
            params: InputParams::default(),
            table: ObjectStateTable::default(),
            diag,
            report_touch: false,
            suspended: false,
            last_report: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        self.diag.clone()
    }

    pub fn params(&self) -> InputParams {
        self.params
    }

    pub fn program(&self) -> Option<&ReportProgram> {
        self.program.as_ref()
    }

    pub fn state(&self) -> &ObjectStateTable {
        &self.table
    }

    pub fn is_reporting(&self) -> bool {
        self.report_touch
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Configure touch reporting after the device was identified. Returns a
    /// lift for every slot known before identification. Reporting stays
    /// disabled if the report config or the input parameters could not be
    /// applied.
    pub fn identify(
        &mut self,
        report_config: &[u8],
        params: InputParams,
    ) -> Result<Vec<Event>, DriverError> {
        self.report_touch = false;
        let program = ReportProgram::decode(report_config)?;
        log::debug!("Got touch report config:\n{program}");

        // Tracked touches stay in place if the parameters cannot be applied
        let slots = self.table.len();
        self.set_input_params(params)?;
        self.program = Some(program);
        self.table.reset();
        self.report_touch = true;

        Ok(release_events(slots))
    }

    /// Use the given parameters if no input parameters have been set yet.
    /// Used when the device is not running application firmware.
    pub fn set_default_params(&mut self, params: InputParams) -> Result<(), DriverError> {
        if !self.table.is_empty() {
            return Ok(());
        }
        log::debug!("Using default input parameters: {params:?}");
        self.set_input_params(params)?;
        Ok(())
    }

    /// Update the input parameters read from the device. Returns true if
    /// any of the parameters changed. The object state table and diagnostic
    /// snapshot are reallocated if the number of objects changed.
    pub fn set_input_params(&mut self, params: InputParams) -> Result<bool, DriverError> {
        let params = match self.config.board.swap_axes {
            true => params.swapped(),
            false => params,
        };
        let resized = params.max_objects as usize != self.table.len();
        let changed = params != self.params || resized;

        if resized {
            log::debug!("Allocating state for {} touch objects", params.max_objects);
            self.table = ObjectStateTable::new(params.max_objects as usize).map_err(|source| {
                DriverError::Alloc {
                    max_objects: params.max_objects,
                    source,
                }
            })?;
            if let Err(e) = self.diag.resize(params.max_objects as usize) {
                log::error!("Failed to allocate diagnostic snapshot, diagnostics unavailable: {e}");
            }
        }
        self.params = params;

        Ok(changed)
    }

    /// Handle a touch report received from the device
    pub fn handle_report(&mut self, report: &[u8]) -> Result<Vec<Event>, DriverError> {
        self.handle_report_at(report, Instant::now())
    }

    /// Handle a touch report received from the device at the given time
    pub fn handle_report_at(
        &mut self,
        report: &[u8],
        now: Instant,
    ) -> Result<Vec<Event>, DriverError> {
        if !self.report_touch {
            log::trace!("Touch reporting disabled, ignoring report");
            return Ok(Vec::new());
        }
        let Some(program) = self.program.as_ref() else {
            return Err(DriverError::NoReportConfig);
        };

        let frame = match TouchFrame::parse(program, report, self.table.len()) {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to parse touch report: {e}");
                return Err(e.into());
            }
        };

        if self.suspended {
            log::trace!("Device suspended, ignoring report");
            return Ok(Vec::new());
        }

        Ok(self.reconcile(&frame, now))
    }

    /// Compare the new frame with the previous state of each slot and
    /// produce the events to report.
    fn reconcile(&mut self, frame: &TouchFrame, now: Instant) -> Vec<Event> {
        let mut events = Vec::new();
        let max_objects = self.table.len().min(frame.objects.len());
        let prev_touch_count = self.table.touch_count();

        // Report the previous position of a finger before its lift event if
        // frames were dropped.
        let dropped_frames = self
            .last_report
            .map_or(true, |last| now.saturating_duration_since(last) > self.config.debounce);
        if dropped_frames {
            let mut replayed = false;
            for (slot, object) in frame.objects.iter().enumerate().take(max_objects) {
                let Some(status) = self.table.effective_status(slot, object.status) else {
                    continue;
                };
                if !status.is_lift_or_palm() {
                    continue;
                }
                let Some(prev) = self.table.touch_info(slot) else {
                    continue;
                };
                log::debug!("Report previous event for slot {slot}");
                let event = ContactInput::new(
                    slot as u32,
                    prev.state,
                    prev.x,
                    prev.y,
                    prev.wx,
                    prev.wy,
                    prev.z + 1,
                );
                events.push(Event::Contact(event));
                replayed = true;
            }
            if replayed {
                events.push(Event::Sync);
            }
        }

        let mut touch_count = 0;
        let mut fingers = Vec::with_capacity(max_objects);
        for (slot, object) in frame.objects.iter().enumerate().take(max_objects) {
            let status = self.table.effective_status(slot, object.status);
            let (x, y) = self.transform(object.x_pos, object.y_pos);
            let z = match object.status != ObjectStatus::Lift && object.z == 0 {
                true => 1,
                false => object.z,
            };

            match status {
                Some(ObjectStatus::Lift) | Some(ObjectStatus::Palm) => {
                    log::trace!("Lift {slot}");
                    let event = LiftInput {
                        slot: slot as u32,
                        status: object.status,
                    };
                    events.push(Event::Lift(event));
                }
                Some(ObjectStatus::Finger) | Some(ObjectStatus::GlovedFinger) => {
                    log::debug!("Finger {slot}: x = {x}, y = {y}");
                    let event = ContactInput::new(
                        slot as u32,
                        object.status,
                        x,
                        y,
                        object.x_width,
                        object.y_width,
                        z,
                    );
                    events.push(Event::Contact(event));
                    touch_count += 1;
                }
                _ => (),
            }

            let info = TouchInfo {
                state: object.status,
                x,
                y,
                wx: object.x_width,
                wy: object.y_width,
                z,
            };
            self.table.update(slot, info);
            fingers.push(info);
        }

        if prev_touch_count > 0 && touch_count == 0 {
            log::debug!("All touches released");
            events.push(Event::Presence(false));
        } else if prev_touch_count == 0 && touch_count > 0 {
            log::debug!("Touch started");
            events.push(Event::Presence(true));
        }
        events.push(Event::Sync);

        self.last_report = Some(now);
        self.diag.publish(&fingers);

        events
    }

    /// Apply the board axis swap and flips to the given position
    fn transform(&self, x: u32, y: u32) -> (u32, u32) {
        let board = self.config.board;
        let (mut x, mut y) = match board.swap_axes {
            true => (y, x),
            false => (x, y),
        };
        if board.x_flip {
            x = self.params.max_x.saturating_sub(x);
        }
        if board.y_flip {
            y = self.params.max_y.saturating_sub(y);
        }
        (x, y)
    }

    /// Report a lift for every object slot and reset the object state
    pub fn free_objects(&mut self) -> Vec<Event> {
        let events = release_events(self.table.len());
        self.table.reset();

        events
    }

    /// Release all touches and stop reporting until resumed
    pub fn suspend(&mut self) -> Vec<Event> {
        let was_touching = self.table.touch_count() > 0;
        let mut events = self.free_objects();
        if was_touching {
            events.push(Event::Presence(false));
        }
        self.suspended = true;

        events
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    /// Stop reporting and release diagnostic consumers
    pub fn teardown(&mut self) {
        self.report_touch = false;
        self.program = None;
        self.table = ObjectStateTable::default();
        self.params = InputParams::default();
        self.last_report = None;
        self.diag.cease();
    }
}

/// Returns a lift for each of the given number of slots followed by a sync
fn release_events(slots: usize) -> Vec<Event> {
    let mut events: Vec<Event> = (0..slots as u32)
        .map(|slot| {
            Event::Lift(LiftInput {
                slot,
                status: ObjectStatus::Lift,
            })
        })
        .collect();
    events.push(Event::Sync);
    events
}
