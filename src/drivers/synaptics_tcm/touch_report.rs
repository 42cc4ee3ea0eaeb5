use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    bits::{extract_bits, BitsError},
    report_config::{Field, Instruction, ReportProgram},
};

/// Classification reported for a touch object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    #[default]
    Lift,
    Finger,
    GlovedFinger,
    Palm,
    /// Any classification the driver does not interpret
    Other(u32),
}

impl ObjectStatus {
    pub fn from_raw(value: u32) -> Self {
        match value {
            0 => ObjectStatus::Lift,
            1 => ObjectStatus::Finger,
            2 => ObjectStatus::GlovedFinger,
            6 => ObjectStatus::Palm,
            _ => ObjectStatus::Other(value),
        }
    }

    pub fn to_raw(&self) -> u32 {
        match self {
            ObjectStatus::Lift => 0,
            ObjectStatus::Finger => 1,
            ObjectStatus::GlovedFinger => 2,
            ObjectStatus::Palm => 6,
            ObjectStatus::Other(value) => *value,
        }
    }

    /// Returns true if the object is a finger or gloved finger in contact
    pub fn is_touching(&self) -> bool {
        matches!(self, ObjectStatus::Finger | ObjectStatus::GlovedFinger)
    }

    /// Returns true for statuses that are reported as a lift. Palms are
    /// ignored and therefore reported the same way.
    pub fn is_lift_or_palm(&self) -> bool {
        matches!(self, ObjectStatus::Lift | ObjectStatus::Palm)
    }
}

/// Per object data decoded from a touch report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectData {
    pub status: ObjectStatus,
    pub x_pos: u32,
    pub y_pos: u32,
    pub x_width: u32,
    pub y_width: u32,
    pub z: u32,
    pub tx_pos: u32,
    pub rx_pos: u32,
}

/// Possible errors parsing a touch report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("failed to get {field}: {source}")]
    Field { field: Field, source: BitsError },
    #[error("number of active objects read again at instruction {0} after the first loop iteration")]
    ActiveCountReread(usize),
}

/// Loop state while interpreting the report config
#[derive(Debug, Clone, Copy)]
struct LoopState {
    /// Instruction to jump back to when the loop repeats
    next: usize,
    active_only: bool,
    /// Completed iterations of the current loop
    iterations: u32,
    /// Bit offset when the current iteration started
    iteration_offset: usize,
    /// Whether the active object count was read within this loop
    count_read: bool,
}

/// All data decoded from a single touch report. A new frame is produced for
/// every report and discarded once it has been reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TouchFrame {
    pub objects: Vec<ObjectData>,
    pub timestamp: u32,
    pub buttons_state: u32,
    pub gesture_double_tap: u32,
    pub frame_rate: u32,
    pub power_im: u32,
    pub cid_im: u32,
    pub rail_im: u32,
    pub cid_variance_im: u32,
    pub nsm_frequency: u32,
    pub nsm_state: u32,
    pub num_of_active_objects: u32,
    pub num_of_cpu_cycles: u32,
}

impl TouchFrame {
    /// Create an empty frame with room for the given number of objects
    pub fn new(max_objects: usize) -> Self {
        Self {
            objects: vec![ObjectData::default(); max_objects],
            ..Default::default()
        }
    }

    /// Traverse the touch report config and parse the touch report generated
    /// by the device accordingly.
    pub fn parse(
        program: &ReportProgram,
        report: &[u8],
        max_objects: usize,
    ) -> Result<Self, ParseError> {
        let mut frame = TouchFrame::new(max_objects);
        let report_bits = report.len() * 8;

        let mut idx = 0;
        let mut offset: usize = 0;
        let mut obj: usize = 0;
        let mut active_objects: Option<u32> = None;
        let mut state: Option<LoopState> = None;

        while let Some(instruction) = program.get(idx) {
            let current = idx;
            idx += 1;
            match *instruction {
                Instruction::End => break,
                Instruction::ForeachActiveObject | Instruction::ForeachObject => {
                    obj = 0;
                    state = Some(LoopState {
                        next: idx,
                        active_only: matches!(instruction, Instruction::ForeachActiveObject),
                        iterations: 0,
                        iteration_offset: offset,
                        count_read: false,
                    });
                }
                Instruction::ForeachEnd => {
                    let Some(mut info) = state else {
                        continue;
                    };
                    info.iterations += 1;
                    let repeat = if info.active_only {
                        match active_objects {
                            Some(count) => info.iterations < count && offset < report_bits,
                            // Free running until the number of active objects
                            // is known. Stop if the body made no progress.
                            None => offset < report_bits && offset > info.iteration_offset,
                        }
                    } else {
                        obj += 1;
                        obj < max_objects
                    };
                    if repeat {
                        idx = info.next;
                        info.iteration_offset = offset;
                        state = Some(info);
                    } else {
                        state = None;
                    }
                }
                Instruction::PadToNextByte => {
                    offset = offset.div_ceil(8) * 8;
                }
                Instruction::Skip { code, bits } => {
                    log::trace!("Skipping {bits} bits for code {code:#04x}");
                    offset += bits as usize;
                }
                Instruction::Field { field, bits } => {
                    let data = extract_bits(report, offset, bits as u32)
                        .map_err(|source| ParseError::Field { field, source })?;
                    log::trace!("Read {field} at bit {offset}: {data}");
                    offset += bits as usize;

                    if field == Field::ObjectIndex {
                        obj = data as usize;
                        continue;
                    }
                    if field == Field::NumActiveObjects {
                        if let Some(info) = state.as_mut().filter(|info| info.active_only) {
                            if info.count_read || info.iterations > 0 {
                                return Err(ParseError::ActiveCountReread(current));
                            }
                            info.count_read = true;
                        }
                        active_objects = Some(data);
                        frame.num_of_active_objects = data;
                        if data == 0 {
                            if let Some(target) = program.skip_target(current) {
                                idx = target;
                                state = None;
                            }
                        }
                        continue;
                    }
                    frame.store(field, obj, data);
                }
            }
        }

        Ok(frame)
    }

    /// Store a decoded value in the frame or in the object at the given index
    fn store(&mut self, field: Field, obj: usize, data: u32) {
        let object_field = matches!(
            field,
            Field::ObjectClassification
                | Field::ObjectXPosition
                | Field::ObjectYPosition
                | Field::ObjectZ
                | Field::ObjectXWidth
                | Field::ObjectYWidth
                | Field::ObjectTxPosition
                | Field::ObjectRxPosition
        );
        if object_field {
            let Some(object) = self.objects.get_mut(obj) else {
                log::warn!(
                    "Dropping {field} for object {obj} which exceeds the maximum of {} objects",
                    self.objects.len()
                );
                return;
            };
            match field {
                Field::ObjectClassification => object.status = ObjectStatus::from_raw(data),
                Field::ObjectXPosition => object.x_pos = data,
                Field::ObjectYPosition => object.y_pos = data,
                Field::ObjectZ => object.z = data,
                Field::ObjectXWidth => object.x_width = data,
                Field::ObjectYWidth => object.y_width = data,
                Field::ObjectTxPosition => object.tx_pos = data,
                Field::ObjectRxPosition => object.rx_pos = data,
                _ => (),
            }
            return;
        }

        match field {
            Field::Timestamp => self.timestamp = data,
            Field::ButtonsState => self.buttons_state = data,
            Field::GestureDoubleTap => self.gesture_double_tap = data,
            Field::FrameRate => self.frame_rate = data,
            Field::PowerIm => self.power_im = data,
            Field::CidIm => self.cid_im = data,
            Field::RailIm => self.rail_im = data,
            Field::CidVarianceIm => self.cid_variance_im = data,
            Field::NsmFrequency => self.nsm_frequency = data,
            Field::NsmState => self.nsm_state = data,
            Field::NumActiveObjects => self.num_of_active_objects = data,
            Field::NumCpuCycles => self.num_of_cpu_cycles = data,
            _ => (),
        }
    }

    /// Returns the number of objects classified as a finger or gloved finger
    pub fn touch_count(&self) -> usize {
        self.objects
            .iter()
            .filter(|object| object.status.is_touching())
            .count()
    }
}
