use std::fmt::Display;

use thiserror::Error;

use super::TOUCH_REPORT_CONFIG_SIZE;

/// Structural and field codes used in the touch report config
pub mod code {
    pub const END: u8 = 0x00;
    pub const FOREACH_ACTIVE_OBJECT: u8 = 0x01;
    pub const FOREACH_OBJECT: u8 = 0x02;
    pub const FOREACH_END: u8 = 0x03;
    pub const PAD_TO_NEXT_BYTE: u8 = 0x04;
    pub const TIMESTAMP: u8 = 0x05;
    pub const OBJECT_N_INDEX: u8 = 0x06;
    pub const OBJECT_N_CLASSIFICATION: u8 = 0x07;
    pub const OBJECT_N_X_POSITION: u8 = 0x08;
    pub const OBJECT_N_Y_POSITION: u8 = 0x09;
    pub const OBJECT_N_Z: u8 = 0x0a;
    pub const OBJECT_N_X_WIDTH: u8 = 0x0b;
    pub const OBJECT_N_Y_WIDTH: u8 = 0x0c;
    pub const OBJECT_N_TX_POSITION_TIXELS: u8 = 0x0d;
    pub const OBJECT_N_RX_POSITION_TIXELS: u8 = 0x0e;
    pub const BUTTONS_0D_STATE: u8 = 0x0f;
    pub const GESTURE_DOUBLE_TAP: u8 = 0x10;
    pub const FRAME_RATE: u8 = 0x11;
    pub const POWER_IM: u8 = 0x12;
    pub const CID_IM: u8 = 0x13;
    pub const RAIL_IM: u8 = 0x14;
    pub const CID_VARIANCE_IM: u8 = 0x15;
    pub const NSM_FREQUENCY: u8 = 0x16;
    pub const NSM_STATE: u8 = 0x17;
    pub const NUM_OF_ACTIVE_OBJECTS: u8 = 0x18;
    pub const NUM_OF_CPU_CYCLES_USED_SINCE_LAST_FRAME: u8 = 0x19;
    pub const TUNING_GAUSSIAN_WIDTHS: u8 = 0x80;
    pub const TUNING_SMALL_OBJECT_PARAMS: u8 = 0x81;
    pub const TUNING_0D_BUTTONS_VARIANCE: u8 = 0x82;
}

/// Report fields that are extracted and stored while parsing a touch report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Timestamp,
    ObjectIndex,
    ObjectClassification,
    ObjectXPosition,
    ObjectYPosition,
    ObjectZ,
    ObjectXWidth,
    ObjectYWidth,
    ObjectTxPosition,
    ObjectRxPosition,
    ButtonsState,
    GestureDoubleTap,
    FrameRate,
    PowerIm,
    CidIm,
    RailIm,
    CidVarianceIm,
    NsmFrequency,
    NsmState,
    NumActiveObjects,
    NumCpuCycles,
}

impl Field {
    /// Returns the field for the given code, or None if the code carries no
    /// data the parser keeps.
    pub fn from_code(value: u8) -> Option<Self> {
        let field = match value {
            code::TIMESTAMP => Field::Timestamp,
            code::OBJECT_N_INDEX => Field::ObjectIndex,
            code::OBJECT_N_CLASSIFICATION => Field::ObjectClassification,
            code::OBJECT_N_X_POSITION => Field::ObjectXPosition,
            code::OBJECT_N_Y_POSITION => Field::ObjectYPosition,
            code::OBJECT_N_Z => Field::ObjectZ,
            code::OBJECT_N_X_WIDTH => Field::ObjectXWidth,
            code::OBJECT_N_Y_WIDTH => Field::ObjectYWidth,
            code::OBJECT_N_TX_POSITION_TIXELS => Field::ObjectTxPosition,
            code::OBJECT_N_RX_POSITION_TIXELS => Field::ObjectRxPosition,
            code::BUTTONS_0D_STATE => Field::ButtonsState,
            code::GESTURE_DOUBLE_TAP => Field::GestureDoubleTap,
            code::FRAME_RATE => Field::FrameRate,
            code::POWER_IM => Field::PowerIm,
            code::CID_IM => Field::CidIm,
            code::RAIL_IM => Field::RailIm,
            code::CID_VARIANCE_IM => Field::CidVarianceIm,
            code::NSM_FREQUENCY => Field::NsmFrequency,
            code::NSM_STATE => Field::NsmState,
            code::NUM_OF_ACTIVE_OBJECTS => Field::NumActiveObjects,
            code::NUM_OF_CPU_CYCLES_USED_SINCE_LAST_FRAME => Field::NumCpuCycles,
            _ => return None,
        };
        Some(field)
    }

    pub fn to_code(&self) -> u8 {
        match self {
            Field::Timestamp => code::TIMESTAMP,
            Field::ObjectIndex => code::OBJECT_N_INDEX,
            Field::ObjectClassification => code::OBJECT_N_CLASSIFICATION,
            Field::ObjectXPosition => code::OBJECT_N_X_POSITION,
            Field::ObjectYPosition => code::OBJECT_N_Y_POSITION,
            Field::ObjectZ => code::OBJECT_N_Z,
            Field::ObjectXWidth => code::OBJECT_N_X_WIDTH,
            Field::ObjectYWidth => code::OBJECT_N_Y_WIDTH,
            Field::ObjectTxPosition => code::OBJECT_N_TX_POSITION_TIXELS,
            Field::ObjectRxPosition => code::OBJECT_N_RX_POSITION_TIXELS,
            Field::ButtonsState => code::BUTTONS_0D_STATE,
            Field::GestureDoubleTap => code::GESTURE_DOUBLE_TAP,
            Field::FrameRate => code::FRAME_RATE,
            Field::PowerIm => code::POWER_IM,
            Field::CidIm => code::CID_IM,
            Field::RailIm => code::RAIL_IM,
            Field::CidVarianceIm => code::CID_VARIANCE_IM,
            Field::NsmFrequency => code::NSM_FREQUENCY,
            Field::NsmState => code::NSM_STATE,
            Field::NumActiveObjects => code::NUM_OF_ACTIVE_OBJECTS,
            Field::NumCpuCycles => code::NUM_OF_CPU_CYCLES_USED_SINCE_LAST_FRAME,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Timestamp => "timestamp",
            Field::ObjectIndex => "object index",
            Field::ObjectClassification => "object classification",
            Field::ObjectXPosition => "object x position",
            Field::ObjectYPosition => "object y position",
            Field::ObjectZ => "object z",
            Field::ObjectXWidth => "object x width",
            Field::ObjectYWidth => "object y width",
            Field::ObjectTxPosition => "object tx position",
            Field::ObjectRxPosition => "object rx position",
            Field::ButtonsState => "0D buttons state",
            Field::GestureDoubleTap => "gesture double tap",
            Field::FrameRate => "frame rate",
            Field::PowerIm => "power IM",
            Field::CidIm => "CID IM",
            Field::RailIm => "rail IM",
            Field::CidVarianceIm => "CID variance IM",
            Field::NsmFrequency => "NSM frequency",
            Field::NsmState => "NSM state",
            Field::NumActiveObjects => "number of active objects",
            Field::NumCpuCycles => "number of CPU cycles used since last frame",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single decoded entry of the touch report config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Stop parsing the report
    End,
    /// Start of a loop over the objects reported as active
    ForeachActiveObject,
    /// Start of a loop over every object slot
    ForeachObject,
    /// End of the current loop
    ForeachEnd,
    /// Advance the bit offset to the next byte boundary
    PadToNextByte,
    /// Read `bits` bits into the given field
    Field { field: Field, bits: u8 },
    /// Skip `bits` bits of a tuning or unknown entry
    Skip { code: u8, bits: u8 },
}

impl Instruction {
    /// Append the raw config bytes for this instruction
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Instruction::End => out.push(code::END),
            Instruction::ForeachActiveObject => out.push(code::FOREACH_ACTIVE_OBJECT),
            Instruction::ForeachObject => out.push(code::FOREACH_OBJECT),
            Instruction::ForeachEnd => out.push(code::FOREACH_END),
            Instruction::PadToNextByte => out.push(code::PAD_TO_NEXT_BYTE),
            Instruction::Field { field, bits } => {
                out.push(field.to_code());
                out.push(*bits);
            }
            Instruction::Skip { code, bits } => {
                out.push(*code);
                out.push(*bits);
            }
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::End => write!(f, "END"),
            Instruction::ForeachActiveObject => write!(f, "FOREACH_ACTIVE_OBJECT"),
            Instruction::ForeachObject => write!(f, "FOREACH_OBJECT"),
            Instruction::ForeachEnd => write!(f, "FOREACH_END"),
            Instruction::PadToNextByte => write!(f, "PAD_TO_NEXT_BYTE"),
            Instruction::Field { field, bits } => write!(f, "FIELD {field} ({bits} bits)"),
            Instruction::Skip { code, bits } => write!(f, "SKIP {code:#04x} ({bits} bits)"),
        }
    }
}

/// Possible errors decoding a touch report config
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("code `{code:#04x}` at byte {offset} is missing its bit length")]
    MissingBits { code: u8, offset: usize },
    #[error("loop started at instruction {inner} is nested in the loop started at instruction {outer}")]
    NestedLoop { outer: usize, inner: usize },
    #[error("loop end at instruction {0} has no matching loop start")]
    UnmatchedLoopEnd(usize),
    #[error("loop started at instruction {0} is never closed")]
    UnterminatedLoop(usize),
    #[error("maximum touch report config size `{size}` is smaller than 128 bytes")]
    ConfigSizeTooSmall { size: usize },
    #[error("encoded touch report config is {len} bytes which exceeds the maximum size `{size}`")]
    ConfigTooLarge { len: usize, size: usize },
}

/// Loop bounds resolved when the program is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopInfo {
    /// Index of the loop start instruction
    pub start: usize,
    /// Index of the matching loop end instruction
    pub end: usize,
    /// Whether the loop only iterates over active objects
    pub active_only: bool,
}

/// A decoded and validated touch report config. The config is sent by the
/// device during identification and describes the layout of every touch
/// report that follows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportProgram {
    instructions: Vec<Instruction>,
    loops: Vec<LoopInfo>,
    /// For each instruction, the index of the loop it is contained in
    enclosing: Vec<Option<usize>>,
    /// For each active object count field, the instruction to jump to when
    /// the count is zero
    skip_targets: Vec<Option<usize>>,
}

impl ReportProgram {
    /// Decode the raw touch report config bytes. Bytes after the first `END`
    /// code are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, ProgramError> {
        let mut instructions = Vec::new();
        let mut idx = 0;
        while idx < data.len() {
            let offset = idx;
            let value = data[idx];
            idx += 1;
            let instruction = match value {
                code::END => Instruction::End,
                code::FOREACH_ACTIVE_OBJECT => Instruction::ForeachActiveObject,
                code::FOREACH_OBJECT => Instruction::ForeachObject,
                code::FOREACH_END => Instruction::ForeachEnd,
                code::PAD_TO_NEXT_BYTE => Instruction::PadToNextByte,
                _ => {
                    let Some(bits) = data.get(idx).copied() else {
                        return Err(ProgramError::MissingBits {
                            code: value,
                            offset,
                        });
                    };
                    idx += 1;
                    match Field::from_code(value) {
                        Some(field) => Instruction::Field { field, bits },
                        None => Instruction::Skip { code: value, bits },
                    }
                }
            };
            instructions.push(instruction);
            if instruction == Instruction::End {
                break;
            }
        }

        Self::from_instructions(instructions)
    }

    /// Build a program from already decoded instructions, validating that
    /// every loop is closed and that loops do not nest.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Result<Self, ProgramError> {
        let mut loops: Vec<LoopInfo> = Vec::new();
        let mut enclosing = vec![None; instructions.len()];
        let mut open: Option<(usize, bool)> = None;

        for (idx, instruction) in instructions.iter().enumerate() {
            match instruction {
                Instruction::ForeachActiveObject | Instruction::ForeachObject => {
                    if let Some((outer, _)) = open {
                        return Err(ProgramError::NestedLoop { outer, inner: idx });
                    }
                    let active_only = matches!(instruction, Instruction::ForeachActiveObject);
                    open = Some((idx, active_only));
                }
                Instruction::ForeachEnd => {
                    let Some((start, active_only)) = open.take() else {
                        return Err(ProgramError::UnmatchedLoopEnd(idx));
                    };
                    let loop_idx = loops.len();
                    loops.push(LoopInfo {
                        start,
                        end: idx,
                        active_only,
                    });
                    for entry in enclosing.iter_mut().take(idx + 1).skip(start) {
                        *entry = Some(loop_idx);
                    }
                }
                Instruction::End => break,
                _ => (),
            }
        }
        if let Some((start, _)) = open {
            return Err(ProgramError::UnterminatedLoop(start));
        }

        // A zero active object count skips past the loop it belongs to: the
        // enclosing active loop, or the next active loop after it.
        let skip_targets = instructions
            .iter()
            .enumerate()
            .map(|(idx, instruction)| {
                let Instruction::Field {
                    field: Field::NumActiveObjects,
                    ..
                } = instruction
                else {
                    return None;
                };
                if let Some(loop_idx) = enclosing[idx] {
                    let info = loops[loop_idx];
                    return info.active_only.then_some(info.end + 1);
                }
                loops
                    .iter()
                    .find(|info| info.active_only && info.start > idx)
                    .map(|info| info.end + 1)
            })
            .collect();

        Ok(Self {
            instructions,
            loops,
            enclosing,
            skip_targets,
        })
    }

    /// Returns the report config the host installs on the device when it
    /// does not use the firmware default.
    pub fn default_config(double_tap: bool) -> Self {
        let mut instructions = Vec::new();
        if double_tap {
            instructions.push(Instruction::Field {
                field: Field::GestureDoubleTap,
                bits: 8,
            });
        }
        instructions.extend([
            Instruction::ForeachActiveObject,
            Instruction::Field {
                field: Field::ObjectIndex,
                bits: 4,
            },
            Instruction::Field {
                field: Field::ObjectClassification,
                bits: 4,
            },
            Instruction::Field {
                field: Field::ObjectXPosition,
                bits: 12,
            },
            Instruction::Field {
                field: Field::ObjectYPosition,
                bits: 12,
            },
            Instruction::ForeachEnd,
            Instruction::End,
        ]);

        // The instruction list above is well formed
        Self::from_instructions(instructions).unwrap_or_default()
    }

    /// Encode the program back into raw config bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.instructions.len() * 2);
        for instruction in self.instructions.iter() {
            instruction.encode(&mut out);
        }
        out
    }

    /// Encode the program into a zero padded buffer of the maximum touch
    /// report config size advertised by the device.
    pub fn encode_padded(&self, max_config_size: usize) -> Result<Vec<u8>, ProgramError> {
        if max_config_size < TOUCH_REPORT_CONFIG_SIZE {
            return Err(ProgramError::ConfigSizeTooSmall {
                size: max_config_size,
            });
        }
        let mut out = self.encode();
        if out.len() > max_config_size {
            return Err(ProgramError::ConfigTooLarge {
                len: out.len(),
                size: max_config_size,
            });
        }
        out.resize(max_config_size, 0);
        Ok(out)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Instruction> {
        self.instructions.get(idx)
    }

    /// Returns the loop containing the instruction at the given index
    pub fn enclosing_loop(&self, idx: usize) -> Option<&LoopInfo> {
        let loop_idx = (*self.enclosing.get(idx)?)?;
        self.loops.get(loop_idx)
    }

    /// Returns the instruction to continue from when the active object count
    /// read at the given index is zero.
    pub fn skip_target(&self, idx: usize) -> Option<usize> {
        *self.skip_targets.get(idx)?
    }
}

impl Display for ReportProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut depth = 0;
        for (idx, instruction) in self.instructions.iter().enumerate() {
            if matches!(instruction, Instruction::ForeachEnd) {
                depth = 0;
            }
            writeln!(f, "{idx:>3}: {:indent$}{instruction}", "", indent = depth * 2)?;
            if matches!(
                instruction,
                Instruction::ForeachActiveObject | Instruction::ForeachObject
            ) {
                depth = 1;
            }
        }
        Ok(())
    }
}
