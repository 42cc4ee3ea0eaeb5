use serde::{Deserialize, Serialize};

use super::touch_report::ObjectStatus;

/// Events emitted by the touch driver, in the order they should be delivered
/// to the input subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// A finger is in contact with the given slot
    Contact(ContactInput),
    /// The slot is no longer in contact
    Lift(LiftInput),
    /// End of a batch of slot updates
    Sync,
    /// The set of active touches went from empty to non-empty or back
    Presence(bool),
}

/// Position, size and pressure of a contact in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContactInput {
    pub slot: u32,
    pub status: ObjectStatus,
    pub x: u32,
    pub y: u32,
    pub touch_major: u32,
    pub touch_minor: u32,
    /// 1 if the contact is wider along the x axis
    pub orientation: u32,
    pub pressure: u32,
}

impl ContactInput {
    /// Build a contact from the raw widths reported by the device
    pub fn new(
        slot: u32,
        status: ObjectStatus,
        x: u32,
        y: u32,
        x_width: u32,
        y_width: u32,
        pressure: u32,
    ) -> Self {
        Self {
            slot,
            status,
            x,
            y,
            touch_major: x_width.max(y_width),
            touch_minor: x_width.min(y_width),
            orientation: (x_width > y_width) as u32,
            pressure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LiftInput {
    pub slot: u32,
    /// Status that caused the lift, either a lift or a palm
    pub status: ObjectStatus,
}
