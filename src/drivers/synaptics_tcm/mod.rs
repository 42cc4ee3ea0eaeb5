pub mod bits;
pub mod device;
pub mod diag;
pub mod driver;
pub mod event;
pub mod report_config;
pub mod touch_report;

#[cfg(test)]
pub mod device_test;
#[cfg(test)]
pub mod diag_test;
#[cfg(test)]
pub mod driver_test;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum size of the buffer used to send a touch report config to the device
pub const TOUCH_REPORT_CONFIG_SIZE: usize = 128;
/// Frame interval after which the last known position is replayed before a lift
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(40);
/// How long a diagnostic consumer waits for a new frame
pub const DIAG_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Input parameters read from the application info of the device
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct InputParams {
    pub max_x: u32,
    pub max_y: u32,
    pub max_objects: u32,
}

impl InputParams {
    pub fn new(max_x: u32, max_y: u32, max_objects: u32) -> Self {
        Self {
            max_x,
            max_y,
            max_objects,
        }
    }

    /// Returns the parameters with the x and y axis limits exchanged
    pub fn swapped(&self) -> Self {
        Self {
            max_x: self.max_y,
            max_y: self.max_x,
            max_objects: self.max_objects,
        }
    }
}
