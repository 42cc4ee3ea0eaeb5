use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::sync::mpsc;

use super::{
    diag::{Diagnostics, PollResult},
    driver::{Driver, DriverConfig, DriverError},
    event::Event,
    InputParams, DIAG_POLL_TIMEOUT,
};

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("touch driver lock was poisoned")]
    Poisoned,
    #[error("{0}")]
    Driver(#[from] DriverError),
    #[error("event receiver was closed")]
    Closed,
}

/// Commands delivered to the touch device worker by the transport layer
#[derive(Debug, Clone)]
pub enum DeviceCommand {
    /// A touch report was read from the device
    Report(Vec<u8>),
    /// A touch report that was read at the given time
    ReportAt(Vec<u8>, Instant),
    /// The device was identified in application mode with the given touch
    /// report config and input parameters
    Identify {
        report_config: Vec<u8>,
        params: InputParams,
    },
    /// The device was reset outside of application mode
    ResetDefaults(InputParams),
    /// Release every touch
    FreeObjects,
    Suspend,
    Resume,
    Stop,
}

/// A touch controller session. Processing of a report, reconciliation and
/// publishing of the diagnostic snapshot all happen while holding the
/// driver lock. Diagnostic consumers wait on the [Diagnostics] directly and
/// never take this lock.
#[derive(Debug)]
pub struct TouchDevice {
    driver: Mutex<Driver>,
    diag: Arc<Diagnostics>,
    /// How long [TouchDevice::poll_diagnostics] waits for a new frame
    poll_timeout: Duration,
}

impl TouchDevice {
    pub fn new(config: DriverConfig) -> Self {
        Self::with_poll_timeout(config, DIAG_POLL_TIMEOUT)
    }

    pub fn with_poll_timeout(config: DriverConfig, poll_timeout: Duration) -> Self {
        let diag = Arc::new(Diagnostics::new());
        let driver = Driver::with_diagnostics(config, diag.clone());
        Self {
            driver: Mutex::new(driver),
            diag,
            poll_timeout,
        }
    }

    fn driver(&self) -> Result<MutexGuard<'_, Driver>, DeviceError> {
        self.driver.lock().map_err(|_| DeviceError::Poisoned)
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        self.diag.clone()
    }

    /// Wait for a diagnostic frame that has not been read yet
    pub async fn poll_diagnostics(&self) -> PollResult {
        self.diag.poll(self.poll_timeout).await
    }

    /// Render the latest diagnostic frame, or an empty string if it was
    /// already read
    pub fn read_diagnostics(&self) -> String {
        self.diag.read()
    }

    pub fn params(&self) -> Result<InputParams, DeviceError> {
        Ok(self.driver()?.params())
    }

    pub fn identify(
        &self,
        report_config: &[u8],
        params: InputParams,
    ) -> Result<Vec<Event>, DeviceError> {
        let events = self.driver()?.identify(report_config, params)?;
        Ok(events)
    }

    pub fn reset_defaults(&self, params: InputParams) -> Result<(), DeviceError> {
        self.driver()?.set_default_params(params)?;
        Ok(())
    }

    pub fn report(&self, report: &[u8]) -> Result<Vec<Event>, DeviceError> {
        self.report_at(report, Instant::now())
    }

    pub fn report_at(&self, report: &[u8], now: Instant) -> Result<Vec<Event>, DeviceError> {
        let events = self.driver()?.handle_report_at(report, now)?;
        Ok(events)
    }

    pub fn free_objects(&self) -> Result<Vec<Event>, DeviceError> {
        Ok(self.driver()?.free_objects())
    }

    pub fn suspend(&self) -> Result<Vec<Event>, DeviceError> {
        Ok(self.driver()?.suspend())
    }

    pub fn resume(&self) -> Result<(), DeviceError> {
        self.driver()?.resume();
        Ok(())
    }

    /// Tear down the session. Waiters on the diagnostic snapshot are woken
    /// up with [super::diag::PollResult::Ceased].
    pub fn remove(&self) {
        match self.driver.lock() {
            Ok(mut driver) => driver.teardown(),
            Err(e) => e.into_inner().teardown(),
        }
    }

    /// Process commands until a [DeviceCommand::Stop] is received or the
    /// command channel closes. Events are forwarded to the given sender in
    /// the order they were produced. Errors for individual reports are logged
    /// and the report is dropped.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<DeviceCommand>,
        tx: mpsc::Sender<Event>,
    ) -> Result<(), DeviceError> {
        log::debug!("Starting touch device worker");
        while let Some(cmd) = rx.recv().await {
            let result = match cmd {
                DeviceCommand::Report(report) => self.report(&report),
                DeviceCommand::ReportAt(report, now) => self.report_at(&report, now),
                DeviceCommand::Identify {
                    report_config,
                    params,
                } => self.identify(&report_config, params),
                DeviceCommand::ResetDefaults(params) => {
                    self.reset_defaults(params).map(|_| Vec::new())
                }
                DeviceCommand::FreeObjects => self.free_objects(),
                DeviceCommand::Suspend => self.suspend(),
                DeviceCommand::Resume => self.resume().map(|_| Vec::new()),
                DeviceCommand::Stop => {
                    log::debug!("Received stop command");
                    break;
                }
            };

            let events = match result {
                Ok(events) => events,
                Err(DeviceError::Poisoned) => return Err(DeviceError::Poisoned),
                Err(e) => {
                    log::warn!("Dropping touch command: {e}");
                    continue;
                }
            };
            for event in events {
                if tx.send(event).await.is_err() {
                    log::debug!("Event receiver closed");
                    self.remove();
                    return Err(DeviceError::Closed);
                }
            }
        }

        self.remove();
        log::debug!("Touch device worker stopped");

        Ok(())
    }
}
