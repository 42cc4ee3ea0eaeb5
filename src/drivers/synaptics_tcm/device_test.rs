use std::{error::Error, sync::Arc, time::Duration};

use tokio::sync::mpsc;

use crate::drivers::synaptics_tcm::{
    device::{DeviceCommand, DeviceError, TouchDevice},
    diag::PollResult,
    driver::DriverConfig,
    event::{Event, LiftInput},
    report_config::ReportProgram,
    touch_report::ObjectStatus,
    InputParams,
};

/// Encode a single object in the layout of the default report config
fn default_object(index: u8, class: u8, x: u16, y: u16) -> Vec<u8> {
    let value = (index as u32 & 0xf)
        | ((class as u32 & 0xf) << 4)
        | ((x as u32 & 0xfff) << 8)
        | ((y as u32 & 0xfff) << 20);
    value.to_le_bytes().to_vec()
}

#[test]
fn test_device_reports() -> Result<(), Box<dyn Error>> {
    let device = TouchDevice::new(DriverConfig::default());
    let config = ReportProgram::default_config(false).encode_padded(128)?;
    device.identify(&config, InputParams::new(1079, 2159, 10))?;
    assert_eq!(device.params()?, InputParams::new(1079, 2159, 10));

    let events = device.report(&default_object(1, 1, 100, 200))?;
    assert_eq!(events.len(), 3);
    assert_eq!(events[1], Event::Presence(true));

    let diag = device.diagnostics();
    assert!(diag.is_fresh());

    device.remove();
    assert!(diag.is_ceased());
    let events = device.report(&default_object(1, 0, 0, 0))?;
    assert!(events.is_empty());

    Ok(())
}

#[test]
fn test_device_parse_error() -> Result<(), Box<dyn Error>> {
    let device = TouchDevice::new(DriverConfig::default());
    // Timestamp with an invalid width
    device.identify(&[0x05, 0x00, 0x00], InputParams::new(100, 100, 2))?;
    let result = device.report(&[0xff; 4]);
    assert!(matches!(result, Err(DeviceError::Driver(_))));

    Ok(())
}

#[tokio::test]
async fn test_device_worker() -> Result<(), Box<dyn Error>> {
    let device = Arc::new(TouchDevice::new(DriverConfig::default()));
    let diag = device.diagnostics();
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let worker = tokio::spawn(device.clone().run(cmd_rx, event_tx));

    let report_config = ReportProgram::default_config(false).encode();
    cmd_tx
        .send(DeviceCommand::Identify {
            report_config,
            params: InputParams::new(1079, 2159, 2),
        })
        .await?;
    cmd_tx.send(DeviceCommand::Report(default_object(1, 1, 100, 200))).await?;
    assert_eq!(diag.poll(Duration::from_secs(1)).await, PollResult::Ready);
    cmd_tx.send(DeviceCommand::FreeObjects).await?;
    cmd_tx.send(DeviceCommand::Stop).await?;

    tokio::time::timeout(Duration::from_secs(1), worker).await???;

    let mut events = Vec::new();
    while let Some(event) = event_rx.recv().await {
        events.push(event);
    }
    let lift = |slot| {
        Event::Lift(LiftInput {
            slot,
            status: ObjectStatus::Lift,
        })
    };
    assert_eq!(events[0], Event::Sync);
    assert!(matches!(events[1], Event::Contact(contact) if contact.slot == 1 && contact.x == 100));
    assert_eq!(
        &events[2..],
        &[Event::Presence(true), Event::Sync, lift(0), lift(1), Event::Sync]
    );
    assert!(diag.is_ceased());

    Ok(())
}

#[tokio::test]
async fn test_device_worker_closed_receiver() -> Result<(), Box<dyn Error>> {
    let device = Arc::new(TouchDevice::new(DriverConfig::default()));
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);
    drop(event_rx);
    let worker = tokio::spawn(device.clone().run(cmd_rx, event_tx));

    cmd_tx
        .send(DeviceCommand::Identify {
            report_config: ReportProgram::default_config(false).encode(),
            params: InputParams::new(1079, 2159, 2),
        })
        .await?;

    let result = tokio::time::timeout(Duration::from_secs(1), worker).await??;
    assert!(matches!(result, Err(DeviceError::Closed)));
    assert!(device.diagnostics().is_ceased());

    Ok(())
}

#[tokio::test]
async fn test_device_poll_diagnostics() -> Result<(), Box<dyn Error>> {
    let device =
        TouchDevice::with_poll_timeout(DriverConfig::default(), Duration::from_millis(10));
    device.identify(
        &ReportProgram::default_config(false).encode(),
        InputParams::new(1079, 2159, 2),
    )?;
    assert_eq!(device.poll_diagnostics().await, PollResult::TimedOut);

    device.report(&default_object(1, 1, 100, 200))?;
    assert_eq!(device.poll_diagnostics().await, PollResult::Ready);
    let text = device.read_diagnostics();
    assert_eq!(
        text.lines().nth(1),
        Some("id=1,state=1,x=100,y=200,wx=0,wy=0,z=1")
    );
    assert_eq!(device.poll_diagnostics().await, PollResult::TimedOut);
    assert_eq!(device.read_diagnostics(), "");

    device.remove();
    assert_eq!(device.poll_diagnostics().await, PollResult::Ceased);

    Ok(())
}
