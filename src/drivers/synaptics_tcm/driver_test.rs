use std::{
    error::Error,
    time::{Duration, Instant},
};

use crate::drivers::synaptics_tcm::{
    driver::{BoardData, Driver, DriverConfig, DriverError},
    event::{ContactInput, Event, LiftInput},
    report_config::{code, ProgramError},
    touch_report::{ObjectStatus, ParseError},
    InputParams,
};

/// Report config with 8 bytes per object for every object slot
const REPORT_CONFIG: &[u8] = &[
    code::FOREACH_OBJECT,
    code::OBJECT_N_CLASSIFICATION,
    8,
    code::OBJECT_N_X_POSITION,
    16,
    code::OBJECT_N_Y_POSITION,
    16,
    code::OBJECT_N_X_WIDTH,
    8,
    code::OBJECT_N_Y_WIDTH,
    8,
    code::OBJECT_N_Z,
    8,
    code::FOREACH_END,
    code::END,
];

/// Report config that reads the number of active objects inside the loop
const ACTIVE_REPORT_CONFIG: &[u8] = &[
    code::FOREACH_ACTIVE_OBJECT,
    code::NUM_OF_ACTIVE_OBJECTS,
    8,
    code::OBJECT_N_INDEX,
    8,
    code::OBJECT_N_CLASSIFICATION,
    8,
    code::FOREACH_END,
    code::END,
];

const MAX_OBJECTS: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
struct Object {
    status: u8,
    x: u16,
    y: u16,
    wx: u8,
    wy: u8,
    z: u8,
}

impl Object {
    fn finger(x: u16, y: u16) -> Self {
        Self {
            status: 1,
            x,
            y,
            wx: 5,
            wy: 3,
            z: 20,
        }
    }

    fn palm() -> Self {
        Self {
            status: 6,
            ..Default::default()
        }
    }
}

/// Build a touch report with the given objects in their slots
fn build_report(objects: &[(usize, Object)]) -> Vec<u8> {
    let mut slots = [Object::default(); MAX_OBJECTS];
    for (slot, object) in objects {
        slots[*slot] = *object;
    }
    let mut report = Vec::new();
    for object in slots {
        report.push(object.status);
        report.extend(object.x.to_le_bytes());
        report.extend(object.y.to_le_bytes());
        report.push(object.wx);
        report.push(object.wy);
        report.push(object.z);
    }
    report
}

fn setup(board: BoardData) -> Result<Driver, Box<dyn Error>> {
    let config = DriverConfig {
        board,
        ..Default::default()
    };
    let mut driver = Driver::new(config);
    let events = driver.identify(REPORT_CONFIG, InputParams::new(1079, 2159, MAX_OBJECTS as u32))?;
    // No slots were allocated yet
    assert_eq!(events, vec![Event::Sync]);
    assert!(driver.is_reporting());
    Ok(driver)
}

fn contact(slot: u32, x: u32, y: u32, pressure: u32) -> Event {
    Event::Contact(ContactInput::new(
        slot,
        ObjectStatus::Finger,
        x,
        y,
        5,
        3,
        pressure,
    ))
}

fn lift(slot: u32, status: ObjectStatus) -> Event {
    Event::Lift(LiftInput { slot, status })
}

#[test]
fn test_quick_lift() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let start = Instant::now();

    let report = build_report(&[(2, Object::finger(300, 400))]);
    let events = driver.handle_report_at(&report, start)?;
    assert_eq!(
        events,
        vec![contact(2, 300, 400, 20), Event::Presence(true), Event::Sync]
    );

    let report = build_report(&[]);
    let events = driver.handle_report_at(&report, start + Duration::from_millis(10))?;
    assert_eq!(
        events,
        vec![
            lift(2, ObjectStatus::Lift),
            Event::Presence(false),
            Event::Sync
        ]
    );

    Ok(())
}

#[test]
fn test_replay_after_dropped_frames() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let start = Instant::now();

    let report = build_report(&[(2, Object::finger(300, 400))]);
    driver.handle_report_at(&report, start)?;

    let report = build_report(&[]);
    let events = driver.handle_report_at(&report, start + Duration::from_millis(50))?;
    assert_eq!(
        events,
        vec![
            contact(2, 300, 400, 21),
            Event::Sync,
            lift(2, ObjectStatus::Lift),
            Event::Presence(false),
            Event::Sync
        ]
    );

    Ok(())
}

#[test]
fn test_presence_edges() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let start = Instant::now();

    let report = build_report(&[(0, Object::finger(10, 20))]);
    let events = driver.handle_report_at(&report, start)?;
    assert_eq!(
        events,
        vec![contact(0, 10, 20, 20), Event::Presence(true), Event::Sync]
    );

    let report = build_report(&[(0, Object::finger(11, 21)), (1, Object::finger(500, 600))]);
    let events = driver.handle_report_at(&report, start + Duration::from_millis(10))?;
    assert_eq!(
        events,
        vec![contact(0, 11, 21, 20), contact(1, 500, 600, 20), Event::Sync]
    );
    assert_eq!(driver.state().touch_count(), 2);

    Ok(())
}

#[test]
fn test_palm() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let start = Instant::now();

    let report = build_report(&[(1, Object::finger(10, 20))]);
    driver.handle_report_at(&report, start)?;

    let report = build_report(&[(1, Object::palm())]);
    let events = driver.handle_report_at(&report, start + Duration::from_millis(10))?;
    assert_eq!(
        events,
        vec![
            lift(1, ObjectStatus::Palm),
            Event::Presence(false),
            Event::Sync
        ]
    );

    // Nothing changes while the palm stays or lifts
    let events = driver.handle_report_at(&report, start + Duration::from_millis(20))?;
    assert_eq!(events, vec![Event::Sync]);
    let report = build_report(&[]);
    let events = driver.handle_report_at(&report, start + Duration::from_millis(30))?;
    assert_eq!(events, vec![Event::Sync]);

    Ok(())
}

#[test]
fn test_zero_pressure() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let mut finger = Object::finger(10, 20);
    finger.z = 0;

    let report = build_report(&[(3, finger)]);
    let events = driver.handle_report_at(&report, Instant::now())?;
    assert_eq!(events[0], contact(3, 10, 20, 1));
    assert_eq!(driver.state().touch_info(3).map(|info| info.z), Some(1));

    Ok(())
}

#[test]
fn test_other_classification() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let object = Object {
        status: 3,
        ..Object::finger(10, 20)
    };

    let report = build_report(&[(0, object)]);
    let events = driver.handle_report_at(&report, Instant::now())?;
    assert_eq!(events, vec![Event::Sync]);
    assert_eq!(driver.state().status(0), Some(ObjectStatus::Other(3)));

    Ok(())
}

#[test]
fn test_swap_and_flip() -> Result<(), Box<dyn Error>> {
    let board = BoardData {
        swap_axes: true,
        x_flip: true,
        y_flip: false,
    };
    let mut driver = Driver::new(DriverConfig {
        board,
        ..Default::default()
    });
    driver.identify(REPORT_CONFIG, InputParams::new(1000, 2000, MAX_OBJECTS as u32))?;
    assert_eq!(driver.params(), InputParams::new(2000, 1000, MAX_OBJECTS as u32));

    let report = build_report(&[(0, Object::finger(100, 300))]);
    let events = driver.handle_report_at(&report, Instant::now())?;
    assert_eq!(events[0], contact(0, 1700, 100, 20));

    let board = BoardData {
        swap_axes: false,
        x_flip: false,
        y_flip: true,
    };
    let mut driver = setup(board)?;
    let events = driver.handle_report_at(&report, Instant::now())?;
    assert_eq!(events[0], contact(0, 100, 2159 - 300, 20));

    Ok(())
}

#[test]
fn test_parse_error_keeps_state() -> Result<(), Box<dyn Error>> {
    let mut driver = Driver::new(DriverConfig::default());
    driver.identify(ACTIVE_REPORT_CONFIG, InputParams::new(1079, 2159, 4))?;
    let diag = driver.diagnostics();
    let start = Instant::now();

    let events = driver.handle_report_at(&[0x01, 0x02, 0x01], start)?;
    assert_eq!(
        events,
        vec![
            Event::Contact(ContactInput::new(2, ObjectStatus::Finger, 0, 0, 0, 0, 1)),
            Event::Presence(true),
            Event::Sync
        ]
    );
    assert!(!diag.read().is_empty());

    let result = driver.handle_report_at(
        &[0x02, 0x00, 0x01, 0x02, 0x01, 0x01],
        start + Duration::from_millis(10),
    );
    assert!(matches!(
        result,
        Err(DriverError::Parse(ParseError::ActiveCountReread(1)))
    ));
    assert_eq!(driver.state().status(2), Some(ObjectStatus::Finger));
    assert_eq!(driver.state().status(0), Some(ObjectStatus::Lift));
    assert!(!diag.is_fresh());

    let events = driver.handle_report_at(&[0x00], start + Duration::from_millis(20))?;
    assert_eq!(
        events,
        vec![
            lift(2, ObjectStatus::Lift),
            Event::Presence(false),
            Event::Sync
        ]
    );

    Ok(())
}

#[test]
fn test_free_objects() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let start = Instant::now();

    let report = build_report(&[(2, Object::finger(300, 400))]);
    driver.handle_report_at(&report, start)?;

    let events = driver.free_objects();
    assert_eq!(
        events,
        vec![
            lift(0, ObjectStatus::Lift),
            lift(1, ObjectStatus::Lift),
            lift(2, ObjectStatus::Lift),
            lift(3, ObjectStatus::Lift),
            Event::Sync
        ]
    );
    assert_eq!(driver.state().touch_count(), 0);

    let report = build_report(&[]);
    let events = driver.handle_report_at(&report, start + Duration::from_millis(10))?;
    assert_eq!(events, vec![Event::Sync]);

    Ok(())
}

#[test]
fn test_suspend_resume() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let start = Instant::now();

    let report = build_report(&[(1, Object::finger(300, 400))]);
    driver.handle_report_at(&report, start)?;

    let events = driver.suspend();
    assert_eq!(events.len(), MAX_OBJECTS + 2);
    assert_eq!(events[MAX_OBJECTS], Event::Sync);
    assert_eq!(events[MAX_OBJECTS + 1], Event::Presence(false));
    assert!(driver.is_suspended());

    let events = driver.handle_report_at(&report, start + Duration::from_millis(10))?;
    assert!(events.is_empty());

    // Nothing was touching so no presence change is reported
    let events = driver.suspend();
    assert_eq!(events.last(), Some(&Event::Sync));

    driver.resume();
    let events = driver.handle_report_at(&report, start + Duration::from_millis(100))?;
    assert_eq!(
        events,
        vec![contact(1, 300, 400, 20), Event::Presence(true), Event::Sync]
    );

    Ok(())
}

#[test]
fn test_not_identified() -> Result<(), Box<dyn Error>> {
    let mut driver = Driver::new(DriverConfig::default());
    let events = driver.handle_report(&[0x01; 32])?;
    assert!(events.is_empty());

    let result = driver.identify(&[code::FOREACH_END, code::END], InputParams::new(10, 10, 2));
    assert!(matches!(
        result,
        Err(DriverError::Program(ProgramError::UnmatchedLoopEnd(0)))
    ));
    assert!(!driver.is_reporting());
    assert!(driver.program().is_none());

    Ok(())
}

#[test]
fn test_default_params() -> Result<(), Box<dyn Error>> {
    let mut driver = Driver::new(DriverConfig::default());
    driver.set_default_params(InputParams::new(100, 200, 2))?;
    assert_eq!(driver.state().len(), 2);
    assert_eq!(driver.diagnostics().len(), 2);

    driver.identify(REPORT_CONFIG, InputParams::new(1079, 2159, 4))?;
    assert_eq!(driver.state().len(), 4);

    // Ignored once parameters are known
    driver.set_default_params(InputParams::new(100, 200, 8))?;
    assert_eq!(driver.state().len(), 4);
    assert_eq!(driver.params(), InputParams::new(1079, 2159, 4));

    Ok(())
}

#[test]
fn test_identify_releases_touches() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;

    let report = build_report(&[(2, Object::finger(300, 400))]);
    driver.handle_report(&report)?;

    let events = driver.identify(REPORT_CONFIG, InputParams::new(1079, 2159, 4))?;
    assert_eq!(events.len(), MAX_OBJECTS + 1);
    assert_eq!(events[2], lift(2, ObjectStatus::Lift));
    assert_eq!(driver.state().touch_count(), 0);

    let changed = driver.set_input_params(InputParams::new(1079, 2159, 4))?;
    assert!(!changed);
    let changed = driver.set_input_params(InputParams::new(1080, 2160, 4))?;
    assert!(changed);

    Ok(())
}

#[test]
fn test_diagnostic_snapshot() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let diag = driver.diagnostics();
    assert_eq!(diag.read(), "");

    let report = build_report(&[(2, Object::finger(300, 400))]);
    driver.handle_report(&report)?;

    let text = diag.read();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), MAX_OBJECTS);
    assert_eq!(lines[0], "id=0,state=0,x=0,y=0,wx=0,wy=0,z=0");
    assert_eq!(lines[2], "id=2,state=1,x=300,y=400,wx=5,wy=3,z=20");

    // Consumed
    assert_eq!(diag.read(), "");

    driver.teardown();
    assert!(diag.is_ceased());
    assert!(!driver.is_reporting());

    Ok(())
}

#[test]
fn test_replay_before_palm() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let start = Instant::now();

    let report = build_report(&[(1, Object::finger(300, 400))]);
    driver.handle_report_at(&report, start)?;

    let report = build_report(&[(1, Object::palm())]);
    let events = driver.handle_report_at(&report, start + Duration::from_millis(50))?;
    assert_eq!(
        events,
        vec![
            contact(1, 300, 400, 21),
            Event::Sync,
            lift(1, ObjectStatus::Palm),
            Event::Presence(false),
            Event::Sync
        ]
    );

    Ok(())
}

#[test]
fn test_first_frame_no_replay() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;
    let start = Instant::now();

    // No frame was seen yet and nothing was touching before
    let report = build_report(&[(0, Object::finger(10, 20)), (1, Object::palm())]);
    let events = driver.handle_report_at(&report, start)?;
    assert_eq!(
        events,
        vec![contact(0, 10, 20, 20), Event::Presence(true), Event::Sync]
    );

    // Identification releases the finger, so a late lift replays nothing
    driver.identify(REPORT_CONFIG, InputParams::new(1079, 2159, MAX_OBJECTS as u32))?;
    let report = build_report(&[]);
    let events = driver.handle_report_at(&report, start + Duration::from_millis(100))?;
    assert_eq!(events, vec![Event::Sync]);

    Ok(())
}

#[test]
fn test_identify_with_fewer_objects() -> Result<(), Box<dyn Error>> {
    let mut driver = setup(BoardData::default())?;

    let report = build_report(&[(3, Object::finger(300, 400))]);
    driver.handle_report(&report)?;

    // A config that fails to decode leaves the tracked touch in place
    let result = driver.identify(&[code::FOREACH_OBJECT, code::END], InputParams::new(10, 10, 2));
    assert!(matches!(
        result,
        Err(DriverError::Program(ProgramError::UnterminatedLoop(0)))
    ));
    assert_eq!(driver.state().status(3), Some(ObjectStatus::Finger));

    // Every slot known before is released, not just the new ones
    let events = driver.identify(REPORT_CONFIG, InputParams::new(1079, 2159, 2))?;
    assert_eq!(
        events,
        vec![
            lift(0, ObjectStatus::Lift),
            lift(1, ObjectStatus::Lift),
            lift(2, ObjectStatus::Lift),
            lift(3, ObjectStatus::Lift),
            Event::Sync
        ]
    );
    assert_eq!(driver.state().len(), 2);
    assert_eq!(driver.state().touch_count(), 0);
    assert_eq!(driver.diagnostics().len(), 2);

    Ok(())
}
