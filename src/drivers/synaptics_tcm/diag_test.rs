use std::{error::Error, sync::Arc, time::Duration};

use crate::drivers::synaptics_tcm::{
    diag::{Diagnostics, PollResult, TouchInfo},
    touch_report::ObjectStatus,
};

fn finger() -> TouchInfo {
    TouchInfo {
        state: ObjectStatus::Finger,
        x: 120,
        y: 340,
        wx: 4,
        wy: 6,
        z: 30,
    }
}

#[tokio::test]
async fn test_read_consumes_frame() -> Result<(), Box<dyn Error>> {
    let diag = Diagnostics::new();
    diag.resize(2)?;
    assert_eq!(diag.len(), 2);
    assert_eq!(diag.read(), "");

    diag.publish(&[TouchInfo::default(), finger()]);
    assert!(diag.is_fresh());
    assert_eq!(
        diag.read(),
        "id=0,state=0,x=0,y=0,wx=0,wy=0,z=0\nid=1,state=1,x=120,y=340,wx=4,wy=6,z=30\n"
    );
    assert_eq!(diag.read(), "");

    // The snapshot itself is kept
    assert_eq!(diag.snapshot()[1], finger());

    Ok(())
}

#[tokio::test]
async fn test_publish_wrong_size() -> Result<(), Box<dyn Error>> {
    let diag = Diagnostics::new();
    diag.resize(2)?;
    diag.publish(&[finger()]);
    assert!(!diag.is_fresh());

    Ok(())
}

#[tokio::test]
async fn test_poll_timeout() -> Result<(), Box<dyn Error>> {
    let diag = Diagnostics::new();
    diag.resize(1)?;
    let result = diag.poll(Duration::from_millis(10)).await;
    assert_eq!(result, PollResult::TimedOut);

    diag.publish(&[finger()]);
    let result = diag.poll(Duration::from_millis(10)).await;
    assert_eq!(result, PollResult::Ready);

    // A frame that was already read does not wake up the consumer
    diag.read();
    let result = diag.poll(Duration::from_millis(10)).await;
    assert_eq!(result, PollResult::TimedOut);

    Ok(())
}

#[tokio::test]
async fn test_poll_wakeup() -> Result<(), Box<dyn Error>> {
    let diag = Arc::new(Diagnostics::new());
    diag.resize(1)?;

    let waiter = tokio::spawn({
        let diag = diag.clone();
        async move { diag.poll(Duration::from_secs(5)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    diag.publish(&[finger()]);

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await??;
    assert_eq!(result, PollResult::Ready);

    Ok(())
}

#[tokio::test]
async fn test_cease_releases_waiters() -> Result<(), Box<dyn Error>> {
    let diag = Arc::new(Diagnostics::new());
    diag.resize(1)?;

    let waiter = tokio::spawn({
        let diag = diag.clone();
        async move { diag.poll(Duration::from_secs(5)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    diag.cease();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await??;
    assert_eq!(result, PollResult::Ceased);
    assert!(diag.is_empty());

    // New frames are ignored once ceased
    diag.publish(&[]);
    assert!(!diag.is_fresh());
    assert_eq!(diag.poll(Duration::from_millis(10)).await, PollResult::Ceased);

    Ok(())
}
