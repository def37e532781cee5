//! Tests for the control loop's bounded database calls.

use std::time::{Duration, Instant};
use tgpg::engine::{ControlConfig, bounded};
use tgpg::error::Error;

#[tokio::test]
async fn bounded_call_times_out_when_server_never_answers() {
    let started = Instant::now();
    let result = bounded(
        Duration::from_millis(50),
        std::future::pending::<Result<(), sqlx::Error>>(),
    )
    .await;

    assert!(matches!(result, Err(Error::Other(ref msg)) if msg.contains("timed out")));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn bounded_call_passes_through_results() {
    let ok = bounded(Duration::from_secs(1), async { Ok::<_, sqlx::Error>(7) }).await;
    assert_eq!(ok.unwrap(), 7);

    let err = bounded(Duration::from_secs(1), async {
        Err::<(), _>(sqlx::Error::PoolClosed)
    })
    .await;
    assert!(matches!(err, Err(Error::Database(sqlx::Error::PoolClosed))));
}

#[test]
fn listen_timeout_defaults_to_five_seconds() {
    assert_eq!(ControlConfig::default().listen_timeout, Duration::from_secs(5));
}
