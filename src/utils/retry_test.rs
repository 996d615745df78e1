use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::retry::retry_with_backoff;
use super::retry::Backoff;
use crate::Error;

#[test]
fn test_backoff_doubles_and_saturates() {
    let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));

    assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    assert_eq!(backoff.next_delay(), Duration::from_millis(350));
    assert_eq!(backoff.next_delay(), Duration::from_millis(350));

    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_millis(100));
}

/// # Case 1: succeeds on the third attempt, earlier failures are absorbed
#[tokio::test(start_paused = true)]
async fn test_retry_with_backoff_eventual_success() {
    let calls = AtomicUsize::new(0);

    let result = retry_with_backoff(
        "test_op",
        5,
        Duration::from_millis(10),
        Duration::from_millis(100),
        || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Fatal("transient".to_string()))
            } else {
                Ok(42u64)
            }
        },
    )
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// # Case 2: exhaustion returns the last error and stops calling the task
#[tokio::test(start_paused = true)]
async fn test_retry_with_backoff_exhaustion() {
    let calls = AtomicUsize::new(0);

    let result: crate::Result<()> = retry_with_backoff(
        "test_op",
        3,
        Duration::from_millis(10),
        Duration::from_millis(100),
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Fatal("always".to_string()))
        },
    )
    .await;

    assert!(matches!(result, Err(Error::Fatal(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
