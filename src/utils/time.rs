use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Current wall-clock time as epoch milliseconds.
///
/// Lease expiries compare wall-clock timestamps across instances, so this is
/// deliberately not a monotonic clock.
pub fn now_ms() -> i64 {
    let now = SystemTime::now();
    let since_epoch = now.duration_since(UNIX_EPOCH).expect("Time went backwards");
    since_epoch.as_millis() as i64
}
