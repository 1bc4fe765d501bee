//! Locally generated ids.
//!
//! Fallback-mode entities get `<prefix><millis>` ids. The millisecond stamp
//! comes from a process-wide clock that never repeats or goes backwards, so
//! two ids minted in the same millisecond still differ and a later id always
//! sorts after an earlier one.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Strictly increasing millisecond stamp.
pub fn next_stamp() -> i64 {
    let now = now_millis();
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let candidate = if now > last { now } else { last + 1 };
        match LAST_STAMP.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

pub fn local_id(prefix: &str) -> String {
    format!("{}{}", prefix, next_stamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamps_strictly_increase() {
        let mut previous = next_stamp();
        for _ in 0..1000 {
            let next = next_stamp();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_local_id_has_prefix_and_is_unique() {
        let a = local_id("t");
        let b = local_id("t");
        assert!(a.starts_with('t'));
        assert_ne!(a, b);
        assert!(a[1..].parse::<i64>().is_ok());
    }
}
