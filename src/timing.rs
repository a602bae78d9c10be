//! Deadlines over a wrapping millisecond tick counter.
//!
//! The tick counter wraps after ~49 days. Deadlines are compared with
//! wrapping subtraction, so a deadline set just before the wrap still
//! expires at the right moment.

/// A point in time `duration` milliseconds after it was armed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at_ms: u32,
}

impl Deadline {
    /// Arm a deadline `duration_ms` after `now_ms`.
    #[inline]
    pub fn after(now_ms: u32, duration_ms: u32) -> Self {
        Self {
            at_ms: now_ms.wrapping_add(duration_ms),
        }
    }

    /// True once `now_ms` has reached the deadline.
    ///
    /// Valid while the distance between `now_ms` and the deadline is below
    /// half the counter range.
    #[inline]
    pub fn expired(&self, now_ms: u32) -> bool {
        (now_ms.wrapping_sub(self.at_ms) as i32) >= 0
    }

    /// Milliseconds left, zero once expired.
    #[inline]
    pub fn remaining(&self, now_ms: u32) -> u32 {
        let left = self.at_ms.wrapping_sub(now_ms) as i32;
        if left > 0 {
            left as u32
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_basic() {
        let d = Deadline::after(1_000, 5_000);
        assert!(!d.expired(1_000));
        assert!(!d.expired(5_999));
        assert!(d.expired(6_000));
        assert_eq!(d.remaining(2_000), 4_000);
        assert_eq!(d.remaining(7_000), 0);
    }

    #[test]
    fn test_deadline_across_wrap() {
        let now = u32::MAX - 100;
        let d = Deadline::after(now, 500);
        assert!(!d.expired(now));
        assert!(!d.expired(u32::MAX));
        assert!(!d.expired(398));
        assert!(d.expired(399));
        assert_eq!(d.remaining(u32::MAX), 400);
    }
}
