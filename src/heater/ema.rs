//! Integer exponential moving average.
//!
//! Keeps `k` times the average to avoid fractional state:
//! `acc += x - round(acc / k)`. `k` is the filter length; larger is
//! smoother.

#[derive(Clone, Copy, Debug)]
pub struct ExpAverage {
    acc: i64,
    k: i64,
}

impl ExpAverage {
    pub const fn new(length: u8) -> Self {
        let k = if length == 0 { 1 } else { length as i64 };
        Self { acc: 0, k }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.acc = 0;
    }

    /// Fold `value` into the average.
    #[inline]
    pub fn update(&mut self, value: i32) {
        self.acc += i64::from(value) - self.rounded();
    }

    /// Fold `value` in and return the new average.
    #[inline]
    pub fn average(&mut self, value: i32) -> i32 {
        self.update(value);
        self.read()
    }

    #[inline]
    pub fn read(&self) -> i32 {
        self.rounded().clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    #[inline]
    fn rounded(&self) -> i64 {
        (self.acc + self.k / 2) / self.k
    }
}
