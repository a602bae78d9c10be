//! Audible feedback fired by persistence and calibration outcomes.
//!
//! Fire-and-forget: results never depend on whether a beep was played.

pub trait Feedback {
    /// Operation succeeded or a reading is ready.
    fn short_beep(&mut self);

    /// Attention, no error.
    fn low_beep(&mut self);

    /// Operation failed.
    fn failed_beep(&mut self);
}

/// No buzzer fitted, or the buzzer is disabled in the configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl Feedback for Silent {
    fn short_beep(&mut self) {}
    fn low_beep(&mut self) {}
    fn failed_beep(&mut self) {}
}
