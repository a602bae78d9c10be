//! Seams to the control law.
//!
//! The PID algorithm and the autotuner live outside this crate. The heater
//! only stores and exchanges coefficients and asks for a power value.

/// PID coefficients as persisted (fixed-point, scaled by the control law).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PidParams {
    pub kp: u16,
    pub ki: u16,
    pub kd: u16,
}

impl PidParams {
    pub const fn new(kp: u16, ki: u16, kd: u16) -> Self {
        Self { kp, ki, kd }
    }

    /// Soft coefficients used while calibrating an unknown tip.
    pub const fn smooth(iron: bool) -> Self {
        if iron {
            Self::new(575, 10, 200)
        } else {
            Self::new(150, 64, 50)
        }
    }
}

/// Closed-loop control law used in ON mode.
pub trait PowerLaw {
    /// Forget integral and derivative history.
    fn reset(&mut self);

    /// Power needed to reach `target` from `current` (internal units).
    fn required_power(&mut self, target: u16, current: u16) -> i32;

    /// Coefficients in use.
    fn params(&self) -> PidParams;

    /// Install new coefficients.
    fn load(&mut self, params: PidParams);
}

/// Autotuner driving the heater in TUNING mode.
pub trait TuningLaw {
    /// Start a fresh tuning run.
    fn start(&mut self);

    /// Power for the next sample given the current temperature.
    fn run(&mut self, current: u16) -> i32;
}

/// Tuning stand-in for builds without an autotuner. Never heats.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTuning;

impl TuningLaw for NoTuning {
    fn start(&mut self) {}

    fn run(&mut self, _current: u16) -> i32 {
        0
    }
}
