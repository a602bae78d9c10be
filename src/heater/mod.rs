//! Module: heater
//!
//! Purpose: Real-time heater control loop and its power-mode state machine.
//!
//! Architecture:
//! ```text
//! Main loop                HeaterState               Sampling callback
//! ─────────                ───────────               ─────────────────
//! switch_power() ───────▶  mode, target,   ◀──────── HeaterController::power()
//! set_temp()               requests        ────────▶ filters, PID
//! average_temp()  ◀──────  published temp, ◀──────── (one writer per field)
//!                          power, dispersion
//! ```
//!
//! - `HeaterState` lives in a `static`; every shared field is one atomic
//! - The main loop writes mode/target and raises reset *requests*
//! - The sampling callback owns the filters and the control law, applies
//!   pending requests at the start of each sample and publishes results
//! - A stale-by-one-sample read from the main loop is acceptable
//!
//! Safety: RT-safe. No locks, no allocation, never fails.

pub mod ambient;
pub mod ema;
pub mod pid;

use core::sync::atomic::{AtomicBool, AtomicI16, AtomicU16, AtomicU32, AtomicU8, Ordering};

use crate::fault::{FaultCode, FaultState};
use crate::log_globals::HEATER_LOG;
use crate::units::{map, DEFAULT_AMBIENT, INT_TEMP_MAX};
use crate::{rt_info, rt_warn};

pub use ambient::AmbientSensor;
pub use ema::ExpAverage;
pub use pid::{NoTuning, PidParams, PowerLaw, TuningLaw};

/// Maximum power to the heater.
pub const MAX_POWER: u16 = 1999;

/// Maximum power in fixed-power and tuning modes.
pub const MAX_FIX_POWER: u16 = 1000;

/// Averaged temperature (internal units) below which the heater counts as
/// cold.
pub const COLD_TEMP: u16 = 100;

/// Chill is raised by `set_temp` when the tip is this far above target.
pub const CHILL_MARGIN: u16 = 20;

/// Chill is raised while ON when the reading exceeds the target by this.
pub const OVERSHOOT_LIMIT: u16 = 400;

const HISTORY_LEN: u8 = 20;
const SHORT_LEN: u8 = 8;
const AMBIENT_LEN: u8 = 10;

const REQ_RESET_PID: u8 = 1;
const REQ_RESET_POWER: u8 = 2;
const REQ_RESET_ALL: u8 = 4;
const REQ_START_TUNING: u8 = 8;

/// Heater power mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerMode {
    Off = 0,
    /// Closed-loop control toward the target.
    On = 1,
    /// Constant power.
    Fixed = 2,
    /// Power removed, waiting for the tip to cool down.
    Cooling = 3,
    /// Autotuner in control.
    Tuning = 4,
}

impl PowerMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PowerMode::On,
            2 => PowerMode::Fixed,
            3 => PowerMode::Cooling,
            4 => PowerMode::Tuning,
            _ => PowerMode::Off,
        }
    }
}

/// Heater state shared between the main loop and the sampling callback.
///
/// Field ownership:
/// - main loop writes: `target`, `temp_low`, `fix_power`, `requests`
///   (set bits), `pid_*`, mode transitions other than COOLING to OFF
/// - callback writes: `temp_curr`, `avg_*`, `*_dispersion`, `ambient_*`,
///   `requests` (clear), COOLING to OFF
/// - both: `chill` (main loop raises, callback raises and clears), `mode`
///   (disjoint transitions, COOLING to OFF via compare-exchange)
pub struct HeaterState {
    mode: AtomicU8,
    chill: AtomicBool,
    target: AtomicU16,
    temp_low: AtomicU16,
    fix_power: AtomicU16,
    temp_curr: AtomicU16,
    avg_temp: AtomicU16,
    avg_power: AtomicU16,
    temp_dispersion: AtomicU32,
    power_dispersion: AtomicU32,
    ambient_raw: AtomicU16,
    ambient_c: AtomicI16,
    requests: AtomicU8,
    pid_kp: AtomicU16,
    pid_ki: AtomicU16,
    pid_kd: AtomicU16,
    pid_pending: AtomicBool,
}

impl HeaterState {
    pub const fn new() -> Self {
        Self {
            mode: AtomicU8::new(PowerMode::Off as u8),
            chill: AtomicBool::new(false),
            target: AtomicU16::new(0),
            temp_low: AtomicU16::new(0),
            fix_power: AtomicU16::new(0),
            temp_curr: AtomicU16::new(0),
            avg_temp: AtomicU16::new(0),
            avg_power: AtomicU16::new(0),
            temp_dispersion: AtomicU32::new(0),
            power_dispersion: AtomicU32::new(0),
            ambient_raw: AtomicU16::new(0),
            ambient_c: AtomicI16::new(DEFAULT_AMBIENT),
            requests: AtomicU8::new(0),
            pid_kp: AtomicU16::new(0),
            pid_ki: AtomicU16::new(0),
            pid_kd: AtomicU16::new(0),
            pid_pending: AtomicBool::new(false),
        }
    }

    #[inline]
    fn request(&self, bits: u8) {
        self.requests.fetch_or(bits, Ordering::AcqRel);
    }

    #[inline]
    fn set_mode(&self, mode: PowerMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    #[inline]
    pub fn mode(&self) -> PowerMode {
        PowerMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Turn the heater on (closed loop) or start cooling down.
    ///
    /// Switching on cancels low-power mode and resets the control law.
    pub fn switch_power(&self, on: bool) {
        if on {
            self.request(REQ_RESET_PID | REQ_RESET_POWER);
            self.set_mode(PowerMode::On);
        } else {
            self.fix_power.store(0, Ordering::Relaxed);
            self.request(REQ_RESET_POWER);
            if self.mode() != PowerMode::Off {
                self.set_mode(PowerMode::Cooling);
            }
        }
        self.temp_low.store(0, Ordering::Relaxed);
    }

    /// Run at constant power, clamped to [`MAX_FIX_POWER`]. Zero starts
    /// cooling instead.
    pub fn fix_power(&self, power: u16) {
        self.request(REQ_RESET_POWER);
        if power == 0 {
            self.fix_power.store(0, Ordering::Relaxed);
            self.set_mode(PowerMode::Cooling);
            return;
        }
        self.fix_power.store(power.min(MAX_FIX_POWER), Ordering::Relaxed);
        self.set_mode(PowerMode::Fixed);
    }

    /// Hand the heater to the autotuner.
    pub fn start_tuning(&self) {
        self.request(REQ_RESET_POWER | REQ_START_TUNING);
        self.set_mode(PowerMode::Tuning);
    }

    /// Set the target temperature (internal units).
    ///
    /// Capped at [`INT_TEMP_MAX`]. If the tip is already well above the new
    /// target, heating pauses until it falls back near it.
    pub fn set_temp(&self, temp: u16) {
        if self.mode() == PowerMode::On {
            self.request(REQ_RESET_PID);
        }
        let t = temp.min(INT_TEMP_MAX);
        self.target.store(t, Ordering::Relaxed);
        let avg = self.avg_temp.load(Ordering::Relaxed);
        self.chill.store(u32::from(avg) > u32::from(t) + u32::from(CHILL_MARGIN), Ordering::Release);
    }

    /// Move the target without disturbing the control law.
    pub fn adjust(&self, temp: u16) {
        self.target.store(temp.min(INT_TEMP_MAX), Ordering::Relaxed);
    }

    /// Hold the standby temperature `temp` while ON.
    ///
    /// Ignored unless ON and below the target. Heating pauses until the tip
    /// reaches `temp`. `switch_power(true)` leaves standby.
    pub fn low_power_mode(&self, temp: u16) {
        if self.mode() == PowerMode::On && temp < self.preset_temp() {
            self.temp_low.store(temp, Ordering::Relaxed);
            self.chill.store(true, Ordering::Release);
            self.request(REQ_RESET_POWER);
        }
    }

    /// Tip changed or disconnected: clear every history and switch off.
    pub fn reset(&self) {
        self.request(REQ_RESET_ALL);
        self.set_mode(PowerMode::Off);
    }

    /// Install new PID coefficients; applied on the next sample.
    pub fn load_pid(&self, params: PidParams) {
        self.pid_kp.store(params.kp, Ordering::Relaxed);
        self.pid_ki.store(params.ki, Ordering::Relaxed);
        self.pid_kd.store(params.kd, Ordering::Relaxed);
        self.pid_pending.store(true, Ordering::Release);
    }

    /// Last coefficients passed to [`load_pid`](Self::load_pid).
    pub fn pid_params(&self) -> PidParams {
        PidParams::new(
            self.pid_kp.load(Ordering::Relaxed),
            self.pid_ki.load(Ordering::Relaxed),
            self.pid_kd.load(Ordering::Relaxed),
        )
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.mode() == PowerMode::On
    }

    #[inline]
    pub fn is_cold(&self) -> bool {
        self.mode() == PowerMode::Off
    }

    #[inline]
    pub fn is_chilling(&self) -> bool {
        self.chill.load(Ordering::Acquire)
    }

    /// Target temperature (internal units).
    #[inline]
    pub fn preset_temp(&self) -> u16 {
        self.target.load(Ordering::Relaxed)
    }

    /// Standby temperature, 0 when not in standby.
    #[inline]
    pub fn low_temp(&self) -> u16 {
        self.temp_low.load(Ordering::Relaxed)
    }

    /// Last short-averaged reading.
    #[inline]
    pub fn temp(&self) -> u16 {
        self.temp_curr.load(Ordering::Relaxed)
    }

    /// Long-averaged temperature.
    #[inline]
    pub fn average_temp(&self) -> u16 {
        self.avg_temp.load(Ordering::Relaxed)
    }

    /// Averaged temperature, 0 while OFF.
    #[inline]
    pub fn alternate_temp(&self) -> u16 {
        if self.mode() == PowerMode::Off {
            0
        } else {
            self.average_temp()
        }
    }

    /// Temperature variance estimate.
    #[inline]
    pub fn tmp_dispersion(&self) -> u32 {
        self.temp_dispersion.load(Ordering::Relaxed)
    }

    /// Power variance estimate.
    #[inline]
    pub fn pwr_dispersion(&self) -> u32 {
        self.power_dispersion.load(Ordering::Relaxed)
    }

    /// Filtered raw ambient sensor reading.
    #[inline]
    pub fn ambient_raw(&self) -> u16 {
        self.ambient_raw.load(Ordering::Relaxed)
    }

    /// Handle temperature in Celsius; the default ambient until the first
    /// plausible reading.
    #[inline]
    pub fn ambient_temp(&self) -> i16 {
        self.ambient_c.load(Ordering::Relaxed)
    }

    /// Average applied power; the fixed value in FIXED mode.
    pub fn avg_power(&self) -> u16 {
        let p = if self.mode() == PowerMode::Fixed {
            self.fix_power.load(Ordering::Relaxed)
        } else {
            self.avg_power.load(Ordering::Relaxed)
        };
        p.min(MAX_POWER)
    }

    /// Average applied power in percent of the mode's maximum.
    pub fn avg_power_pcnt(&self) -> u8 {
        let mut p = self.avg_power.load(Ordering::Relaxed);
        let mut max_p = MAX_POWER;
        match self.mode() {
            PowerMode::Fixed => {
                p = self.fix_power.load(Ordering::Relaxed);
                max_p = MAX_FIX_POWER;
            }
            PowerMode::Tuning => max_p = MAX_FIX_POWER,
            _ => {}
        }
        let p = p.min(max_p);
        map(i32::from(p), 0, i32::from(max_p), 0, 100) as u8
    }
}

impl Default for HeaterState {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-sample heater control, owned by the sampling callback.
///
/// # Example
///
/// ```ignore
/// static HEATER: HeaterState = HeaterState::new();
/// static FAULT: FaultState = FaultState::new();
///
/// // Sampling callback:
/// let power = controller.power(adc_tip_reading);
/// set_pwm(power);
///
/// // Main loop:
/// HEATER.set_temp(target);
/// HEATER.switch_power(true);
/// ```
pub struct HeaterController<'a, P: PowerLaw, T: TuningLaw = NoTuning> {
    state: &'a HeaterState,
    fault: &'a FaultState,
    pid: P,
    tuner: T,
    t_short: ExpAverage,
    t_amb: ExpAverage,
    ambient: AmbientSensor,
    h_power: ExpAverage,
    h_temp: ExpAverage,
    d_power: ExpAverage,
    d_temp: ExpAverage,
}

impl<'a, P: PowerLaw, T: TuningLaw> HeaterController<'a, P, T> {
    pub fn new(state: &'a HeaterState, fault: &'a FaultState, pid: P, tuner: T) -> Self {
        state.set_mode(PowerMode::Off);
        state.chill.store(false, Ordering::Release);
        state.fix_power.store(0, Ordering::Relaxed);
        state.requests.store(0, Ordering::Release);
        state.ambient_c.store(DEFAULT_AMBIENT, Ordering::Relaxed);
        let params = pid.params();
        state.pid_kp.store(params.kp, Ordering::Relaxed);
        state.pid_ki.store(params.ki, Ordering::Relaxed);
        state.pid_kd.store(params.kd, Ordering::Relaxed);
        Self {
            state,
            fault,
            pid,
            tuner,
            t_short: ExpAverage::new(SHORT_LEN),
            t_amb: ExpAverage::new(AMBIENT_LEN),
            ambient: AmbientSensor::new(),
            h_power: ExpAverage::new(HISTORY_LEN),
            h_temp: ExpAverage::new(HISTORY_LEN),
            d_power: ExpAverage::new(HISTORY_LEN),
            d_temp: ExpAverage::new(HISTORY_LEN),
        }
    }

    /// The control law.
    #[inline]
    pub fn pid(&self) -> &P {
        &self.pid
    }

    /// Feed a raw ambient sensor reading.
    ///
    /// Publishes the filtered reading and its Celsius value. Raises
    /// [`FaultCode::SensorDisconnected`] once the filtered reading leaves the
    /// plausible range.
    pub fn update_ambient(&mut self, raw: u16) {
        let avg = clamp_u16(self.t_amb.average(i32::from(raw)));
        self.state.ambient_raw.store(avg, Ordering::Relaxed);
        let celsius = self.ambient.temperature(avg);
        self.state.ambient_c.store(celsius, Ordering::Relaxed);
        if AmbientSensor::is_disconnected(avg) && self.fault.raise(FaultCode::SensorDisconnected, u32::from(avg)) {
            rt_warn!(HEATER_LOG, "ambient sensor disconnected: raw={}", avg);
        }
    }

    fn apply_requests(&mut self) {
        let req = self.state.requests.swap(0, Ordering::AcqRel);
        if req & REQ_RESET_ALL != 0 {
            self.t_short.reset();
            self.h_temp.reset();
            self.d_temp.reset();
            self.h_power.reset();
            self.d_power.reset();
            self.pid.reset();
        }
        if req & REQ_RESET_PID != 0 {
            self.pid.reset();
        }
        if req & REQ_RESET_POWER != 0 {
            self.h_power.reset();
            self.d_power.reset();
        }
        if req & REQ_START_TUNING != 0 {
            self.tuner.start();
        }
        if self.state.pid_pending.swap(false, Ordering::AcqRel) {
            let params = self.state.pid_params();
            self.pid.load(params);
        }
    }

    /// Required power for the raw tip reading `raw` (internal units).
    ///
    /// Called once per sample by the sampling callback. Always returns a
    /// value; 0 when no mode applies or heating is paused.
    pub fn power(&mut self, raw: i32) -> u16 {
        let state = self.state;
        // Requests are posted before the mode changes, so any reset that
        // belongs to this mode is applied below.
        let mode = state.mode();
        self.apply_requests();

        let t = clamp_u16(self.t_short.average(raw));
        state.temp_curr.store(t, Ordering::Relaxed);
        let at = self.h_temp.average(i32::from(t));
        let diff = at - i32::from(t);
        self.d_temp.update(square(diff));
        state.avg_temp.store(clamp_u16(at), Ordering::Relaxed);
        state.temp_dispersion.store(self.d_temp.read().max(0) as u32, Ordering::Relaxed);

        let target = state.preset_temp();
        let t32 = i32::from(t);
        let overheat = t32 >= i32::from(INT_TEMP_MAX) + 100 || t32 > i32::from(target) + i32::from(OVERSHOOT_LIMIT);
        if overheat && mode == PowerMode::On && !state.chill.swap(true, Ordering::AcqRel) {
            self.fault.set(FaultCode::Overheat, u32::from(t));
            rt_warn!(HEATER_LOG, "overheat guard: t={} target={}", t, target);
        }

        let mut p: i32 = 0;
        match mode {
            PowerMode::Off => {}
            PowerMode::Cooling => {
                if at < i32::from(COLD_TEMP) {
                    let _ = state.mode.compare_exchange(
                        PowerMode::Cooling as u8,
                        PowerMode::Off as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
            }
            PowerMode::On => {
                let low = state.low_temp();
                let t_set = if low > 0 { low } else { target };
                let mut heating = true;
                if state.is_chilling() {
                    if t32 < i32::from(t_set) - 2 {
                        state.chill.store(false, Ordering::Release);
                        self.pid.reset();
                        rt_info!(HEATER_LOG, "chill released at t={}", t);
                    } else {
                        heating = false;
                    }
                }
                if heating {
                    p = self.pid.required_power(t_set, t).clamp(0, i32::from(MAX_POWER));
                }
            }
            PowerMode::Fixed => p = i32::from(state.fix_power.load(Ordering::Relaxed)),
            PowerMode::Tuning => p = self.tuner.run(t).clamp(0, i32::from(MAX_FIX_POWER)),
        }

        let ap = self.h_power.average(p);
        let diff = ap - p;
        self.d_power.update(square(diff));
        state.avg_power.store(clamp_u16(ap), Ordering::Relaxed);
        state.power_dispersion.store(self.d_power.read().max(0) as u32, Ordering::Relaxed);
        p as u16
    }
}

#[inline]
fn clamp_u16(v: i32) -> u16 {
    v.clamp(0, i32::from(u16::MAX)) as u16
}

/// `v * v`, saturating at `i32::MAX`.
#[inline]
fn square(v: i32) -> i32 {
    let sq = i64::from(v) * i64::from(v);
    sq.min(i64::from(i32::MAX)) as i32
}
