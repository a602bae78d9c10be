//! Fault latch shared by the sampling callback and the main loop.
//!
//! # Philosophy
//!
//! > A heater that stops is safe.
//! > A heater that keeps going on bad data is not.
//!
//! Faults never stop the control loop by themselves. The callback latches
//! them here, the main loop takes them and decides how to surface them.
//!
//! The latched code doubles as the active flag: `FaultCode::None` means no
//! fault is pending.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// What went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultCode {
    None = 0,

    /// Overheat guard tripped while heating.
    /// Data: filtered temperature in internal units.
    Overheat = 1,

    /// Handle thermistor reads outside its plausible range.
    /// Data: filtered raw reading.
    SensorDisconnected = 2,

    /// Non-volatile storage unavailable or a write did not land.
    /// Data: chunk index, or `u32::MAX` for the configuration record.
    StorageIo = 3,
}

impl FaultCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => FaultCode::Overheat,
            2 => FaultCode::SensorDisconnected,
            3 => FaultCode::StorageIo,
            _ => FaultCode::None,
        }
    }

    /// Short name for log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultCode::None => "none",
            FaultCode::Overheat => "overheat",
            FaultCode::SensorDisconnected => "sensor disconnected",
            FaultCode::StorageIo => "storage i/o",
        }
    }

    /// The heater must be switched off when this fault is taken.
    #[inline]
    pub fn cuts_power(self) -> bool {
        matches!(self, FaultCode::Overheat | FaultCode::SensorDisconnected)
    }
}

/// Latched fault with a data word and a boot-long counter.
///
/// ```ignore
/// static FAULT: FaultState = FaultState::new();
///
/// // Sampling callback:
/// FAULT.raise(FaultCode::SensorDisconnected, raw as u32);
///
/// // Main loop:
/// if let Some(fault) = FAULT.take() {
///     if fault.code.cuts_power() {
///         HEATER.switch_power(false);
///     }
/// }
/// ```
pub struct FaultState {
    code: AtomicU8,
    data: AtomicU32,
    /// Faults latched since boot, never reset.
    count: AtomicU32,
}

impl FaultState {
    pub const fn new() -> Self {
        Self {
            code: AtomicU8::new(FaultCode::None as u8),
            data: AtomicU32::new(0),
            count: AtomicU32::new(0),
        }
    }

    /// Latch `code`, replacing any pending fault.
    ///
    /// The data word is stored before the code so a reader that sees the
    /// code also sees its data.
    pub fn set(&self, code: FaultCode, data: u32) {
        if code == FaultCode::None {
            return;
        }
        self.data.store(data, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.code.store(code as u8, Ordering::Release);
    }

    /// Latch `code` unless it is already pending.
    ///
    /// Returns true if the fault was newly latched.
    pub fn raise(&self, code: FaultCode, data: u32) -> bool {
        if self.code() == code {
            return false;
        }
        self.set(code, data);
        true
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.code() != FaultCode::None
    }

    /// Pending fault code, `None` when clear.
    #[inline]
    pub fn code(&self) -> FaultCode {
        FaultCode::from_u8(self.code.load(Ordering::Acquire))
    }

    /// Data word of the last latched fault.
    #[inline]
    pub fn data(&self) -> u32 {
        self.data.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Drop the pending fault. Data and counter are kept for diagnostics.
    #[inline]
    pub fn clear(&self) {
        self.code.store(FaultCode::None as u8, Ordering::Release);
    }

    /// Pending fault, clearing it in the same step.
    pub fn take(&self) -> Option<FaultSnapshot> {
        let code = FaultCode::from_u8(self.code.swap(FaultCode::None as u8, Ordering::AcqRel));
        if code == FaultCode::None {
            return None;
        }
        Some(FaultSnapshot {
            code,
            data: self.data(),
            count: self.count(),
        })
    }
}

impl Default for FaultState {
    fn default() -> Self {
        Self::new()
    }
}

/// A fault as seen by the main loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultSnapshot {
    pub code: FaultCode,
    pub data: u32,
    pub count: u32,
}
