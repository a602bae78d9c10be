//! Persisted configuration record.
//!
//! Layout (little endian, 32 bytes):
//! ```text
//! [id:4][crc16:2][iron_temp:2][gun_temp:2][gun_fan:2]
//! [iron_kp:2][iron_ki:2][iron_kd:2][gun_kp:2][gun_ki:2][gun_kd:2]
//! [low_temp:2][low_to:1][scr_save:1][boost:1][tip:1][off_to:1][flags:1]
//! ```
//! The CRC-16/ARC covers every byte except the checksum itself.

use crc::{Crc, CRC_16_ARC};

use crate::heater::PidParams;
use crate::storage::CONFIG_RECORD_SIZE;
use crate::tips::{Device, TIP_COUNT};
use crate::units::{celsius_to_fahrenheit, constrain, fahrenheit_to_celsius};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Longest auto-off timeout, minutes.
pub const MAX_OFF_TIMEOUT: u8 = 30;

/// Longest screen saver timeout, minutes.
pub const MAX_SCR_SAVE_TIMEOUT: u8 = 60;

/// Configuration bit flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfigFlags(pub u8);

impl ConfigFlags {
    /// Temperatures in Celsius (clear: Fahrenheit).
    pub const CELSIUS: u8 = 1;
    pub const BUZZER: u8 = 2;
    /// Keep the iron heating while the gun works.
    pub const KEEP_IRON: u8 = 4;
    /// Reed switch in the handle (clear: tilt switch).
    pub const REED_SWITCH: u8 = 8;
    pub const AUTO_START: u8 = 16;
    /// Large preset temperature step.
    pub const BIG_STEP: u8 = 128;

    #[inline]
    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    #[inline]
    pub fn set(&mut self, bit: u8, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

/// Boost: temporary temperature increment for a limited time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Boost {
    /// Increment in degrees, multiple of 5, 0 disables boost.
    pub increment: u8,
    /// Duration in seconds, multiple of 20.
    pub duration_secs: u16,
}

impl Boost {
    pub const MAX_INCREMENT: u8 = 75;
    pub const MIN_DURATION: u16 = 5;
    pub const MAX_DURATION: u16 = 320;

    /// Pack into the persisted byte.
    ///
    /// High nibble: increment in 5-degree steps (rounded up). Low nibble:
    /// duration in 20-second steps minus one (rounded up).
    pub fn encode(increment: u8, duration_secs: u16) -> u8 {
        let increment = increment.min(Self::MAX_INCREMENT);
        let duration = duration_secs.clamp(Self::MIN_DURATION, Self::MAX_DURATION);
        let steps = (increment + 4) / 5;
        let slots = ((duration - 1) / 20) as u8 & 0x0F;
        (steps << 4) | slots
    }

    pub fn decode(raw: u8) -> Self {
        Self {
            increment: (raw >> 4) * 5,
            duration_secs: (u16::from(raw & 0x0F) + 1) * 20,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.increment > 0
    }
}

/// The station configuration as stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigRecord {
    /// Incremented on every save.
    pub id: u32,
    /// Iron preset, in the unit selected by `flags`.
    pub iron_temp: u16,
    /// Gun preset, in the unit selected by `flags`.
    pub gun_temp: u16,
    pub gun_fan_speed: u16,
    pub iron_pid: PidParams,
    pub gun_pid: PidParams,
    /// Standby temperature, 0 disables standby.
    pub low_temp: u16,
    /// Standby timeout, 5-second units.
    pub low_timeout: u8,
    /// Screen saver timeout in minutes, 0 disables.
    pub scr_save_timeout: u8,
    /// See [`Boost`].
    pub boost: u8,
    /// Active tip slot.
    pub tip: u8,
    /// Auto-off timeout in minutes, 0 disables.
    pub off_timeout: u8,
    pub flags: ConfigFlags,
}

impl ConfigRecord {
    pub const DEFAULT: ConfigRecord = ConfigRecord {
        id: 0,
        iron_temp: 235,
        gun_temp: 300,
        gun_fan_speed: 1200,
        iron_pid: PidParams::new(2300, 50, 735),
        gun_pid: PidParams::new(200, 64, 195),
        low_temp: 0,
        low_timeout: 5,
        scr_save_timeout: 0,
        boost: 0,
        tip: 1,
        off_timeout: 0,
        flags: ConfigFlags(ConfigFlags::CELSIUS | ConfigFlags::BUZZER),
    };

    #[inline]
    pub fn is_celsius(&self) -> bool {
        self.flags.has(ConfigFlags::CELSIUS)
    }

    /// Compare every setting, ignoring the record id.
    pub fn same_settings(&self, other: &ConfigRecord) -> bool {
        let mut a = *self;
        a.id = other.id;
        a == *other
    }

    /// Clamp loaded values into their valid ranges.
    ///
    /// Presets are clamped in Celsius and re-expressed in the record's own
    /// unit.
    pub fn correct(&mut self) {
        let celsius = self.is_celsius();
        self.iron_temp = clamp_preset(self.iron_temp, Device::Iron, celsius);
        self.gun_temp = clamp_preset(self.gun_temp, Device::Gun, celsius);
        if self.off_timeout > MAX_OFF_TIMEOUT {
            self.off_timeout = MAX_OFF_TIMEOUT;
        }
        if usize::from(self.tip) >= TIP_COUNT || self.tip == 0 {
            self.tip = 1;
        }
        if self.scr_save_timeout > MAX_SCR_SAVE_TIMEOUT {
            self.scr_save_timeout = MAX_SCR_SAVE_TIMEOUT;
        }
    }

    pub fn encode(&self) -> [u8; CONFIG_RECORD_SIZE] {
        let mut buf = [0u8; CONFIG_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.id.to_le_bytes());
        let words = [
            self.iron_temp,
            self.gun_temp,
            self.gun_fan_speed,
            self.iron_pid.kp,
            self.iron_pid.ki,
            self.iron_pid.kd,
            self.gun_pid.kp,
            self.gun_pid.ki,
            self.gun_pid.kd,
            self.low_temp,
        ];
        for (i, w) in words.iter().enumerate() {
            let at = 6 + i * 2;
            buf[at..at + 2].copy_from_slice(&w.to_le_bytes());
        }
        buf[26] = self.low_timeout;
        buf[27] = self.scr_save_timeout;
        buf[28] = self.boost;
        buf[29] = self.tip;
        buf[30] = self.off_timeout;
        buf[31] = self.flags.0;
        let crc = checksum(&buf);
        buf[4..6].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode a stored record. `None` for blank or corrupted data.
    pub fn decode(buf: &[u8; CONFIG_RECORD_SIZE]) -> Option<Self> {
        let id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if id == u32::MAX {
            return None;
        }
        let stored_crc = u16::from_le_bytes([buf[4], buf[5]]);
        if checksum(buf) != stored_crc {
            return None;
        }
        let w = |i: usize| u16::from_le_bytes([buf[6 + i * 2], buf[7 + i * 2]]);
        Some(Self {
            id,
            iron_temp: w(0),
            gun_temp: w(1),
            gun_fan_speed: w(2),
            iron_pid: PidParams::new(w(3), w(4), w(5)),
            gun_pid: PidParams::new(w(6), w(7), w(8)),
            low_temp: w(9),
            low_timeout: buf[26],
            scr_save_timeout: buf[27],
            boost: buf[28],
            tip: buf[29],
            off_timeout: buf[30],
            flags: ConfigFlags(buf[31]),
        })
    }
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn checksum(buf: &[u8; CONFIG_RECORD_SIZE]) -> u16 {
    let mut digest = CRC16.digest();
    digest.update(&buf[..4]);
    digest.update(&buf[6..]);
    digest.finalize()
}

fn clamp_preset(temp: u16, device: Device, celsius: bool) -> u16 {
    let mut t = i32::from(temp);
    if !celsius {
        t = fahrenheit_to_celsius(t);
    }
    t = constrain(t, i32::from(device.min_c()), i32::from(device.max_c()));
    if !celsius {
        t = celsius_to_fahrenheit(t);
    }
    t as u16
}
