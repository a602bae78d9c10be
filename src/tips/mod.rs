//! Module: tips
//!
//! Purpose: Tip catalog, tip calibration records and their chunk codec.
//!
//! Architecture:
//! - `TIP_NAMES`: every tip the station knows, slot 0 is the hot air gun
//! - `TipRecord`: one 16-byte chunk in the calibration area
//! - `registry`: which chunk holds which tip
//! - `calibration`: the curves currently in use and the unit mapping
//!
//! Chunk layout (little endian):
//! ```text
//! [t200:2][t260:2][t330:2][t400:2][mask:1][name:5][ambient:1][crc8:1]
//! ```

pub mod calibration;
pub mod registry;

use crc::{Crc, CRC_8_SMBUS};

use crate::storage::{ChunkRead, StorageBackend, StorageError, TIP_RECORD_SIZE};
use crate::units::DEFAULT_AMBIENT;

pub use calibration::{CalibrationCurve, Device, TipCalibrationContext};
pub use registry::{RegistryEntry, TipRegistry};

/// Length of the stored tip name suffix.
pub const TIP_NAME_LEN: usize = 5;

/// Capacity of a full display name ("T12-" prefix + suffix).
pub const FULL_NAME_LEN: usize = TIP_NAME_LEN + 4;

/// Owned display name of a tip.
pub type TipName = heapless::String<FULL_NAME_LEN>;

/// All known tips. Index 0 is the hot air gun pseudo-tip.
pub const TIP_NAMES: &[&str] = &[
    "GUN", "B", "B2", "B3", "B4", "BC1", "BC1.5", "BC2", "BC3", "BC4", "BCF1", "BCF2", "BCF3",
    "BCF4", "BCM2", "BCM3", "BL", "BZ", "C1", "C4", "CF4", "D08", "D12", "D16", "D24", "D32", "D4",
    "D52", "DL12", "DL32", "DL52", "I", "IL", "ILS", "J02", "JL02", "JS02", "K", "KF", "KL", "KR",
    "KU", "WB2", "WD08", "WD12", "WD16", "WD52", "WI", "N1-06", "N1-08", "N1-10", "N1-13",
    "N1-16", "N1-20", "N1-23",
];

/// Number of catalog slots, the gun included.
pub const TIP_COUNT: usize = TIP_NAMES.len();

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Catalog suffix of slot `index`.
#[inline]
pub fn tip_suffix(index: usize) -> Option<&'static str> {
    TIP_NAMES.get(index).copied()
}

/// Resolve a stored (zero padded) name to its catalog slot.
pub fn index_of(name: &[u8; TIP_NAME_LEN]) -> Option<usize> {
    let len = name.iter().position(|&b| b == 0).unwrap_or(TIP_NAME_LEN);
    let stored = &name[..len];
    TIP_NAMES.iter().position(|n| n.as_bytes() == stored)
}

/// Display name of slot `index`.
///
/// The gun and `N*` tips keep their name; every other suffix gets the
/// `T12-` prefix. Unknown slots read as `T12-def`.
pub fn full_tip_name(index: usize) -> TipName {
    let mut out = TipName::new();
    match tip_suffix(index) {
        Some(name) if index == 0 || name.starts_with('N') => {
            let _ = out.push_str(name);
        }
        Some(name) => {
            let _ = out.push_str("T12-");
            let _ = out.push_str(name);
        }
        None => {
            let _ = out.push_str("T12-def");
        }
    }
    out
}

/// Tip status bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TipMask(pub u8);

impl TipMask {
    pub const NONE: TipMask = TipMask(0);
    /// Tip shows up in the active tip list.
    pub const ACTIVE: TipMask = TipMask(1);
    /// Record holds a genuine calibration.
    pub const CALIBRATED: TipMask = TipMask(2);
    pub const ACTIVE_CALIBRATED: TipMask = TipMask(3);

    #[inline]
    pub fn is_active(self) -> bool {
        self.0 & Self::ACTIVE.0 != 0
    }

    #[inline]
    pub fn is_calibrated(self) -> bool {
        self.0 & Self::CALIBRATED.0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Same mask with the active bit flipped.
    #[inline]
    pub fn toggled_active(self) -> TipMask {
        TipMask(self.0 ^ Self::ACTIVE.0)
    }
}

/// True if the four calibration points are strictly increasing.
#[inline]
pub fn is_valid_tip_config(points: &[u16; 4]) -> bool {
    points[0] < points[1] && points[1] < points[2] && points[2] < points[3]
}

/// Persisted calibration of one tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TipRecord {
    /// Internal readings at the four reference temperatures.
    pub points: [u16; 4],
    pub mask: TipMask,
    /// Catalog suffix, zero padded.
    pub name: [u8; TIP_NAME_LEN],
    /// Ambient temperature (Celsius) when calibrated.
    pub ambient: i8,
}

impl TipRecord {
    /// Fresh record for catalog slot `index`, carrying the default curve.
    pub fn for_tip(index: usize, mask: TipMask) -> Option<Self> {
        let suffix = tip_suffix(index)?;
        let mut name = [0u8; TIP_NAME_LEN];
        let len = suffix.len().min(TIP_NAME_LEN);
        name[..len].copy_from_slice(&suffix.as_bytes()[..len]);
        Some(Self {
            points: CalibrationCurve::DEFAULT.points,
            mask,
            name,
            ambient: DEFAULT_AMBIENT as i8,
        })
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        is_valid_tip_config(&self.points)
    }

    /// Catalog slot this record belongs to.
    #[inline]
    pub fn tip_index(&self) -> Option<usize> {
        index_of(&self.name)
    }

    pub fn encode(&self) -> [u8; TIP_RECORD_SIZE] {
        let mut buf = [0u8; TIP_RECORD_SIZE];
        for (i, p) in self.points.iter().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&p.to_le_bytes());
        }
        buf[8] = self.mask.0;
        buf[9..14].copy_from_slice(&self.name);
        buf[14] = self.ambient as u8;
        buf[15] = CRC8.checksum(&buf[..15]);
        buf
    }

    /// Decode a chunk. `None` for blank or corrupted chunks.
    pub fn decode(buf: &[u8; TIP_RECORD_SIZE]) -> Option<Self> {
        if buf.iter().all(|&b| b == 0xFF) {
            return None;
        }
        if CRC8.checksum(&buf[..15]) != buf[15] {
            return None;
        }
        let mut points = [0u16; 4];
        for (i, p) in points.iter_mut().enumerate() {
            *p = u16::from_le_bytes([buf[i * 2], buf[i * 2 + 1]]);
        }
        let mut name = [0u8; TIP_NAME_LEN];
        name.copy_from_slice(&buf[9..14]);
        Some(Self {
            points,
            mask: TipMask(buf[8]),
            name,
            ambient: buf[14] as i8,
        })
    }
}

/// Load and verify tip chunk `chunk`.
pub fn load_tip<S: StorageBackend>(storage: &mut S, chunk: u8) -> ChunkRead<TipRecord> {
    let mut buf = [0u8; TIP_RECORD_SIZE];
    match storage.read_chunk(chunk, &mut buf) {
        Ok(()) => match TipRecord::decode(&buf) {
            Some(tip) => ChunkRead::Ok(tip),
            None => ChunkRead::Invalid,
        },
        Err(StorageError::Io) | Err(StorageError::NotAvailable) => ChunkRead::IoError,
        Err(StorageError::OutOfRange) => ChunkRead::Invalid,
    }
}

/// Encode and write `tip` into chunk `chunk`.
#[inline]
pub fn save_tip<S: StorageBackend>(storage: &mut S, chunk: u8, tip: &TipRecord) -> Result<(), StorageError> {
    storage.write_chunk(chunk, &tip.encode())
}
