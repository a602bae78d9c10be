//! Module: storage
//!
//! Purpose: Byte-level contract with the non-volatile store.
//!
//! Architecture:
//! - The backend moves fixed-size byte blocks; it knows nothing about records
//! - Record encoding and checksums live in `config::record` and `tips`
//! - One 32-byte configuration record, `chunk_count()` 16-byte tip chunks
//!
//! Wear rotation of the configuration record, page caching and the bus
//! protocol are the backend's business.

/// Size of an encoded configuration record (power-of-two aligned).
pub const CONFIG_RECORD_SIZE: usize = 32;

/// Size of an encoded tip calibration record (two per storage page).
pub const TIP_RECORD_SIZE: usize = 16;

/// Storage operation errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// The medium did not answer or the write did not take.
    Io,
    /// Chunk index beyond the tip area.
    OutOfRange,
    /// Backend not available on this platform.
    NotAvailable,
}

/// Outcome of loading one tip chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkRead<T> {
    /// Record decoded and checksum verified.
    Ok(T),
    /// Chunk readable but blank, corrupted or structurally invalid.
    Invalid,
    /// The medium failed.
    IoError,
}

impl<T> ChunkRead<T> {
    /// The decoded record, if any.
    #[inline]
    pub fn ok(self) -> Option<T> {
        match self {
            ChunkRead::Ok(v) => Some(v),
            _ => None,
        }
    }
}

/// Non-volatile store consumed by the configuration engine.
///
/// Implementations: `config::nvs::NvsStorage` on the ESP-IDF target, an
/// in-memory store in the integration tests.
pub trait StorageBackend {
    /// Prepare the medium. Returns `true` if it is present and writable.
    fn init(&mut self) -> bool;

    /// Number of tip chunks in the calibration area.
    fn chunk_count(&self) -> u8;

    /// Read tip chunk `index` into `buf`.
    fn read_chunk(&mut self, index: u8, buf: &mut [u8; TIP_RECORD_SIZE]) -> Result<(), StorageError>;

    /// Write `buf` into tip chunk `index`.
    fn write_chunk(&mut self, index: u8, buf: &[u8; TIP_RECORD_SIZE]) -> Result<(), StorageError>;

    /// Read the most recent configuration record.
    fn read_config(&mut self, buf: &mut [u8; CONFIG_RECORD_SIZE]) -> Result<(), StorageError>;

    /// Persist a configuration record.
    fn write_config(&mut self, buf: &[u8; CONFIG_RECORD_SIZE]) -> Result<(), StorageError>;

    /// Erase the configuration and calibration areas.
    fn erase(&mut self) -> Result<(), StorageError>;

    /// Make the next read bypass any cache and hit the medium.
    fn force_reload_next(&mut self);
}
