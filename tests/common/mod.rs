//! Shared fixtures for the integration tests.
//!
//! - `MemStorage`: in-memory storage backend with fault injection
//! - `RecordingFeedback`: counts beeps
//! - `Proportional` / `FixedTuner`: minimal control laws for the heater

#![allow(dead_code)]

use solder_station::heater::{PidParams, PowerLaw, TuningLaw};
use solder_station::storage::{StorageBackend, StorageError, CONFIG_RECORD_SIZE, TIP_RECORD_SIZE};
use solder_station::tips::{TipMask, TipRecord};
use solder_station::{ConfigStore, Feedback};

/// Erased-flash byte.
pub const BLANK: u8 = 0xFF;

/// Storage backend kept in RAM.
#[derive(Clone, Debug)]
pub struct MemStorage {
    pub config: [u8; CONFIG_RECORD_SIZE],
    pub chunks: Vec<[u8; TIP_RECORD_SIZE]>,
    /// `init()` result.
    pub present: bool,
    /// Reading this chunk fails with an I/O error.
    pub fail_read_at: Option<u8>,
    /// Every write fails with an I/O error.
    pub fail_writes: bool,
    /// Chunk writes report success but never land.
    pub lose_chunk_writes: bool,
    pub config_writes: usize,
    pub chunk_writes: usize,
    pub erases: usize,
    pub reloads: usize,
}

impl MemStorage {
    /// Blank, writable medium with `chunks` tip chunks.
    pub fn new(chunks: u8) -> Self {
        Self {
            config: [BLANK; CONFIG_RECORD_SIZE],
            chunks: vec![[BLANK; TIP_RECORD_SIZE]; usize::from(chunks)],
            present: true,
            fail_read_at: None,
            fail_writes: false,
            lose_chunk_writes: false,
            config_writes: 0,
            chunk_writes: 0,
            erases: 0,
            reloads: 0,
        }
    }

    /// Medium that does not answer.
    pub fn missing() -> Self {
        let mut storage = Self::new(0);
        storage.present = false;
        storage
    }

    /// Store a record for catalog slot `index` directly in `chunk`.
    pub fn put_tip(&mut self, chunk: u8, index: usize, mask: TipMask, points: [u16; 4]) {
        let mut tip = TipRecord::for_tip(index, mask).expect("catalog slot");
        tip.points = points;
        self.chunks[usize::from(chunk)] = tip.encode();
    }

    /// Decode the record held in `chunk`.
    pub fn tip(&self, chunk: u8) -> Option<TipRecord> {
        TipRecord::decode(&self.chunks[usize::from(chunk)])
    }
}

impl StorageBackend for MemStorage {
    fn init(&mut self) -> bool {
        self.present
    }

    fn chunk_count(&self) -> u8 {
        self.chunks.len() as u8
    }

    fn read_chunk(&mut self, index: u8, buf: &mut [u8; TIP_RECORD_SIZE]) -> Result<(), StorageError> {
        if self.fail_read_at == Some(index) {
            return Err(StorageError::Io);
        }
        let chunk = self.chunks.get(usize::from(index)).ok_or(StorageError::OutOfRange)?;
        buf.copy_from_slice(chunk);
        Ok(())
    }

    fn write_chunk(&mut self, index: u8, buf: &[u8; TIP_RECORD_SIZE]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io);
        }
        let lose = self.lose_chunk_writes;
        let chunk = self.chunks.get_mut(usize::from(index)).ok_or(StorageError::OutOfRange)?;
        if !lose {
            chunk.copy_from_slice(buf);
        }
        self.chunk_writes += 1;
        Ok(())
    }

    fn read_config(&mut self, buf: &mut [u8; CONFIG_RECORD_SIZE]) -> Result<(), StorageError> {
        buf.copy_from_slice(&self.config);
        Ok(())
    }

    fn write_config(&mut self, buf: &[u8; CONFIG_RECORD_SIZE]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io);
        }
        self.config = *buf;
        self.config_writes += 1;
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.config = [BLANK; CONFIG_RECORD_SIZE];
        for chunk in self.chunks.iter_mut() {
            *chunk = [BLANK; TIP_RECORD_SIZE];
        }
        self.erases += 1;
        Ok(())
    }

    fn force_reload_next(&mut self) {
        self.reloads += 1;
    }
}

/// Counts every beep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordingFeedback {
    pub short: usize,
    pub low: usize,
    pub failed: usize,
}

impl Feedback for RecordingFeedback {
    fn short_beep(&mut self) {
        self.short += 1;
    }

    fn low_beep(&mut self) {
        self.low += 1;
    }

    fn failed_beep(&mut self) {
        self.failed += 1;
    }
}

pub type TestStore = ConfigStore<MemStorage, RecordingFeedback>;

/// Store over `storage`, already initialized.
pub fn store_with(storage: MemStorage) -> TestStore {
    let mut store = ConfigStore::new(storage, RecordingFeedback::default());
    store.init();
    store
}

/// Power proportional to the error: `(target - current) * GAIN`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Proportional {
    pub params: PidParams,
    pub resets: usize,
    /// Outputs computed since the last reset.
    pub since_reset: usize,
}

impl Proportional {
    pub const GAIN: i32 = 10;
}

impl PowerLaw for Proportional {
    fn reset(&mut self) {
        self.resets += 1;
        self.since_reset = 0;
    }

    fn required_power(&mut self, target: u16, current: u16) -> i32 {
        self.since_reset += 1;
        (i32::from(target) - i32::from(current)) * Self::GAIN
    }

    fn params(&self) -> PidParams {
        self.params
    }

    fn load(&mut self, params: PidParams) {
        self.params = params;
    }
}

/// Autotuner stand-in that always asks for the same power.
#[derive(Clone, Copy, Debug)]
pub struct FixedTuner(pub i32);

impl TuningLaw for FixedTuner {
    fn start(&mut self) {}

    fn run(&mut self, _current: u16) -> i32 {
        self.0
    }
}
