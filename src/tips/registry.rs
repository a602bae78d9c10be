//! In-memory index of the calibration area.
//!
//! Maps every catalog slot to the storage chunk holding its record. Rebuilt
//! from scratch at boot, updated incrementally on activation, calibration
//! and chunk reclaim.

use super::{load_tip, save_tip, TipMask, TIP_COUNT};
use crate::log_globals::MAIN_LOG;
use crate::storage::{ChunkRead, StorageBackend};
use crate::{rt_info, rt_warn};

/// Registry state of one catalog slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Chunk holding the tip record, `None` if the tip was never stored.
    pub chunk: Option<u8>,
    pub mask: TipMask,
}

impl RegistryEntry {
    pub const EMPTY: RegistryEntry = RegistryEntry {
        chunk: None,
        mask: TipMask::NONE,
    };
}

/// Tip slot to chunk index.
pub struct TipRegistry {
    entries: [RegistryEntry; TIP_COUNT],
}

impl TipRegistry {
    pub const fn new() -> Self {
        Self {
            entries: [RegistryEntry::EMPTY; TIP_COUNT],
        }
    }

    /// Rebuild the index by scanning every chunk.
    ///
    /// The first chunk found for a slot wins. A corrupted chunk is skipped,
    /// an I/O failure stops the scan and keeps what was indexed so far.
    /// Returns the number of tips indexed.
    pub fn build<S: StorageBackend>(&mut self, storage: &mut S) -> usize {
        self.entries = [RegistryEntry::EMPTY; TIP_COUNT];
        let mut loaded = 0;
        for chunk in 0..storage.chunk_count() {
            match load_tip(storage, chunk) {
                ChunkRead::Ok(tip) => {
                    let Some(index) = tip.tip_index() else {
                        continue;
                    };
                    let entry = &mut self.entries[index];
                    if !tip.mask.is_empty() && entry.chunk.is_none() {
                        entry.chunk = Some(chunk);
                        entry.mask = tip.mask;
                        loaded += 1;
                    }
                }
                ChunkRead::Invalid => {}
                ChunkRead::IoError => {
                    rt_warn!(MAIN_LOG, "tip scan aborted at chunk {}: I/O error", chunk);
                    return loaded;
                }
            }
        }
        rt_info!(MAIN_LOG, "tip scan: {} tips indexed", loaded);
        loaded
    }

    /// Registry entry of slot `index`.
    #[inline]
    pub fn entry(&self, index: usize) -> Option<&RegistryEntry> {
        self.entries.get(index)
    }

    /// Number of catalog slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record that slot `index` lives in `chunk` with status `mask`.
    pub fn assign(&mut self, index: usize, chunk: u8, mask: TipMask) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.chunk = Some(chunk);
            entry.mask = mask;
        }
    }

    /// Update the status bits of slot `index`.
    pub fn set_mask(&mut self, index: usize, mask: TipMask) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.mask = mask;
        }
    }

    /// First chunk not referenced by any slot.
    ///
    /// When the area is full, the chunk of a stored but inactive tip is
    /// reclaimed and that slot forgets its chunk. `None` if nothing can be
    /// freed.
    pub fn free_chunk(&mut self, chunk_count: u8) -> Option<u8> {
        let unused = (0..chunk_count).find(|&chunk| self.entries.iter().all(|e| e.chunk != Some(chunk)));
        if unused.is_some() {
            return unused;
        }

        let victim = self
            .entries
            .iter_mut()
            .enumerate()
            .find(|(_, e)| e.chunk.is_some() && !e.mask.is_active())?;
        let (index, entry) = victim;
        let chunk = entry.chunk;
        *entry = RegistryEntry::EMPTY;
        rt_info!(MAIN_LOG, "reclaimed chunk {:?} from inactive tip {}", chunk, index);
        chunk
    }

    /// Drop the calibrated flag of every active, calibrated tip.
    ///
    /// Stops at the first read or write failure; tips already rewritten
    /// stay rewritten. Returns `false` if the medium failed.
    pub fn clear_all_calibrations<S: StorageBackend>(&mut self, storage: &mut S) -> bool {
        for index in 0..self.entries.len() {
            let entry = self.entries[index];
            let Some(chunk) = entry.chunk else {
                continue;
            };
            if !(entry.mask.is_active() && entry.mask.is_calibrated()) {
                continue;
            }
            match load_tip(storage, chunk) {
                ChunkRead::Ok(mut tip) => {
                    tip.mask = TipMask::ACTIVE;
                    if save_tip(storage, chunk, &tip).is_err() {
                        rt_warn!(MAIN_LOG, "clear calibration: write failed at chunk {}", chunk);
                        return false;
                    }
                    self.entries[index].mask = TipMask::ACTIVE;
                }
                ChunkRead::IoError => {
                    rt_warn!(MAIN_LOG, "clear calibration: read failed at chunk {}", chunk);
                    return false;
                }
                ChunkRead::Invalid => {}
            }
        }
        true
    }
}

impl Default for TipRegistry {
    fn default() -> Self {
        Self::new()
    }
}
