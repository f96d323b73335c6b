//! Registry of opened audio files.
//!
//! Each entry keeps the playback parameters the sink is driven with
//! (volume, panning, relative frequency), a display name, and the recorded
//! reference spectrum its matcher scores against. The registry is shared
//! between the command surface and the matcher stages, so every access
//! goes through the priority-inheriting mutex.

use std::io;
use std::path::Path;
use std::sync::Arc;

use ostinato_rt::sync::Mutex;

use crate::constants::{MAX_FILES, MAX_NAME_LENGTH};
use crate::error::{Error, Result};
use crate::stages::SpectrumBlock;

pub const MAX_VOLUME: u8 = 255;
pub const MID_PANNING: u8 = 128;

/// Relative playback frequency in thousandths of the recorded rate.
pub const BASE_FREQUENCY: u16 = 1000;
const MAX_FREQUENCY: u16 = 9990;
const FREQUENCY_STEP: u16 = 10;

struct FileEntry {
    name: String,
    volume: u8,
    panning: u8,
    frequency: u16,
    reference: Option<Arc<SpectrumBlock>>,
}

impl FileEntry {
    fn new(name: String) -> Self {
        Self {
            name,
            volume: MAX_VOLUME,
            panning: MID_PANNING,
            frequency: BASE_FREQUENCY,
            reference: None,
        }
    }
}

/// Snapshot of one registry entry, for display.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub volume: u8,
    pub panning: u8,
    pub frequency: u16,
    pub has_reference: bool,
}

/// Fixed-capacity table of opened audio files.
pub struct FileBank {
    entries: Mutex<Vec<FileEntry>>,
}

impl FileBank {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            entries: Mutex::new(Vec::with_capacity(MAX_FILES))?,
        })
    }

    /// Registers a file under the display form of its path.
    ///
    /// Returns the entry index used to address the file everywhere else.
    pub fn open(&self, path: &str) -> Result<usize> {
        let mut entries = self.entries.lock();
        if entries.len() == MAX_FILES {
            return Err(Error::BankFull {
                capacity: MAX_FILES,
            });
        }
        entries.push(FileEntry::new(display_name(path)));
        Ok(entries.len() - 1)
    }

    /// Removes an entry; later entries shift down one index.
    ///
    /// Matchers hold indices, so stop the file's matcher before closing
    /// it.
    pub fn close(&self, index: usize) -> Result<()> {
        let mut entries = self.entries.lock();
        if index >= entries.len() {
            return Err(Error::InvalidFile { index });
        }
        entries.remove(index);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn info(&self, index: usize) -> Result<FileInfo> {
        let entries = self.entries.lock();
        let entry = entries.get(index).ok_or(Error::InvalidFile { index })?;
        Ok(FileInfo {
            name: entry.name.clone(),
            volume: entry.volume,
            panning: entry.panning,
            frequency: entry.frequency,
            has_reference: entry.reference.is_some(),
        })
    }

    /// Stores the recorded reference spectrum for `index`.
    pub fn set_reference(&self, index: usize, reference: Arc<SpectrumBlock>) -> Result<()> {
        self.with_entry(index, |e| e.reference = Some(reference))
    }

    /// The reference spectrum a matcher scores against.
    pub fn reference(&self, index: usize) -> Result<Arc<SpectrumBlock>> {
        let entries = self.entries.lock();
        let entry = entries.get(index).ok_or(Error::InvalidFile { index })?;
        entry
            .reference
            .clone()
            .ok_or(Error::NoReference { index })
    }

    pub fn set_volume(&self, index: usize, volume: u8) -> Result<()> {
        self.with_entry(index, |e| e.volume = volume)
    }

    pub fn volume_up(&self, index: usize) -> Result<()> {
        self.with_entry(index, |e| e.volume = e.volume.saturating_add(1))
    }

    pub fn volume_down(&self, index: usize) -> Result<()> {
        self.with_entry(index, |e| e.volume = e.volume.saturating_sub(1))
    }

    pub fn set_panning(&self, index: usize, panning: u8) -> Result<()> {
        self.with_entry(index, |e| e.panning = panning)
    }

    pub fn panning_up(&self, index: usize) -> Result<()> {
        self.with_entry(index, |e| e.panning = e.panning.saturating_add(1))
    }

    pub fn panning_down(&self, index: usize) -> Result<()> {
        self.with_entry(index, |e| e.panning = e.panning.saturating_sub(1))
    }

    pub fn set_frequency(&self, index: usize, frequency: u16) -> Result<()> {
        self.with_entry(index, |e| e.frequency = frequency.min(MAX_FREQUENCY))
    }

    pub fn frequency_up(&self, index: usize) -> Result<()> {
        self.with_entry(index, |e| {
            e.frequency = (e.frequency + FREQUENCY_STEP).min(MAX_FREQUENCY)
        })
    }

    pub fn frequency_down(&self, index: usize) -> Result<()> {
        self.with_entry(index, |e| {
            e.frequency = e.frequency.saturating_sub(FREQUENCY_STEP)
        })
    }

    fn with_entry(&self, index: usize, apply: impl FnOnce(&mut FileEntry)) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(index).ok_or(Error::InvalidFile { index })?;
        apply(entry);
        Ok(())
    }
}

/// Basename of the path, ellipsized to the registry display width.
fn display_name(path: &str) -> String {
    let base = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_owned());

    if base.chars().count() < MAX_NAME_LENGTH {
        return base;
    }
    let mut clipped: String = base.chars().take(MAX_NAME_LENGTH - 4).collect();
    clipped.push_str("...");
    clipped
}
