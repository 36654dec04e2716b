//! Lock-free playback readback for the UI.
//!
//! Scalars live in atomics so the display thread never contends with the
//! control thread. Section and iteration are packed into one `u64` so a
//! reader never sees a section paired with another section's iteration.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use stepper_types::PlaybackMode;

fn pack_position(section: usize, iteration: u32) -> u64 {
    ((section as u64) << 32) | iteration as u64
}

fn unpack_position(packed: u64) -> (usize, u32) {
    ((packed >> 32) as usize, packed as u32)
}

/// Snapshot of what is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub playing: bool,
    pub line: u32,
    pub section: usize,
    pub iteration: u32,
    pub mode: PlaybackMode,
}

#[derive(Clone, Default)]
pub struct PlaybackMonitor {
    playing: Arc<AtomicBool>,
    line: Arc<AtomicU32>,
    position: Arc<AtomicU64>,
    mode: Arc<AtomicU8>,
    /// Bumped on every structural edit applied to the engine.
    layout_version: Arc<AtomicU64>,
}

impl PlaybackMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn line(&self) -> u32 {
        self.line.load(Ordering::Relaxed)
    }

    /// Current `(section, iteration)`.
    pub fn position(&self) -> (usize, u32) {
        unpack_position(self.position.load(Ordering::Acquire))
    }

    pub fn mode(&self) -> PlaybackMode {
        PlaybackMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn layout_version(&self) -> u64 {
        self.layout_version.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let (section, iteration) = self.position();
        PlaybackSnapshot {
            playing: self.is_playing(),
            line: self.line(),
            section,
            iteration,
            mode: self.mode(),
        }
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    pub(crate) fn set_line(&self, line: u32) {
        self.line.store(line, Ordering::Relaxed);
    }

    pub(crate) fn set_position(&self, section: usize, iteration: u32) {
        self.position
            .store(pack_position(section, iteration), Ordering::Release);
    }

    pub(crate) fn set_mode(&self, mode: PlaybackMode) {
        self.mode.store(mode.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn bump_layout(&self) {
        self.layout_version.fetch_add(1, Ordering::AcqRel);
    }
}
