//! Playback mode state. Mutated only by the loop controller.

use serde::{Deserialize, Serialize};

use crate::limits::DEFAULT_SECTION_LOOPS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Sections play in order, each repeated `loop_counts[section]` times.
    #[default]
    Sequence,
    /// One section loops indefinitely.
    SingleLoop,
}

impl PlaybackMode {
    pub fn as_u8(self) -> u8 {
        match self {
            PlaybackMode::Sequence => 0,
            PlaybackMode::SingleLoop => 1,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        if v == 1 {
            PlaybackMode::SingleLoop
        } else {
            PlaybackMode::Sequence
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackModeState {
    pub mode: PlaybackMode,
    pub current_section: usize,
    pub loop_counts: Vec<u32>,
    /// Completed passes of each section in its current visit (0-based).
    pub loop_iterations: Vec<u32>,
    /// Sections inside the playback region. Sequence mode plays only these;
    /// all `true` means no region is set.
    pub in_region: Vec<bool>,
    /// Sections Sequence mode visits, in order. Derived from `in_region`.
    pub sequence_order: Vec<usize>,
    pub stop_at_end: bool,
}

impl PlaybackModeState {
    pub fn new(section_count: usize, default_loops: u32) -> Self {
        Self {
            mode: PlaybackMode::Sequence,
            current_section: 0,
            loop_counts: vec![default_loops; section_count],
            loop_iterations: vec![0; section_count],
            in_region: vec![true; section_count],
            sequence_order: (0..section_count).collect(),
            stop_at_end: false,
        }
    }

    pub fn section_count(&self) -> usize {
        self.loop_counts.len()
    }

    pub fn loop_count(&self, section: usize) -> u32 {
        self.loop_counts
            .get(section)
            .copied()
            .unwrap_or(DEFAULT_SECTION_LOOPS)
    }

    pub fn iteration(&self, section: usize) -> u32 {
        self.loop_iterations.get(section).copied().unwrap_or(0)
    }

    pub fn in_region(&self, section: usize) -> bool {
        self.in_region.get(section).copied().unwrap_or(false)
    }

    /// First and last section of the playback region, if one is set.
    pub fn region_bounds(&self) -> Option<(usize, usize)> {
        if self.in_region.iter().all(|&r| r) {
            return None;
        }
        let first = self.sequence_order.first().copied()?;
        let last = self.sequence_order.last().copied()?;
        Some((first, last))
    }

    /// The section the engine loops indefinitely, if in single-loop mode.
    pub fn looping_section(&self) -> Option<usize> {
        (self.mode == PlaybackMode::SingleLoop).then_some(self.current_section)
    }
}

impl Default for PlaybackModeState {
    fn default() -> Self {
        Self::new(1, DEFAULT_SECTION_LOOPS)
    }
}
