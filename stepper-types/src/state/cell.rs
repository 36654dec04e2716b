//! Cell type stored in the physical table.

use serde::{Deserialize, Serialize};

use crate::limits::{clamp_pitch, clamp_volume, MAX_COLS, MAX_SAMPLE_SLOTS};

/// A single cell of the step grid.
///
/// `volume` and `pitch` are `None` when the cell inherits the referenced
/// sample's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub sample_slot: Option<u8>,
    pub volume: Option<f32>,
    pub pitch: Option<f32>,
}

impl Cell {
    pub const EMPTY: Cell = Cell {
        sample_slot: None,
        volume: None,
        pitch: None,
    };

    /// A cell triggering `slot` with inherited settings.
    pub fn with_sample(slot: u8) -> Self {
        Self {
            sample_slot: Some(slot),
            ..Self::EMPTY
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sample_slot.is_none()
    }

    /// Replace the explicit settings, clamping into range. `None` restores
    /// inheritance.
    pub fn set_settings(&mut self, volume: Option<f32>, pitch: Option<f32>) {
        self.volume = volume.map(clamp_volume);
        self.pitch = pitch.map(clamp_pitch);
    }
}

/// One physical row: a cell per column.
pub type Row = [Cell; MAX_COLS];

pub const EMPTY_ROW: Row = [Cell::EMPTY; MAX_COLS];

pub fn valid_sample_slot(slot: u8) -> bool {
    (slot as usize) < MAX_SAMPLE_SLOTS
}
