//! Commands issued by the control layer.

use serde::{Deserialize, Serialize};

use crate::state::{Cell, PlaybackMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequencerCommand {
    // Cells
    SetCell { step: usize, col: usize, cell: Cell },
    SetCellSettings { step: usize, col: usize, volume: Option<f32>, pitch: Option<f32> },
    SetCellSampleSlot { step: usize, col: usize, slot: Option<u8> },
    ClearCell { step: usize, col: usize },

    // Structure
    InsertStep { section: usize, at: usize },
    DeleteStep { section: usize, at: usize },
    SetSectionSteps { section: usize, steps: usize },
    InsertSection { at: usize, steps: usize, copy_from: Option<usize> },
    AppendSection { steps: usize, copy_from: Option<usize> },
    RemoveSection(usize),
    ReorderSection { from: usize, to: usize },
    SetLayerLen { section: usize, layer: usize, len: usize },

    // Playback
    SetMode { mode: PlaybackMode, section: usize },
    SetLoopCount { section: usize, count: u32 },
    SetStopAtEnd(bool),
    SetBpm(u32),
    Play { from_step: usize },
    Stop,
    /// Limit Sequence playback to steps `start..end` on section boundaries.
    SetRegion { start: usize, end: usize },
    ClearRegion,
    /// Jump to a section's first line without stopping playback.
    SwitchToSection(usize),

    // Mixing
    SetTrackMuted { col: usize, muted: bool },
    SetSectionMuted { section: usize, muted: bool },

    // Samples
    LoadSample { slot: u8, name: String, voice: u16 },
    UnloadSample(u8),
    SetSampleSettings { slot: u8, volume: f32, pitch: f32 },

    // History
    Undo,
    Redo,
}

impl SequencerCommand {
    /// Commands that change the table shape and need a playhead remap.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SequencerCommand::InsertStep { .. }
                | SequencerCommand::DeleteStep { .. }
                | SequencerCommand::SetSectionSteps { .. }
                | SequencerCommand::InsertSection { .. }
                | SequencerCommand::AppendSection { .. }
                | SequencerCommand::RemoveSection(_)
                | SequencerCommand::ReorderSection { .. }
        )
    }

    /// Commands recorded in the undo history.
    pub fn is_undoable(&self) -> bool {
        !matches!(
            self,
            SequencerCommand::SetMode { .. }
                | SequencerCommand::SetBpm(_)
                | SequencerCommand::Play { .. }
                | SequencerCommand::Stop
                | SequencerCommand::SetRegion { .. }
                | SequencerCommand::ClearRegion
                | SequencerCommand::SwitchToSection(_)
                | SequencerCommand::SetTrackMuted { .. }
                | SequencerCommand::Undo
                | SequencerCommand::Redo
        )
    }
}
