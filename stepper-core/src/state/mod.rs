pub mod undo;

use stepper_audio::{SyncStateProvider, VoiceProvider};
use stepper_types::limits::DEFAULT_BPM;
use stepper_types::{SampleBankState, TableState};

use crate::config::{Config, SequencerDefaults};
use undo::UndoHistory;

/// Application state owned by the control thread.
pub struct AppState {
    pub table: TableState,
    pub samples: SampleBankState,
    pub undo_history: UndoHistory,
    pub bpm: u32,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            table: TableState::new(),
            samples: SampleBankState::new(),
            undo_history: UndoHistory::new(100),
            bpm: DEFAULT_BPM,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let SequencerDefaults {
            bpm, section_steps, ..
        } = config.defaults();
        Self {
            table: TableState::with_capacity(config.max_steps(), section_steps),
            samples: SampleBankState::new(),
            undo_history: UndoHistory::new(config.undo_depth()),
            bpm,
        }
    }

    /// Replace the table, e.g. with a prepared layout. Clears history.
    pub fn with_table(mut self, table: TableState) -> Self {
        self.table = table;
        self.undo_history.clear();
        self
    }

    pub fn remaining_steps(&self) -> usize {
        self.table.max_steps().saturating_sub(self.table.occupied_rows())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStateProvider for AppState {
    fn table(&self) -> &TableState {
        &self.table
    }

    fn voices(&self) -> &dyn VoiceProvider {
        &self.samples
    }
}
