use std::collections::VecDeque;
use std::time::{Duration, Instant};

use stepper_types::{PlaybackModeState, SampleBankState, SequencerCommand, TableState};

/// What scope of state an undo entry covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoScope {
    /// Cell contents only; the section layout is unchanged.
    Table,
    /// Table and loop counts (sections added, removed, reordered or resized).
    Structure,
    Samples,
    /// Loop counts and stop-at-end only.
    Loops,
}

impl UndoScope {
    pub fn touches_loops(self) -> bool {
        matches!(self, UndoScope::Structure | UndoScope::Loops)
    }
}

/// Identifies a gesture for undo coalescing. Sequential commands with the
/// same key within `COALESCE_WINDOW` share a single undo snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceKey {
    CellSettings { step: usize, col: usize },
    LoopCount(usize),
    SampleSettings(u8),
    /// No coalescing; structural changes always get their own snapshot.
    None,
}

/// Maximum time between coalesced commands (500ms).
const COALESCE_WINDOW: Duration = Duration::from_millis(500);

/// Loop settings as stored in history. Iterations are runtime state and are
/// not restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSnapshot {
    pub counts: Vec<u32>,
    pub stop_at_end: bool,
}

impl From<&PlaybackModeState> for LoopSnapshot {
    fn from(state: &PlaybackModeState) -> Self {
        Self {
            counts: state.loop_counts.clone(),
            stop_at_end: state.stop_at_end,
        }
    }
}

enum UndoEntry {
    Table(Box<TableState>),
    Structure {
        table: Box<TableState>,
        loops: LoopSnapshot,
    },
    Samples(Box<SampleBankState>),
    Loops(LoopSnapshot),
}

/// Live state an entry is taken from and restored into.
pub struct UndoTarget<'a> {
    pub table: &'a mut TableState,
    pub samples: &'a mut SampleBankState,
    pub loops: &'a mut LoopSnapshot,
}

pub struct UndoHistory {
    undo_stack: VecDeque<UndoEntry>,
    redo_stack: VecDeque<UndoEntry>,
    max_depth: usize,
    last_coalesce_key: CoalesceKey,
    last_push_time: Instant,
}

impl UndoHistory {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_depth: max_depth.max(1),
            last_coalesce_key: CoalesceKey::None,
            last_push_time: Instant::now(),
        }
    }

    /// Push a scoped snapshot before mutating state.
    pub fn push_scoped(
        &mut self,
        scope: UndoScope,
        table: &TableState,
        samples: &SampleBankState,
        loops: &LoopSnapshot,
    ) {
        let entry = snapshot(scope, table, samples, loops);
        if self.undo_stack.len() >= self.max_depth {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(entry);
        self.redo_stack.clear();
    }

    /// Push with coalescing. If `key` matches the previous push and less than
    /// `COALESCE_WINDOW` has elapsed, the push is skipped, keeping the
    /// pre-gesture snapshot already on the stack. Returns whether a snapshot
    /// was pushed.
    pub fn push_coalesced(
        &mut self,
        scope: UndoScope,
        table: &TableState,
        samples: &SampleBankState,
        loops: &LoopSnapshot,
        key: CoalesceKey,
    ) -> bool {
        let now = Instant::now();
        if key != CoalesceKey::None
            && key == self.last_coalesce_key
            && now.duration_since(self.last_push_time) < COALESCE_WINDOW
        {
            self.last_push_time = now;
            return false;
        }
        self.push_scoped(scope, table, samples, loops);
        self.last_coalesce_key = key;
        self.last_push_time = now;
        true
    }

    /// Drop the most recent snapshot (the command it guarded was rejected).
    pub fn discard_last(&mut self) {
        self.undo_stack.pop_back();
        self.clear_coalesce();
    }

    fn clear_coalesce(&mut self) {
        self.last_coalesce_key = CoalesceKey::None;
    }

    /// Undo: pop from the undo stack, snapshot the current state at the same
    /// scope for redo, restore the stored entry.
    pub fn undo(&mut self, target: UndoTarget<'_>) -> Option<UndoScope> {
        self.clear_coalesce();
        let entry = self.undo_stack.pop_back()?;
        let scope = entry_scope(&entry);
        let inverse = snapshot(scope, target.table, target.samples, target.loops);
        apply_entry(entry, target);
        self.redo_stack.push_back(inverse);
        Some(scope)
    }

    pub fn redo(&mut self, target: UndoTarget<'_>) -> Option<UndoScope> {
        self.clear_coalesce();
        let entry = self.redo_stack.pop_back()?;
        let scope = entry_scope(&entry);
        let inverse = snapshot(scope, target.table, target.samples, target.loops);
        apply_entry(entry, target);
        self.undo_stack.push_back(inverse);
        Some(scope)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.clear_coalesce();
    }
}

fn snapshot(
    scope: UndoScope,
    table: &TableState,
    samples: &SampleBankState,
    loops: &LoopSnapshot,
) -> UndoEntry {
    match scope {
        UndoScope::Table => UndoEntry::Table(Box::new(table.clone())),
        UndoScope::Structure => UndoEntry::Structure {
            table: Box::new(table.clone()),
            loops: loops.clone(),
        },
        UndoScope::Samples => UndoEntry::Samples(Box::new(samples.clone())),
        UndoScope::Loops => UndoEntry::Loops(loops.clone()),
    }
}

fn entry_scope(entry: &UndoEntry) -> UndoScope {
    match entry {
        UndoEntry::Table(_) => UndoScope::Table,
        UndoEntry::Structure { .. } => UndoScope::Structure,
        UndoEntry::Samples(_) => UndoScope::Samples,
        UndoEntry::Loops(_) => UndoScope::Loops,
    }
}

fn apply_entry(entry: UndoEntry, target: UndoTarget<'_>) {
    match entry {
        UndoEntry::Table(table) => *target.table = *table,
        UndoEntry::Structure { table, loops } => {
            *target.table = *table;
            *target.loops = loops;
        }
        UndoEntry::Samples(samples) => *target.samples = *samples,
        UndoEntry::Loops(loops) => *target.loops = loops,
    }
}

/// Determine the undo scope for a command based on what state it touches.
pub fn undo_scope(cmd: &SequencerCommand) -> UndoScope {
    match cmd {
        SequencerCommand::SetCell { .. }
        | SequencerCommand::SetCellSettings { .. }
        | SequencerCommand::SetCellSampleSlot { .. }
        | SequencerCommand::ClearCell { .. }
        | SequencerCommand::SetLayerLen { .. }
        | SequencerCommand::SetSectionMuted { .. } => UndoScope::Table,

        SequencerCommand::LoadSample { .. }
        | SequencerCommand::UnloadSample(_)
        | SequencerCommand::SetSampleSettings { .. } => UndoScope::Samples,

        SequencerCommand::SetLoopCount { .. } | SequencerCommand::SetStopAtEnd(_) => UndoScope::Loops,

        _ => UndoScope::Structure,
    }
}

/// Map a command to a coalesce key.
pub fn coalesce_key(cmd: &SequencerCommand) -> CoalesceKey {
    match cmd {
        SequencerCommand::SetCellSettings { step, col, .. } => CoalesceKey::CellSettings {
            step: *step,
            col: *col,
        },
        SequencerCommand::SetLoopCount { section, .. } => CoalesceKey::LoopCount(*section),
        SequencerCommand::SetSampleSettings { slot, .. } => CoalesceKey::SampleSettings(*slot),
        _ => CoalesceKey::None,
    }
}
