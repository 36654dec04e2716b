#![allow(dead_code)]

use std::sync::Arc;

use stepper_audio::engine::{EngineOp, EngineQuirks, PatternId, SharedTestEngine, TestEngine};
use stepper_audio::{AudioHandle, PatternEngine};
use stepper_core::dispatch::{dispatch_command, DispatchResult};
use stepper_core::state::AppState;
use stepper_types::{SeqResult, SequencerCommand, TableState};

/// A state + handle pair wired to a recording engine.
pub struct Session {
    pub engine: Arc<TestEngine>,
    pub state: AppState,
    pub audio: AudioHandle,
}

impl Session {
    pub fn new(lengths: &[usize]) -> Self {
        Self::with_quirks(lengths, EngineQuirks::default())
    }

    pub fn with_quirks(lengths: &[usize], quirks: EngineQuirks) -> Self {
        let engine = Arc::new(TestEngine::with_quirks(quirks));
        let mut audio = AudioHandle::new(Box::new(SharedTestEngine(engine.clone())));
        let state = AppState::new().with_table(TableState::with_sections(lengths).unwrap());
        audio.attach(&state).unwrap();
        engine.clear_operations();
        Self {
            engine,
            state,
            audio,
        }
    }

    pub fn run(&mut self, cmd: SequencerCommand) -> DispatchResult {
        self.try_run(cmd).unwrap()
    }

    pub fn try_run(&mut self, cmd: SequencerCommand) -> SeqResult<DispatchResult> {
        dispatch_command(&cmd, &mut self.state, &mut self.audio)
    }

    pub fn pattern(&self, section: usize) -> PatternId {
        self.audio.bindings()[section].unwrap().pattern
    }

    /// Timeline offsets as the engine reports them.
    pub fn engine_starts(&self) -> Vec<u32> {
        (0..self.state.table.section_count())
            .map(|s| self.engine.pattern_info(self.pattern(s)).unwrap().offset)
            .collect()
    }

    pub fn line(&self) -> u32 {
        self.engine.current_line()
    }

    pub fn seeks(&self) -> Vec<u32> {
        self.engine
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                EngineOp::Seek(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn rewinds(&self) -> usize {
        self.engine.count(|op| matches!(op, EngineOp::Rewind(_)))
    }

    /// Quiescent invariants: bindings match the table and the engine, the
    /// lock is released, and nothing touched the engine unlocked.
    pub fn assert_quiescent(&self) {
        assert!(self.state.table.is_consistent());
        self.audio.verify_bindings(&self.state.table).unwrap();
        assert!(!self.engine.is_locked());
        assert_eq!(self.engine.unlocked_mutations(), 0);
        assert_eq!(self.engine.max_lock_depth(), 1);
    }
}
