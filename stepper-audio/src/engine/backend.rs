//! Pattern engine trait: the control-plane surface of the external renderer.
//!
//! `PatternEngine` captures what the sync core needs from a pattern-based
//! playback engine (patterns on a global timeline, per-pattern loop counters,
//! a playhead that can be moved without stopping audio) independently of the
//! concrete engine. This enables unit testing of the edit protocol without a
//! running audio thread.

use std::ops::Deref;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use stepper_types::{EngineError, VoiceHandle};

use crate::telemetry::LockTelemetry;

/// Result type for engine operations.
pub type EngineResult<T = ()> = Result<T, EngineError>;

/// Engine-assigned pattern identifier.
pub type PatternId = u32;

/// One event written into a pattern cell.
///
/// `note == 0` means "no note"; [`PatternEvent::EMPTY`] clears a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEvent {
    pub note: u8,
    pub velocity: u8,
    pub voice: Option<VoiceHandle>,
    pub effect: u16,
    pub effect_param: u16,
}

impl PatternEvent {
    pub const EMPTY: PatternEvent = PatternEvent {
        note: 0,
        velocity: 0,
        voice: None,
        effect: 0,
        effect_param: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.note == 0 && self.effect == 0
    }
}

/// Loop behaviour of a single pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternLoop {
    /// Play once and continue with the next pattern in the sequence.
    #[default]
    Off,
    /// Repeat until reconfigured.
    Infinite,
    /// Repeat this many passes, then continue.
    Count(u32),
}

/// Control-plane contract of the external pattern engine.
///
/// Every mutating method must be called between [`PatternEngine::lock`] and
/// [`PatternEngine::unlock`]; callers in this crate do so through
/// [`EngineLock`]. Queries may be made at any time.
pub trait PatternEngine: Send {
    /// Enter the engine's global critical section. The audio thread does not
    /// render while it is held.
    fn lock(&self);

    /// Leave the critical section.
    fn unlock(&self);

    /// Create a pattern of `tracks` × `lines`.
    fn new_pattern(&self, tracks: u32, lines: u32) -> EngineResult<PatternId>;

    fn remove_pattern(&self, pattern: PatternId) -> EngineResult;

    /// Resize in place. Success must be re-verified through
    /// [`PatternEngine::pattern_lines`].
    fn resize_pattern(&self, pattern: PatternId, tracks: u32, lines: u32) -> EngineResult;

    /// Line count as reported by the engine.
    fn pattern_lines(&self, pattern: PatternId) -> EngineResult<u32>;

    /// Move a pattern on the global timeline without interrupting playback.
    fn set_pattern_offset(&self, pattern: PatternId, line: u32) -> EngineResult;

    fn pattern_offset(&self, pattern: PatternId) -> EngineResult<u32>;

    fn set_event(&self, pattern: PatternId, track: u32, line: u32, event: PatternEvent) -> EngineResult;

    fn set_pattern_loop(&self, pattern: PatternId, mode: PatternLoop) -> EngineResult;

    /// Completed passes of the pattern in its current visit.
    fn pattern_loop_iteration(&self, pattern: PatternId) -> EngineResult<u32>;

    fn set_pattern_loop_iteration(&self, pattern: PatternId, iteration: u32) -> EngineResult;

    /// Ordered patterns for multi-section playback.
    fn set_sequence(&self, patterns: &[PatternId]) -> EngineResult;

    /// Stop after the last pattern of the sequence instead of wrapping.
    fn set_autostop(&self, enabled: bool) -> EngineResult;

    fn mute_pattern(&self, pattern: PatternId, muted: bool) -> EngineResult;

    /// Current global timeline line.
    fn current_line(&self) -> u32;

    /// Move the playhead without stopping audio. Also forces the engine to
    /// recompute its cached total timeline length.
    fn seek(&self, line: u32) -> EngineResult;

    /// Stop-and-restart positioning. Audible; never used for edits.
    fn rewind(&self, line: u32) -> EngineResult;

    fn play(&self) -> EngineResult;

    fn stop(&self) -> EngineResult;

    fn is_playing(&self) -> bool;

    fn set_bpm(&self, bpm: u32) -> EngineResult;
}

/// Scoped hold of the engine's critical section.
///
/// Acquired once per atomic edit; released on drop. The hold time is recorded
/// into [`LockTelemetry`].
pub struct EngineLock<'a> {
    engine: &'a dyn PatternEngine,
    telemetry: &'a mut LockTelemetry,
    acquired_at: Instant,
}

impl<'a> EngineLock<'a> {
    pub fn acquire(engine: &'a dyn PatternEngine, telemetry: &'a mut LockTelemetry) -> Self {
        engine.lock();
        Self {
            engine,
            telemetry,
            acquired_at: Instant::now(),
        }
    }
}

impl<'a> Deref for EngineLock<'a> {
    type Target = dyn PatternEngine + 'a;

    fn deref(&self) -> &Self::Target {
        self.engine
    }
}

impl Drop for EngineLock<'_> {
    fn drop(&mut self) {
        let held = self.acquired_at.elapsed();
        self.engine.unlock();
        self.telemetry.record(held);
    }
}
