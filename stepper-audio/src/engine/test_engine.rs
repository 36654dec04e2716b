//! Simulated pattern engine for tests and headless runs.
//!
//! `TestEngine` keeps a model of patterns, timeline offsets, loop counters and
//! the playhead, records every call as an [`EngineOp`], and counts mutations
//! made outside the critical section. `advance` renders lines the way the
//! audio thread would: looping patterns per their loop mode, walking the
//! sequence, stopping or wrapping at the end.

use std::sync::{Arc, Mutex, MutexGuard};

use stepper_types::EngineError;

use super::backend::{EngineResult, PatternEngine, PatternEvent, PatternId, PatternLoop};

/// An operation recorded by `TestEngine` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    Lock,
    Unlock,
    NewPattern {
        pattern: PatternId,
        tracks: u32,
        lines: u32,
    },
    RemovePattern(PatternId),
    ResizePattern {
        pattern: PatternId,
        tracks: u32,
        lines: u32,
    },
    SetPatternOffset {
        pattern: PatternId,
        line: u32,
    },
    SetEvent {
        pattern: PatternId,
        track: u32,
        line: u32,
        event: PatternEvent,
    },
    SetPatternLoop {
        pattern: PatternId,
        mode: PatternLoop,
    },
    SetLoopIteration {
        pattern: PatternId,
        iteration: u32,
    },
    SetSequence(Vec<PatternId>),
    SetAutostop(bool),
    MutePattern {
        pattern: PatternId,
        muted: bool,
    },
    Seek(u32),
    Rewind(u32),
    Play,
    Stop,
    SetBpm(u32),
}

impl EngineOp {
    fn is_mutation(&self) -> bool {
        !matches!(self, EngineOp::Lock | EngineOp::Unlock)
    }
}

/// Engine behaviours the sync core has to tolerate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineQuirks {
    /// After an in-place shrink the render length changes but the reported
    /// line count keeps the old value.
    pub stale_length_after_shrink: bool,
    /// Setting a pattern's loop mode resets its iteration counter to zero.
    pub reset_iteration_on_loop_config: bool,
}

/// Read-only view of a simulated pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternInfo {
    pub tracks: u32,
    pub lines: u32,
    pub reported_lines: u32,
    pub offset: u32,
    pub loop_mode: PatternLoop,
    pub iteration: u32,
    pub muted: bool,
}

struct SimPattern {
    info: PatternInfo,
    events: Vec<PatternEvent>,
}

impl SimPattern {
    fn new(tracks: u32, lines: u32) -> Self {
        Self {
            info: PatternInfo {
                tracks,
                lines,
                reported_lines: lines,
                offset: 0,
                loop_mode: PatternLoop::Off,
                iteration: 0,
                muted: false,
            },
            events: vec![PatternEvent::EMPTY; (tracks * lines) as usize],
        }
    }

    fn resize(&mut self, tracks: u32, lines: u32, stale_shrink: bool) {
        let mut events = vec![PatternEvent::EMPTY; (tracks * lines) as usize];
        let keep_lines = lines.min(self.info.lines);
        let keep_tracks = tracks.min(self.info.tracks);
        for line in 0..keep_lines {
            for track in 0..keep_tracks {
                events[(line * tracks + track) as usize] =
                    self.events[(line * self.info.tracks + track) as usize];
            }
        }
        let shrinking = lines < self.info.lines;
        self.events = events;
        self.info.tracks = tracks;
        self.info.lines = lines;
        if !(shrinking && stale_shrink) {
            self.info.reported_lines = lines;
        }
    }

    fn end(&self) -> u32 {
        self.info.offset + self.info.lines
    }
}

struct SimState {
    patterns: Vec<Option<SimPattern>>,
    sequence: Vec<PatternId>,
    line: u32,
    playing: bool,
    autostop: bool,
    bpm: u32,
    lock_depth: u32,
    max_lock_depth: u32,
    unlocked_mutations: u32,
    cached_total_lines: u32,
    fail_new_pattern: bool,
    quirks: EngineQuirks,
    ops: Vec<EngineOp>,
}

impl SimState {
    fn record(&mut self, op: EngineOp) {
        if op.is_mutation() && self.lock_depth == 0 {
            self.unlocked_mutations += 1;
        }
        self.ops.push(op);
    }

    fn pattern(&self, id: PatternId) -> EngineResult<&SimPattern> {
        self.patterns
            .get(id as usize)
            .and_then(|p| p.as_ref())
            .ok_or_else(|| EngineError(format!("no pattern {}", id)))
    }

    fn pattern_mut(&mut self, id: PatternId) -> EngineResult<&mut SimPattern> {
        self.patterns
            .get_mut(id as usize)
            .and_then(|p| p.as_mut())
            .ok_or_else(|| EngineError(format!("no pattern {}", id)))
    }

    fn timeline_end(&self) -> u32 {
        self.patterns
            .iter()
            .flatten()
            .map(SimPattern::end)
            .max()
            .unwrap_or(0)
    }

    /// Position in the sequence of the pattern under the playhead.
    fn sequence_position(&self) -> Option<usize> {
        self.sequence.iter().position(|&id| {
            self.pattern(id)
                .map(|p| self.line >= p.info.offset && self.line < p.end())
                .unwrap_or(false)
        })
    }

    fn render_line(&mut self) {
        if !self.playing || self.sequence.is_empty() {
            return;
        }
        let pos = match self.sequence_position() {
            Some(pos) => pos,
            None => {
                // Playhead outside every sequenced pattern: snap to the first.
                if let Ok(first) = self.pattern(self.sequence[0]) {
                    self.line = first.info.offset;
                }
                return;
            }
        };
        let id = self.sequence[pos];
        let (offset, end) = match self.pattern(id) {
            Ok(p) => (p.info.offset, p.end()),
            Err(_) => return,
        };
        self.line += 1;
        if self.line < end {
            return;
        }

        let repeat = {
            let Ok(p) = self.pattern_mut(id) else { return };
            match p.info.loop_mode {
                PatternLoop::Infinite => {
                    p.info.iteration = p.info.iteration.saturating_add(1);
                    true
                }
                PatternLoop::Count(n) if p.info.iteration + 1 < n => {
                    p.info.iteration += 1;
                    true
                }
                _ => {
                    p.info.iteration = 0;
                    false
                }
            }
        };
        if repeat {
            self.line = offset;
            return;
        }
        if pos + 1 < self.sequence.len() {
            let next = self.sequence[pos + 1];
            if let Ok(p) = self.pattern(next) {
                self.line = p.info.offset;
            }
        } else if self.autostop {
            self.playing = false;
        } else {
            let first = self.sequence[0];
            if let Ok(p) = self.pattern(first) {
                self.line = p.info.offset;
            }
        }
    }
}

/// A simulated engine that records all operations for assertions.
/// Uses `Mutex` for interior mutability so the engine is `Send + Sync`
/// (needed for `Arc<TestEngine>` sharing).
pub struct TestEngine {
    state: Mutex<SimState>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_quirks(EngineQuirks::default())
    }

    pub fn with_quirks(quirks: EngineQuirks) -> Self {
        Self {
            state: Mutex::new(SimState {
                patterns: Vec::new(),
                sequence: Vec::new(),
                line: 0,
                playing: false,
                autostop: false,
                bpm: 120,
                lock_depth: 0,
                max_lock_depth: 0,
                unlocked_mutations: 0,
                cached_total_lines: 0,
                fail_new_pattern: false,
                quirks,
                ops: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // A poisoned test engine still holds a usable model.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All recorded operations.
    pub fn operations(&self) -> Vec<EngineOp> {
        self.state().ops.clone()
    }

    pub fn clear_operations(&self) {
        self.state().ops.clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&EngineOp) -> bool>(&self, f: F) -> usize {
        self.state().ops.iter().filter(|op| f(op)).count()
    }

    pub fn lock_acquisitions(&self) -> usize {
        self.count(|op| matches!(op, EngineOp::Lock))
    }

    /// Mutating calls made while the critical section was not held.
    pub fn unlocked_mutations(&self) -> u32 {
        self.state().unlocked_mutations
    }

    pub fn max_lock_depth(&self) -> u32 {
        self.state().max_lock_depth
    }

    pub fn is_locked(&self) -> bool {
        self.state().lock_depth > 0
    }

    pub fn pattern_info(&self, pattern: PatternId) -> Option<PatternInfo> {
        self.state().pattern(pattern).ok().map(|p| p.info)
    }

    pub fn live_patterns(&self) -> usize {
        self.state().patterns.iter().flatten().count()
    }

    pub fn event(&self, pattern: PatternId, track: u32, line: u32) -> Option<PatternEvent> {
        let st = self.state();
        let p = st.pattern(pattern).ok()?;
        if track >= p.info.tracks || line >= p.info.lines {
            return None;
        }
        p.events.get((line * p.info.tracks + track) as usize).copied()
    }

    pub fn sequence(&self) -> Vec<PatternId> {
        self.state().sequence.clone()
    }

    pub fn autostop(&self) -> bool {
        self.state().autostop
    }

    pub fn bpm(&self) -> u32 {
        self.state().bpm
    }

    /// Timeline length as last computed by a seek or rewind.
    pub fn cached_total_lines(&self) -> u32 {
        self.state().cached_total_lines
    }

    /// Timeline length from the current pattern layout.
    pub fn actual_total_lines(&self) -> u32 {
        self.state().timeline_end()
    }

    /// Place the playhead as if the audio thread had rendered up to `line`.
    /// Not recorded.
    pub fn set_current_line(&self, line: u32) {
        self.state().line = line;
    }

    /// Force the playing flag without recording an operation.
    pub fn set_playing(&self, playing: bool) {
        self.state().playing = playing;
    }

    /// Overwrite a pattern's iteration counter as the audio thread would.
    pub fn set_iteration(&self, pattern: PatternId, iteration: u32) {
        if let Ok(p) = self.state().pattern_mut(pattern) {
            p.info.iteration = iteration;
        }
    }

    /// Make the next `new_pattern` call fail.
    pub fn fail_next_new_pattern(&self) {
        self.state().fail_new_pattern = true;
    }

    /// Render `lines` timeline lines.
    pub fn advance(&self, lines: u32) {
        let mut st = self.state();
        for _ in 0..lines {
            st.render_line();
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternEngine for TestEngine {
    fn lock(&self) {
        let mut st = self.state();
        st.lock_depth += 1;
        st.max_lock_depth = st.max_lock_depth.max(st.lock_depth);
        st.record(EngineOp::Lock);
    }

    fn unlock(&self) {
        let mut st = self.state();
        st.lock_depth = st.lock_depth.saturating_sub(1);
        st.record(EngineOp::Unlock);
    }

    fn new_pattern(&self, tracks: u32, lines: u32) -> EngineResult<PatternId> {
        let mut st = self.state();
        if std::mem::take(&mut st.fail_new_pattern) {
            return Err(EngineError("pattern allocation failed".to_string()));
        }
        if tracks == 0 || lines == 0 {
            return Err(EngineError(format!("invalid pattern size {}x{}", tracks, lines)));
        }
        let pattern = st.patterns.len() as PatternId;
        st.patterns.push(Some(SimPattern::new(tracks, lines)));
        st.record(EngineOp::NewPattern {
            pattern,
            tracks,
            lines,
        });
        Ok(pattern)
    }

    fn remove_pattern(&self, pattern: PatternId) -> EngineResult {
        let mut st = self.state();
        st.pattern(pattern)?;
        st.patterns[pattern as usize] = None;
        st.sequence.retain(|&id| id != pattern);
        st.record(EngineOp::RemovePattern(pattern));
        Ok(())
    }

    fn resize_pattern(&self, pattern: PatternId, tracks: u32, lines: u32) -> EngineResult {
        let mut st = self.state();
        if tracks == 0 || lines == 0 {
            return Err(EngineError(format!("invalid pattern size {}x{}", tracks, lines)));
        }
        let stale = st.quirks.stale_length_after_shrink;
        st.pattern_mut(pattern)?.resize(tracks, lines, stale);
        st.record(EngineOp::ResizePattern {
            pattern,
            tracks,
            lines,
        });
        Ok(())
    }

    fn pattern_lines(&self, pattern: PatternId) -> EngineResult<u32> {
        Ok(self.state().pattern(pattern)?.info.reported_lines)
    }

    fn set_pattern_offset(&self, pattern: PatternId, line: u32) -> EngineResult {
        let mut st = self.state();
        st.pattern_mut(pattern)?.info.offset = line;
        st.record(EngineOp::SetPatternOffset { pattern, line });
        Ok(())
    }

    fn pattern_offset(&self, pattern: PatternId) -> EngineResult<u32> {
        Ok(self.state().pattern(pattern)?.info.offset)
    }

    fn set_event(&self, pattern: PatternId, track: u32, line: u32, event: PatternEvent) -> EngineResult {
        let mut st = self.state();
        let p = st.pattern_mut(pattern)?;
        if track >= p.info.tracks || line >= p.info.lines {
            return Err(EngineError(format!(
                "event {}:{} outside pattern {}",
                track, line, pattern
            )));
        }
        let idx = (line * p.info.tracks + track) as usize;
        p.events[idx] = event;
        st.record(EngineOp::SetEvent {
            pattern,
            track,
            line,
            event,
        });
        Ok(())
    }

    fn set_pattern_loop(&self, pattern: PatternId, mode: PatternLoop) -> EngineResult {
        let mut st = self.state();
        let reset = st.quirks.reset_iteration_on_loop_config;
        let p = st.pattern_mut(pattern)?;
        p.info.loop_mode = mode;
        if reset {
            p.info.iteration = 0;
        }
        st.record(EngineOp::SetPatternLoop { pattern, mode });
        Ok(())
    }

    fn pattern_loop_iteration(&self, pattern: PatternId) -> EngineResult<u32> {
        Ok(self.state().pattern(pattern)?.info.iteration)
    }

    fn set_pattern_loop_iteration(&self, pattern: PatternId, iteration: u32) -> EngineResult {
        let mut st = self.state();
        st.pattern_mut(pattern)?.info.iteration = iteration;
        st.record(EngineOp::SetLoopIteration { pattern, iteration });
        Ok(())
    }

    fn set_sequence(&self, patterns: &[PatternId]) -> EngineResult {
        let mut st = self.state();
        for &id in patterns {
            st.pattern(id)?;
        }
        st.sequence = patterns.to_vec();
        st.record(EngineOp::SetSequence(patterns.to_vec()));
        Ok(())
    }

    fn set_autostop(&self, enabled: bool) -> EngineResult {
        let mut st = self.state();
        st.autostop = enabled;
        st.record(EngineOp::SetAutostop(enabled));
        Ok(())
    }

    fn mute_pattern(&self, pattern: PatternId, muted: bool) -> EngineResult {
        let mut st = self.state();
        st.pattern_mut(pattern)?.info.muted = muted;
        st.record(EngineOp::MutePattern { pattern, muted });
        Ok(())
    }

    fn current_line(&self) -> u32 {
        self.state().line
    }

    fn seek(&self, line: u32) -> EngineResult {
        let mut st = self.state();
        st.line = line;
        st.cached_total_lines = st.timeline_end();
        st.record(EngineOp::Seek(line));
        Ok(())
    }

    fn rewind(&self, line: u32) -> EngineResult {
        let mut st = self.state();
        st.line = line;
        st.cached_total_lines = st.timeline_end();
        st.record(EngineOp::Rewind(line));
        Ok(())
    }

    fn play(&self) -> EngineResult {
        let mut st = self.state();
        st.playing = true;
        st.record(EngineOp::Play);
        Ok(())
    }

    fn stop(&self) -> EngineResult {
        let mut st = self.state();
        st.playing = false;
        st.record(EngineOp::Stop);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state().playing
    }

    fn set_bpm(&self, bpm: u32) -> EngineResult {
        let mut st = self.state();
        st.bpm = bpm;
        st.record(EngineOp::SetBpm(bpm));
        Ok(())
    }
}

/// Wraps `Arc<TestEngine>` so the audio handle can own a
/// `Box<dyn PatternEngine>` while tests retain an `Arc` for assertions.
pub struct SharedTestEngine(pub Arc<TestEngine>);

impl PatternEngine for SharedTestEngine {
    fn lock(&self) {
        self.0.lock()
    }
    fn unlock(&self) {
        self.0.unlock()
    }
    fn new_pattern(&self, tracks: u32, lines: u32) -> EngineResult<PatternId> {
        self.0.new_pattern(tracks, lines)
    }
    fn remove_pattern(&self, pattern: PatternId) -> EngineResult {
        self.0.remove_pattern(pattern)
    }
    fn resize_pattern(&self, pattern: PatternId, tracks: u32, lines: u32) -> EngineResult {
        self.0.resize_pattern(pattern, tracks, lines)
    }
    fn pattern_lines(&self, pattern: PatternId) -> EngineResult<u32> {
        self.0.pattern_lines(pattern)
    }
    fn set_pattern_offset(&self, pattern: PatternId, line: u32) -> EngineResult {
        self.0.set_pattern_offset(pattern, line)
    }
    fn pattern_offset(&self, pattern: PatternId) -> EngineResult<u32> {
        self.0.pattern_offset(pattern)
    }
    fn set_event(&self, pattern: PatternId, track: u32, line: u32, event: PatternEvent) -> EngineResult {
        self.0.set_event(pattern, track, line, event)
    }
    fn set_pattern_loop(&self, pattern: PatternId, mode: PatternLoop) -> EngineResult {
        self.0.set_pattern_loop(pattern, mode)
    }
    fn pattern_loop_iteration(&self, pattern: PatternId) -> EngineResult<u32> {
        self.0.pattern_loop_iteration(pattern)
    }
    fn set_pattern_loop_iteration(&self, pattern: PatternId, iteration: u32) -> EngineResult {
        self.0.set_pattern_loop_iteration(pattern, iteration)
    }
    fn set_sequence(&self, patterns: &[PatternId]) -> EngineResult {
        self.0.set_sequence(patterns)
    }
    fn set_autostop(&self, enabled: bool) -> EngineResult {
        self.0.set_autostop(enabled)
    }
    fn mute_pattern(&self, pattern: PatternId, muted: bool) -> EngineResult {
        self.0.mute_pattern(pattern, muted)
    }
    fn current_line(&self) -> u32 {
        self.0.current_line()
    }
    fn seek(&self, line: u32) -> EngineResult {
        self.0.seek(line)
    }
    fn rewind(&self, line: u32) -> EngineResult {
        self.0.rewind(line)
    }
    fn play(&self) -> EngineResult {
        self.0.play()
    }
    fn stop(&self) -> EngineResult {
        self.0.stop()
    }
    fn is_playing(&self) -> bool {
        self.0.is_playing()
    }
    fn set_bpm(&self, bpm: u32) -> EngineResult {
        self.0.set_bpm(bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_patterns(engine: &TestEngine) -> (PatternId, PatternId) {
        engine.lock();
        let a = engine.new_pattern(1, 4).unwrap();
        let b = engine.new_pattern(1, 2).unwrap();
        engine.set_pattern_offset(b, 4).unwrap();
        engine.set_sequence(&[a, b]).unwrap();
        engine.unlock();
        (a, b)
    }

    #[test]
    fn test_unlocked_mutations_are_counted() {
        let engine = TestEngine::new();
        engine.set_bpm(90).unwrap();
        assert_eq!(engine.unlocked_mutations(), 1);
        engine.lock();
        engine.set_bpm(100).unwrap();
        engine.unlock();
        assert_eq!(engine.unlocked_mutations(), 1);
    }

    #[test]
    fn test_stale_length_quirk() {
        let engine = TestEngine::with_quirks(EngineQuirks {
            stale_length_after_shrink: true,
            ..Default::default()
        });
        engine.lock();
        let p = engine.new_pattern(2, 8).unwrap();
        engine.resize_pattern(p, 2, 4).unwrap();
        assert_eq!(engine.pattern_lines(p).unwrap(), 8);
        engine.resize_pattern(p, 2, 10).unwrap();
        assert_eq!(engine.pattern_lines(p).unwrap(), 10);
        engine.unlock();
    }

    #[test]
    fn test_counted_loop_then_next_pattern() {
        let engine = TestEngine::new();
        let (a, b) = two_patterns(&engine);
        engine.lock();
        engine.set_pattern_loop(a, PatternLoop::Count(2)).unwrap();
        engine.unlock();
        engine.set_playing(true);
        engine.advance(4);
        assert_eq!(engine.current_line(), 0);
        assert_eq!(engine.pattern_loop_iteration(a).unwrap(), 1);
        engine.advance(4);
        assert_eq!(engine.current_line(), 4);
        assert_eq!(engine.pattern_loop_iteration(a).unwrap(), 0);
        // b plays once, then the sequence wraps.
        engine.advance(2);
        assert_eq!(engine.current_line(), 0);
        let _ = b;
    }

    #[test]
    fn test_autostop_at_end_of_sequence() {
        let engine = TestEngine::new();
        two_patterns(&engine);
        engine.lock();
        engine.set_autostop(true).unwrap();
        engine.unlock();
        engine.set_playing(true);
        engine.advance(6);
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_seek_refreshes_cached_length() {
        let engine = TestEngine::new();
        let (a, _) = two_patterns(&engine);
        assert_eq!(engine.cached_total_lines(), 0);
        engine.lock();
        engine.resize_pattern(a, 1, 8).unwrap();
        engine.seek(0).unwrap();
        engine.unlock();
        assert_eq!(engine.cached_total_lines(), 8);
    }
}
