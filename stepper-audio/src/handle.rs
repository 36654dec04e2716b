//! AudioHandle: control-thread interface to the pattern engine.
//!
//! Owns the engine, the section bindings, the loop controller and the shared
//! monitor. Every operation that mutates the engine takes the engine lock
//! exactly once; findings are collected while it is held and logged after it
//! is released.

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use stepper_types::limits::{clamp_bpm, DEFAULT_SECTION_LOOPS, MAX_SECTIONS};
use stepper_types::{
    PlaybackFeedback, PlaybackMode, PlaybackModeState, SeqError, SeqResult, TableState,
};

use crate::continuity::{self, RemapOutcome, StructuralEdit};
use crate::engine::{EngineLock, PatternEngine, PatternId};
use crate::looping::{LoopController, PassOutcome};
use crate::monitor::{PlaybackMonitor, PlaybackSnapshot};
use crate::sync::{PatternBinding, PatternSync, PatternUpdate};
use crate::telemetry::{LockSummary, LockTelemetry, DEFAULT_LOCK_BUDGET_US};
use crate::timeline::{self, TimelineReport};
use crate::voices::VoiceProvider;
use crate::SyncStateProvider;

/// Passes `poll` will replay before snapping to the engine's position.
const MAX_POLL_PASSES: usize = 16;

/// Runtime settings for the audio handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub lock_budget_us: u32,
    pub consistency_checks: bool,
    pub default_loops: u32,
    pub stop_at_end: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            lock_budget_us: DEFAULT_LOCK_BUDGET_US,
            consistency_checks: true,
            default_loops: DEFAULT_SECTION_LOOPS,
            stop_at_end: false,
        }
    }
}

fn mark(mask: &mut u64, section: usize) {
    *mask |= 1u64.checked_shl(section as u32).unwrap_or(0);
}

fn sections_in(mask: u64) -> impl Iterator<Item = usize> {
    (0..MAX_SECTIONS).filter(move |&s| mask & (1u64 << s) != 0)
}

/// What one structural edit did to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EditReport {
    pub edit: StructuralEdit,
    /// Bitmasks over section indices (post-edit).
    pub created: u64,
    pub resized: u64,
    pub recreated: u64,
    pub timeline: TimelineReport,
    pub remap: Option<RemapOutcome>,
    pub loop_refreshed: bool,
    /// Loop iteration carried across the edit.
    pub iteration: u32,
}

impl EditReport {
    fn new(edit: StructuralEdit) -> Self {
        Self {
            edit,
            created: 0,
            resized: 0,
            recreated: 0,
            timeline: TimelineReport::default(),
            remap: None,
            loop_refreshed: false,
            iteration: 0,
        }
    }

    pub fn recreated_sections(&self) -> impl Iterator<Item = usize> {
        sections_in(self.recreated)
    }
}

#[derive(Serialize)]
struct DebugDump<'a> {
    playing: bool,
    line: u32,
    bindings: &'a [Option<PatternBinding>],
    loop_state: &'a PlaybackModeState,
    lock: LockSummary,
}

pub struct AudioHandle {
    engine: Box<dyn PatternEngine>,
    sync: PatternSync,
    looping: LoopController,
    telemetry: LockTelemetry,
    monitor: PlaybackMonitor,
    feedback_tx: Sender<PlaybackFeedback>,
    feedback_rx: Receiver<PlaybackFeedback>,
    /// Reused for `set_sequence` so the lock never allocates.
    sequence_buf: Vec<PatternId>,
    consistency_checks: bool,
    was_playing: bool,
}

impl AudioHandle {
    pub fn new(engine: Box<dyn PatternEngine>) -> Self {
        Self::with_settings(engine, AudioSettings::default())
    }

    pub fn with_settings(engine: Box<dyn PatternEngine>, settings: AudioSettings) -> Self {
        let (feedback_tx, feedback_rx) = crossbeam_channel::unbounded();
        let looping = LoopController::new(0, settings.default_loops, settings.stop_at_end);
        let monitor = PlaybackMonitor::new();
        monitor.set_mode(looping.mode());
        Self {
            engine,
            sync: PatternSync::new(),
            looping,
            telemetry: LockTelemetry::new(settings.lock_budget_us),
            monitor,
            feedback_tx,
            feedback_rx,
            sequence_buf: Vec::with_capacity(MAX_SECTIONS),
            consistency_checks: settings.consistency_checks,
            was_playing: false,
        }
    }

    pub fn engine(&self) -> &dyn PatternEngine {
        &*self.engine
    }

    pub fn monitor(&self) -> PlaybackMonitor {
        self.monitor.clone()
    }

    pub fn bindings(&self) -> &[Option<PatternBinding>] {
        self.sync.bindings()
    }

    pub fn loop_state(&self) -> &PlaybackModeState {
        self.looping.state()
    }

    pub fn is_track_muted(&self, col: usize) -> bool {
        self.sync.is_track_muted(col)
    }

    pub fn telemetry_summary(&mut self) -> LockSummary {
        self.telemetry.take_summary()
    }

    fn emit(&self, feedback: PlaybackFeedback) {
        // The receiver lives in self, so this cannot fail.
        let _ = self.feedback_tx.send(feedback);
    }

    pub fn drain_feedback(&mut self) -> Vec<PlaybackFeedback> {
        self.feedback_rx.try_iter().collect()
    }

    /// Build every pattern from scratch for the current table.
    pub fn attach(&mut self, state: &dyn SyncStateProvider) -> SeqResult<EditReport> {
        self.apply_structural_edit(state, StructuralEdit::Rebuilt)
    }

    pub fn sync_cell(&mut self, state: &dyn SyncStateProvider, step: usize, col: usize) -> SeqResult {
        let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
        self.sync.sync_cell(&lock, state.table(), state.voices(), step, col)
    }

    /// Resync a set of cells under one lock.
    pub fn sync_cells(&mut self, state: &dyn SyncStateProvider, cells: &[(usize, usize)]) -> SeqResult {
        if cells.is_empty() {
            return Ok(());
        }
        let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
        for &(step, col) in cells {
            self.sync.sync_cell(&lock, state.table(), state.voices(), step, col)?;
        }
        Ok(())
    }

    pub fn sync_section(&mut self, state: &dyn SyncStateProvider, section: usize) -> SeqResult {
        let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
        self.sync.sync_section(&lock, state.table(), state.voices(), section)
    }

    pub fn sync_all(&mut self, state: &dyn SyncStateProvider) -> SeqResult {
        let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
        for section in 0..state.table().section_count() {
            self.sync.sync_section(&lock, state.table(), state.voices(), section)?;
        }
        Ok(())
    }

    /// Apply a structural edit that has already landed in the table.
    ///
    /// One critical section covers: playhead capture, binding permutation,
    /// pattern create/resize with verification, event sync, timeline
    /// repositioning, the reseek, and the loop-config refresh.
    pub fn apply_structural_edit(
        &mut self,
        state: &dyn SyncStateProvider,
        edit: StructuralEdit,
    ) -> SeqResult<EditReport> {
        let table = state.table();
        if table.section_count() > MAX_SECTIONS {
            return Err(SeqError::exhausted(format!(
                "{} sections exceed the engine limit",
                table.section_count()
            )));
        }
        let mut report = EditReport::new(edit);
        let result = {
            let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
            run_edit(
                &lock,
                &mut self.sync,
                &mut self.looping,
                table,
                state.voices(),
                &mut self.sequence_buf,
                self.consistency_checks,
                &mut report,
            )
        };

        if let Err(e) = result {
            log::error!(target: "audio::continuity", "structural edit {:?} failed: {}", edit, e);
            return Err(e);
        }

        for section in report.recreated_sections() {
            log::info!(
                target: "audio::sync",
                "section {} pattern recreated after resize verification failed",
                section
            );
            self.emit(PlaybackFeedback::PatternRecreated { section });
        }
        report.timeline.log();
        if let Some(m) = report.timeline.first_mismatch {
            self.emit(PlaybackFeedback::ConsistencyWarning {
                section: m.section,
                expected: m.expected_lines,
                actual: m.actual_lines,
            });
        }
        if let Some(out) = report.remap {
            log::debug!(
                target: "audio::continuity",
                "{:?}: playhead {} -> {} (section {}, line {}{})",
                edit,
                out.before_line,
                out.after_line,
                out.section,
                out.local,
                if out.clamped { ", clamped" } else { "" }
            );
            self.monitor.set_line(out.after_line);
        }
        self.monitor
            .set_position(self.looping.current_section(), self.looping.current_iteration());
        self.monitor.bump_layout();
        Ok(report)
    }

    /// Run the timeline positioning pass on its own and reseek in place.
    pub fn reposition_timeline(&mut self, state: &dyn SyncStateProvider) -> SeqResult<TimelineReport> {
        let report = {
            let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
            let report = timeline::reposition(
                &lock,
                &mut self.sync,
                state.table().sections(),
                self.consistency_checks,
            )?;
            let line = lock.current_line().min(report.total_lines.saturating_sub(1));
            lock.seek(line)?;
            report
        };
        report.log();
        Ok(report)
    }

    /// Switch playback mode with a single non-destructive seek.
    ///
    /// Entering SingleLoop on the section under the playhead keeps the
    /// playhead where it is; entering it on another section starts that
    /// section from its first line. Sequence mode always resumes from the
    /// section under the playhead; `section` only applies when there is none.
    pub fn set_mode(&mut self, mode: PlaybackMode, section: usize) -> SeqResult {
        if section >= self.sync.section_count() {
            return Err(SeqError::invalid(format!("section {} out of range", section)));
        }
        let (from_mode, section, target_line) = {
            let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
            let anchor = continuity::capture(&lock, &self.sync);
            if let Some(a) = anchor {
                let iteration = self
                    .sync
                    .pattern(a.section)
                    .and_then(|p| lock.pattern_loop_iteration(p).ok())
                    .unwrap_or(0);
                self.looping.observe(a.section, iteration);
            }
            let section = match (mode, anchor) {
                (PlaybackMode::Sequence, Some(a)) => a.section,
                _ => section,
            };
            let from_mode = self.looping.mode();
            self.looping.set_mode(mode, section)?;

            let target_line = match (mode, anchor) {
                (PlaybackMode::SingleLoop, Some(a)) if a.section != section => {
                    self.sync.binding(section).map(|b| b.timeline_offset)
                }
                (_, Some(a)) => self.sync.binding(a.section).map(|b| {
                    b.timeline_offset + a.local.min(b.line_count.saturating_sub(1))
                }),
                (_, None) => None,
            }
            .unwrap_or(0);

            self.looping.apply_config(
                &lock,
                &self.sync,
                &mut self.sequence_buf,
                self.looping.current_iteration(),
            )?;
            lock.seek(target_line)?;
            (from_mode, section, target_line)
        };

        log::debug!(
            target: "audio::looping",
            "mode {:?} -> {:?} (section {}), seek {}",
            from_mode,
            mode,
            section,
            target_line
        );
        self.monitor.set_mode(mode);
        self.monitor.set_line(target_line);
        self.monitor
            .set_position(self.looping.current_section(), self.looping.current_iteration());
        self.emit(PlaybackFeedback::ModeChanged { mode, section });
        Ok(())
    }

    pub fn set_loop_count(&mut self, section: usize, count: u32) -> SeqResult {
        self.looping.set_loop_count(section, count)?;
        if self.looping.mode() != PlaybackMode::Sequence {
            return Ok(());
        }
        let Some(pattern) = self.sync.pattern(section) else {
            return Ok(());
        };
        let count = self.looping.state().loop_count(section);
        let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
        let iteration = lock.pattern_loop_iteration(pattern)?;
        lock.set_pattern_loop(pattern, self.looping.loop_config_for(section))?;
        lock.set_pattern_loop_iteration(pattern, iteration.min(count - 1))?;
        Ok(())
    }

    /// Restore loop counts and stop-at-end from history. Takes effect on the
    /// next structural edit.
    pub fn restore_loop_state(&mut self, loop_counts: &[u32], stop_at_end: bool) {
        self.looping.restore(loop_counts, stop_at_end);
    }

    pub fn set_stop_at_end(&mut self, enabled: bool) -> SeqResult {
        self.looping.set_stop_at_end(enabled);
        let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
        lock.set_autostop(self.looping.mode() == PlaybackMode::Sequence && enabled)?;
        Ok(())
    }

    /// Start playback at `step`. The only caller of the destructive rewind.
    pub fn play(&mut self, from_step: usize) -> SeqResult {
        let requested = from_step as u32;
        let (section, line) = match self.looping.mode() {
            PlaybackMode::SingleLoop => {
                let section = self.looping.current_section();
                let binding = self
                    .sync
                    .binding(section)
                    .ok_or_else(|| SeqError::inconsistent(format!("section {} has no pattern", section)))?;
                let inside = requested >= binding.timeline_offset
                    && requested < binding.timeline_offset + binding.line_count;
                (section, if inside { requested } else { binding.timeline_offset })
            }
            PlaybackMode::Sequence => {
                let (section, _) = self
                    .sync
                    .locate_line(requested)
                    .ok_or_else(|| SeqError::invalid(format!("step {} outside the timeline", from_step)))?;
                match self.looping.state().region_bounds() {
                    Some((first, _)) if !self.looping.state().in_region(section) => {
                        let offset = self.sync.binding(first).map(|b| b.timeline_offset).unwrap_or(0);
                        (first, offset)
                    }
                    _ => (section, requested),
                }
            }
        };
        {
            let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
            // A restart plays every section its full loop count again.
            for binding in self.sync.bindings().iter().flatten() {
                lock.set_pattern_loop_iteration(binding.pattern, 0)?;
            }
            lock.rewind(line)?;
            lock.play()?;
        }
        self.looping.reset_iterations();
        self.looping.observe(section, 0);
        self.was_playing = true;
        self.monitor.set_playing(true);
        self.monitor.set_line(line);
        self.monitor.set_position(section, 0);
        Ok(())
    }

    /// Limit Sequence playback to steps `start..end`. Both ends must fall on
    /// section boundaries. A playhead inside the region stays where it is;
    /// otherwise it moves to the region's first line. One lock, one seek.
    pub fn set_region(&mut self, table: &TableState, start: usize, end: usize) -> SeqResult {
        let sections = table.sections();
        let first = sections
            .section_at_step(start)
            .filter(|&i| sections.get(i).map(|s| s.start_step()) == Some(start));
        let last = end
            .checked_sub(1)
            .and_then(|e| sections.section_at_step(e))
            .filter(|&i| sections.get(i).map(|s| s.end_step()) == Some(end));
        let (Some(first), Some(last)) = (first, last) else {
            return Err(SeqError::invalid(format!(
                "region {}..{} does not fall on section boundaries",
                start, end
            )));
        };
        if first > last || last >= self.sync.section_count() {
            return Err(SeqError::invalid(format!("region {}..{} is empty", start, end)));
        }
        self.apply_region(Some((first, last)))?;
        self.emit(PlaybackFeedback::RegionChanged {
            region: Some((start, end)),
        });
        Ok(())
    }

    pub fn clear_region(&mut self) -> SeqResult {
        if self.looping.state().region_bounds().is_none() {
            return Ok(());
        }
        self.apply_region(None)?;
        self.emit(PlaybackFeedback::RegionChanged { region: None });
        Ok(())
    }

    fn apply_region(&mut self, region: Option<(usize, usize)>) -> SeqResult {
        let from = self.looping.current_section();
        let line = {
            let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
            let anchor = continuity::capture(&lock, &self.sync);
            match region {
                Some((first, last)) => self.looping.set_region(first, last)?,
                None => self.looping.clear_region(),
            }

            let sequencing = self.looping.mode() == PlaybackMode::Sequence;
            let inside = anchor.filter(|a| !sequencing || self.looping.state().in_region(a.section));
            let (section, line) = match (inside, region) {
                (Some(a), _) => {
                    let line = self
                        .sync
                        .binding(a.section)
                        .map(|b| b.timeline_offset + a.local.min(b.line_count.saturating_sub(1)))
                        .unwrap_or(a.line);
                    (a.section, line)
                }
                (None, Some((first, _))) => (first, self.sync.binding(first).map(|b| b.timeline_offset).unwrap_or(0)),
                (None, None) => (self.looping.current_section(), lock.current_line()),
            };
            let iteration = if inside.is_some() {
                self.sync
                    .pattern(section)
                    .and_then(|p| lock.pattern_loop_iteration(p).ok())
                    .unwrap_or(0)
            } else {
                0
            };
            if sequencing {
                self.looping.observe(section, iteration);
            }
            let iteration = self.looping.current_iteration();
            self.looping
                .apply_config(&lock, &self.sync, &mut self.sequence_buf, iteration)?;
            lock.seek(line)?;
            line
        };

        log::debug!(
            target: "audio::looping",
            "region {:?}, sequence {:?}, seek {}",
            region,
            self.looping.state().sequence_order,
            line
        );
        let to = self.looping.current_section();
        if from != to {
            self.emit(PlaybackFeedback::SectionChanged { from, to });
        }
        self.monitor.set_line(line);
        self.monitor.set_position(to, self.looping.current_iteration());
        Ok(())
    }

    /// Jump to the first line of `section` without interrupting playback.
    ///
    /// In SingleLoop mode the jump moves the loop to that section. Every
    /// loop counter restarts, as it does on `play`.
    pub fn switch_to_section(&mut self, section: usize) -> SeqResult {
        if section >= self.sync.section_count() {
            return Err(SeqError::invalid(format!("section {} out of range", section)));
        }
        let mode = self.looping.mode();
        if mode == PlaybackMode::Sequence && !self.looping.state().in_region(section) {
            return Err(SeqError::invalid(format!(
                "section {} is outside the playback region",
                section
            )));
        }
        let from = self.looping.current_section();
        let line = {
            let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
            let line = self
                .sync
                .binding(section)
                .map(|b| b.timeline_offset)
                .ok_or_else(|| SeqError::inconsistent(format!("section {} has no pattern", section)))?;
            if mode == PlaybackMode::SingleLoop {
                self.looping.set_mode(mode, section)?;
            }
            self.looping.reset_iterations();
            self.looping.observe(section, 0);
            for binding in self.sync.bindings().iter().flatten() {
                lock.set_pattern_loop_iteration(binding.pattern, 0)?;
            }
            self.looping
                .apply_config(&lock, &self.sync, &mut self.sequence_buf, 0)?;
            lock.seek(line)?;
            line
        };

        log::debug!(target: "audio::looping", "switch to section {} ({:?}), seek {}", section, mode, line);
        if from != section {
            self.emit(PlaybackFeedback::SectionChanged { from, to: section });
        }
        self.monitor.set_line(line);
        self.monitor.set_position(section, 0);
        Ok(())
    }

    pub fn stop(&mut self) -> SeqResult {
        {
            let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
            lock.stop()?;
        }
        if self.was_playing {
            self.emit(PlaybackFeedback::Stopped);
        }
        self.was_playing = false;
        self.monitor.set_playing(false);
        Ok(())
    }

    pub fn set_bpm(&mut self, bpm: u32) -> SeqResult {
        let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
        lock.set_bpm(clamp_bpm(bpm))?;
        Ok(())
    }

    /// Mute a column by filtering its events at sync time.
    pub fn set_track_muted(&mut self, state: &dyn SyncStateProvider, col: usize, muted: bool) -> SeqResult {
        if self.sync.is_track_muted(col) == muted {
            return Ok(());
        }
        self.sync.set_track_muted(col, muted)?;
        self.sync_all(state)
    }

    /// Apply a section's mute flag from the table to its pattern.
    pub fn sync_section_mute(&mut self, state: &dyn SyncStateProvider, section: usize) -> SeqResult {
        let muted = state
            .table()
            .section(section)
            .ok_or_else(|| SeqError::invalid(format!("section {} out of range", section)))?
            .is_muted();
        let lock = EngineLock::acquire(&*self.engine, &mut self.telemetry);
        self.sync.apply_section_mute(&lock, section, muted)
    }

    /// Follow the engine: replay completed passes through the loop state
    /// machine until it agrees with what the engine reports. On disagreement
    /// the engine wins.
    pub fn poll(&mut self) -> PlaybackSnapshot {
        let playing = self.engine.is_playing();
        let line = self.engine.current_line();
        self.monitor.set_playing(playing);
        self.monitor.set_line(line);

        if !playing {
            if self.was_playing {
                self.was_playing = false;
                self.emit(PlaybackFeedback::Stopped);
            }
            return self.monitor.snapshot();
        }
        self.was_playing = true;

        if let Some((section, _)) = self.sync.locate_line(line) {
            let iteration = self
                .sync
                .pattern(section)
                .and_then(|p| self.engine.pattern_loop_iteration(p).ok())
                .unwrap_or(0);
            self.follow(section, iteration);
        }
        self.monitor
            .set_position(self.looping.current_section(), self.looping.current_iteration());
        self.monitor.snapshot()
    }

    fn follow(&mut self, section: usize, iteration: u32) {
        for _ in 0..MAX_POLL_PASSES {
            if (self.looping.current_section(), self.looping.current_iteration()) == (section, iteration) {
                return;
            }
            match self.looping.complete_pass() {
                PassOutcome::Repeat { section, iteration } => {
                    self.emit(PlaybackFeedback::LoopIteration { section, iteration });
                }
                PassOutcome::Advance { from, to } | PassOutcome::Wrap { from, to } => {
                    self.emit(PlaybackFeedback::SectionChanged { from, to });
                }
                PassOutcome::Stop { .. } => break,
            }
        }
        if (self.looping.current_section(), self.looping.current_iteration()) != (section, iteration) {
            log::warn!(
                target: "audio::looping",
                "loop state (section {}, iteration {}) disagrees with engine (section {}, iteration {})",
                self.looping.current_section(),
                self.looping.current_iteration(),
                section,
                iteration
            );
            let from = self.looping.current_section();
            self.looping.observe(section, iteration);
            if from != section {
                self.emit(PlaybackFeedback::SectionChanged { from, to: section });
            }
        }
    }

    /// Check the quiescent invariant: every binding matches the section
    /// directory and the engine's reported length and offset.
    pub fn verify_bindings(&self, table: &TableState) -> SeqResult {
        let sections = table.sections();
        if self.sync.section_count() != sections.len() {
            return Err(SeqError::inconsistent(format!(
                "{} bindings for {} sections",
                self.sync.section_count(),
                sections.len()
            )));
        }
        for (index, section) in sections.iter().enumerate() {
            let binding = self
                .sync
                .binding(index)
                .ok_or_else(|| SeqError::inconsistent(format!("section {} has no pattern", index)))?;
            let reported = self.engine.pattern_lines(binding.pattern)?;
            let offset = self.engine.pattern_offset(binding.pattern)?;
            let expected_lines = section.num_steps() as u32;
            let expected_offset = section.start_step() as u32;
            if binding.line_count != expected_lines || reported != expected_lines {
                return Err(SeqError::inconsistent(format!(
                    "section {}: pattern has {} lines (engine reports {}), expected {}",
                    index, binding.line_count, reported, expected_lines
                )));
            }
            if binding.timeline_offset != expected_offset || offset != expected_offset {
                return Err(SeqError::inconsistent(format!(
                    "section {}: pattern at offset {} (engine reports {}), expected {}",
                    index, binding.timeline_offset, offset, expected_offset
                )));
            }
        }
        Ok(())
    }

    /// JSON snapshot of bindings and loop state for debugging.
    pub fn debug_dump(&mut self) -> SeqResult<String> {
        let dump = DebugDump {
            playing: self.engine.is_playing(),
            line: self.engine.current_line(),
            bindings: self.sync.bindings(),
            loop_state: self.looping.state(),
            lock: self.telemetry.take_summary(),
        };
        serde_json::to_string_pretty(&dump).map_err(|e| SeqError::invalid(format!("debug dump: {}", e)))
    }
}

/// The locked body of a structural edit.
#[allow(clippy::too_many_arguments)]
fn run_edit(
    lock: &EngineLock<'_>,
    sync: &mut PatternSync,
    looping: &mut LoopController,
    table: &TableState,
    voices: &dyn VoiceProvider,
    sequence_buf: &mut Vec<PatternId>,
    check: bool,
    report: &mut EditReport,
) -> SeqResult {
    let edit = report.edit;
    let count = table.section_count();

    // 1. Capture against the pre-edit bindings.
    let anchor = continuity::capture(lock, sync);
    let tracked = match (looping.mode(), anchor) {
        (PlaybackMode::Sequence, Some(a)) => a.section,
        _ => looping.current_section(),
    };
    let iteration = sync
        .pattern(tracked)
        .and_then(|p| lock.pattern_loop_iteration(p).ok())
        .unwrap_or_else(|| looping.state().iteration(tracked));

    // 2. Bindings and loop arrays follow the section list.
    match edit {
        StructuralEdit::Added { section } => sync.insert_slot(section)?,
        StructuralEdit::Removed { section } => sync.remove_slot(lock, section)?,
        StructuralEdit::Reordered { from, to } => sync.move_slot(from, to)?,
        StructuralEdit::Resized { .. } => {}
        StructuralEdit::Rebuilt => sync.fit_slots(lock, count)?,
    }
    if sync.section_count() != count {
        return Err(SeqError::inconsistent(format!(
            "{} bindings after {:?}, table has {} sections",
            sync.section_count(),
            edit,
            count
        )));
    }
    looping.apply_edit(edit, count);

    // 3. Create or resize, verified; resync what changed.
    for (index, section) in table.sections().iter().enumerate() {
        let update = sync.create_or_resize_section_pattern(lock, index, section.num_steps() as u32)?;
        match update {
            PatternUpdate::Created => mark(&mut report.created, index),
            PatternUpdate::Resized => mark(&mut report.resized, index),
            PatternUpdate::Recreated => mark(&mut report.recreated, index),
            PatternUpdate::Unchanged => {}
        }
        // Mute follows the section, whichever pattern now backs it.
        sync.apply_section_mute(lock, index, section.is_muted())?;
        let touched = edit == StructuralEdit::Rebuilt || edit.touched_section() == Some(index);
        if touched || update.needs_full_sync() {
            sync.sync_section(lock, table, voices, index)?;
        }
    }

    // 4. Timeline from engine-reported lengths.
    report.timeline = timeline::reposition(lock, sync, table.sections(), check)?;

    // 5. Reseek, always, even to the same line.
    let remap = anchor.and_then(|a| continuity::remap(a, edit, sync));
    let line = match remap {
        Some(out) => out.after_line,
        None => lock.current_line().min(report.timeline.total_lines.saturating_sub(1)),
    };
    lock.seek(line)?;
    report.remap = remap;

    // 6. Loop configuration, carrying the iteration across.
    let carried = match looping.mode() {
        PlaybackMode::Sequence => {
            let section = remap.map(|r| r.section).unwrap_or_else(|| looping.current_section());
            let iteration = iteration.min(looping.state().loop_count(section).saturating_sub(1));
            looping.observe(section, iteration);
            iteration
        }
        PlaybackMode::SingleLoop => {
            looping.observe(looping.current_section(), iteration);
            iteration
        }
    };
    report.iteration = carried;
    let refresh = match edit {
        StructuralEdit::Resized { section } => {
            section == looping.current_section() || report.recreated != 0
        }
        _ => true,
    };
    if refresh {
        looping.apply_config(lock, sync, sequence_buf, carried)?;
        report.loop_refreshed = true;
    }
    Ok(())
}
