//! Pattern sync engine.
//!
//! Mirrors every section onto one engine pattern and pushes resolved cell
//! events into it. All engine calls here take an [`EngineLock`], so they can
//! only run inside the critical section.

use serde::Serialize;
use stepper_types::limits::{MAX_COLS, MAX_SECTIONS};
use stepper_types::{Cell, SeqError, SeqResult, Section, TableState};

use crate::convert::{pitch_to_note, volume_to_velocity};
use crate::engine::{EngineLock, PatternEngine, PatternEvent, PatternId};
use crate::voices::VoiceProvider;

/// Section ↔ engine pattern mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatternBinding {
    pub pattern: PatternId,
    pub timeline_offset: u32,
    /// Line count as last reported by the engine.
    pub line_count: u32,
    pub muted: bool,
}

/// What `create_or_resize_section_pattern` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternUpdate {
    Created,
    Unchanged,
    Resized,
    /// In-place resize did not take; the pattern was destroyed and rebuilt
    /// empty. The caller must resync its events.
    Recreated,
}

impl PatternUpdate {
    /// The pattern's contents must be written again.
    pub fn needs_full_sync(self) -> bool {
        matches!(self, PatternUpdate::Created | PatternUpdate::Recreated)
    }
}

/// Resolve a cell into the event the engine should play.
///
/// Volume and pitch come from the cell when set, else from the slot's
/// defaults, else unity. Cells with no sample, an unloaded sample, zero
/// volume, or in a hidden/muted column resolve to an empty event.
pub fn resolve_event(cell: &Cell, audible: bool, voices: &dyn VoiceProvider) -> PatternEvent {
    if !audible {
        return PatternEvent::EMPTY;
    }
    let Some(slot) = cell.sample_slot else {
        return PatternEvent::EMPTY;
    };
    let Some(voice) = voices.voice_handle(slot) else {
        return PatternEvent::EMPTY;
    };
    let defaults = voices.defaults(slot).unwrap_or_default();
    let volume = cell.volume.unwrap_or(defaults.volume);
    let pitch = cell.pitch.unwrap_or(defaults.pitch);
    let Some(velocity) = volume_to_velocity(volume) else {
        return PatternEvent::EMPTY;
    };
    PatternEvent {
        note: pitch_to_note(pitch),
        velocity,
        voice: Some(voice),
        effect: 0,
        effect_param: 0,
    }
}

pub struct PatternSync {
    bindings: Vec<Option<PatternBinding>>,
    muted_tracks: [bool; MAX_COLS],
}

impl Default for PatternSync {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternSync {
    pub fn new() -> Self {
        Self {
            // Slot insertion under the lock stays within this capacity.
            bindings: Vec::with_capacity(MAX_SECTIONS),
            muted_tracks: [false; MAX_COLS],
        }
    }

    pub fn bindings(&self) -> &[Option<PatternBinding>] {
        &self.bindings
    }

    pub(crate) fn bindings_mut(&mut self) -> &mut [Option<PatternBinding>] {
        &mut self.bindings
    }

    pub fn binding(&self, section: usize) -> Option<&PatternBinding> {
        self.bindings.get(section).and_then(|b| b.as_ref())
    }

    pub fn pattern(&self, section: usize) -> Option<PatternId> {
        self.binding(section).map(|b| b.pattern)
    }

    pub fn section_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_track_muted(&self, col: usize) -> bool {
        self.muted_tracks.get(col).copied().unwrap_or(false)
    }

    /// Flip the sync-time mute filter. The caller resyncs affected sections.
    pub fn set_track_muted(&mut self, col: usize, muted: bool) -> SeqResult {
        let slot = self
            .muted_tracks
            .get_mut(col)
            .ok_or_else(|| SeqError::invalid(format!("column {} out of range", col)))?;
        *slot = muted;
        Ok(())
    }

    /// Section containing global `line` under the current binding layout.
    pub fn locate_line(&self, line: u32) -> Option<(usize, u32)> {
        self.bindings.iter().enumerate().find_map(|(i, b)| {
            let b = b.as_ref()?;
            (line >= b.timeline_offset && line < b.timeline_offset + b.line_count)
                .then(|| (i, line - b.timeline_offset))
        })
    }

    fn audible(&self, section: &Section, col: usize) -> bool {
        !self.is_track_muted(col) && section.column_visible(col)
    }

    /// Push one cell into its section's pattern.
    pub fn sync_cell(
        &self,
        lock: &EngineLock<'_>,
        table: &TableState,
        voices: &dyn VoiceProvider,
        step: usize,
        col: usize,
    ) -> SeqResult {
        let (index, local) = table
            .sections()
            .locate(step)
            .ok_or_else(|| SeqError::invalid(format!("step {} outside the table", step)))?;
        let cell = table
            .cell(step, col)
            .ok_or_else(|| SeqError::invalid(format!("column {} out of range", col)))?;
        let (Some(section), Some(binding)) = (table.section(index), self.binding(index)) else {
            return Err(SeqError::inconsistent(format!("section {} has no pattern", index)));
        };
        let event = resolve_event(cell, self.audible(section, col), voices);
        lock.set_event(binding.pattern, col as u32, local as u32, event)?;
        Ok(())
    }

    /// Push every cell of a section into its pattern.
    pub fn sync_section(
        &self,
        lock: &EngineLock<'_>,
        table: &TableState,
        voices: &dyn VoiceProvider,
        index: usize,
    ) -> SeqResult {
        let section = table
            .section(index)
            .ok_or_else(|| SeqError::invalid(format!("section {} out of range", index)))?;
        let binding = self
            .binding(index)
            .ok_or_else(|| SeqError::inconsistent(format!("section {} has no pattern", index)))?;
        let rows = table.section_rows(index).unwrap_or(&[]);
        for (line, row) in rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                let event = resolve_event(cell, self.audible(section, col), voices);
                lock.set_event(binding.pattern, col as u32, line as u32, event)?;
            }
        }
        Ok(())
    }

    /// Ensure `section` is bound to a pattern of exactly `lines` lines.
    ///
    /// Resizes are verified by re-querying the engine's reported length; when
    /// the engine reports anything else the pattern is destroyed and
    /// recreated at the requested size, keeping its offset and mute state.
    pub fn create_or_resize_section_pattern(
        &mut self,
        lock: &EngineLock<'_>,
        section: usize,
        lines: u32,
    ) -> SeqResult<PatternUpdate> {
        let tracks = MAX_COLS as u32;
        let slot = self
            .bindings
            .get_mut(section)
            .ok_or_else(|| SeqError::invalid(format!("section {} has no binding slot", section)))?;

        let Some(existing) = *slot else {
            let pattern = new_verified_pattern(lock, tracks, lines)?;
            *slot = Some(PatternBinding {
                pattern,
                timeline_offset: 0,
                line_count: lines,
                muted: false,
            });
            return Ok(PatternUpdate::Created);
        };

        if existing.line_count == lines && lock.pattern_lines(existing.pattern)? == lines {
            return Ok(PatternUpdate::Unchanged);
        }

        let resized = lock.resize_pattern(existing.pattern, tracks, lines).is_ok()
            && lock.pattern_lines(existing.pattern)? == lines;
        if resized {
            *slot = Some(PatternBinding {
                line_count: lines,
                ..existing
            });
            return Ok(PatternUpdate::Resized);
        }

        lock.remove_pattern(existing.pattern)?;
        // Until the replacement exists the slot must not point at a dead id.
        *slot = None;
        let pattern = new_verified_pattern(lock, tracks, lines)?;
        lock.set_pattern_offset(pattern, existing.timeline_offset)?;
        if existing.muted {
            lock.mute_pattern(pattern, true)?;
        }
        *slot = Some(PatternBinding {
            pattern,
            line_count: lines,
            ..existing
        });
        Ok(PatternUpdate::Recreated)
    }

    /// Open an empty binding slot for a section inserted at `at`.
    pub fn insert_slot(&mut self, at: usize) -> SeqResult {
        if at > self.bindings.len() || self.bindings.len() >= MAX_SECTIONS {
            return Err(SeqError::invalid(format!("cannot open binding slot {}", at)));
        }
        self.bindings.insert(at, None);
        Ok(())
    }

    /// Drop the binding of a removed section and destroy its pattern.
    pub fn remove_slot(&mut self, lock: &EngineLock<'_>, at: usize) -> SeqResult {
        if at >= self.bindings.len() {
            return Err(SeqError::invalid(format!("no binding slot {}", at)));
        }
        if let Some(binding) = self.bindings.remove(at) {
            lock.remove_pattern(binding.pattern)?;
        }
        Ok(())
    }

    /// Move a binding along with its reordered section.
    pub fn move_slot(&mut self, from: usize, to: usize) -> SeqResult {
        let len = self.bindings.len();
        if from >= len || to >= len {
            return Err(SeqError::invalid(format!("cannot move binding {} to {}", from, to)));
        }
        let binding = self.bindings.remove(from);
        self.bindings.insert(to, binding);
        Ok(())
    }

    /// Grow or shrink the slot list to `count`, destroying surplus patterns.
    pub fn fit_slots(&mut self, lock: &EngineLock<'_>, count: usize) -> SeqResult {
        while self.bindings.len() > count {
            let last = self.bindings.len() - 1;
            self.remove_slot(lock, last)?;
        }
        while self.bindings.len() < count.min(MAX_SECTIONS) {
            self.bindings.push(None);
        }
        Ok(())
    }

    /// Bring the engine's pattern mute for `section` in line with `muted`.
    /// Touches the engine only when the binding disagrees.
    pub fn apply_section_mute(&mut self, lock: &EngineLock<'_>, section: usize, muted: bool) -> SeqResult {
        let binding = self
            .bindings
            .get_mut(section)
            .and_then(|b| b.as_mut())
            .ok_or_else(|| SeqError::invalid(format!("section {} has no pattern", section)))?;
        if binding.muted != muted {
            lock.mute_pattern(binding.pattern, muted)?;
            binding.muted = muted;
        }
        Ok(())
    }
}

fn new_verified_pattern(lock: &EngineLock<'_>, tracks: u32, lines: u32) -> SeqResult<PatternId> {
    let pattern = lock.new_pattern(tracks, lines)?;
    let reported = lock.pattern_lines(pattern)?;
    if reported != lines {
        lock.remove_pattern(pattern)?;
        return Err(SeqError::inconsistent(format!(
            "new pattern reports {} lines, expected {}",
            reported, lines
        )));
    }
    Ok(pattern)
}
