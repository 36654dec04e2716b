//! Loop/sequencing controller.
//!
//! Owns [`PlaybackModeState`] and translates it into engine loop primitives:
//! per-pattern loop modes, the pattern sequence, and autostop. The pass state
//! machine (`complete_pass`) mirrors what the engine does at a pattern
//! boundary so the control side can follow playback by polling.

use stepper_types::limits::{clamp_loops, MAX_SECTIONS};
use stepper_types::{PlaybackMode, PlaybackModeState, SeqError, SeqResult};

use crate::continuity::StructuralEdit;
use crate::engine::{EngineLock, PatternEngine, PatternId, PatternLoop};
use crate::sync::PatternSync;

/// Result of finishing one pass over the current section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Repeat { section: usize, iteration: u32 },
    Advance { from: usize, to: usize },
    Wrap { from: usize, to: usize },
    Stop { section: usize },
}

pub struct LoopController {
    state: PlaybackModeState,
    default_loops: u32,
}

impl LoopController {
    pub fn new(section_count: usize, default_loops: u32, stop_at_end: bool) -> Self {
        let default_loops = clamp_loops(default_loops);
        let mut state = PlaybackModeState::new(section_count, default_loops);
        state.stop_at_end = stop_at_end;
        // Lockstep edits run under the engine lock and must not reallocate.
        state.loop_counts.reserve(MAX_SECTIONS);
        state.loop_iterations.reserve(MAX_SECTIONS);
        state.in_region.reserve(MAX_SECTIONS);
        state.sequence_order.reserve(MAX_SECTIONS);
        Self { state, default_loops }
    }

    pub fn state(&self) -> &PlaybackModeState {
        &self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.state.mode
    }

    pub fn current_section(&self) -> usize {
        self.state.current_section
    }

    pub fn current_iteration(&self) -> u32 {
        self.state.iteration(self.state.current_section)
    }

    fn check_section(&self, section: usize) -> SeqResult {
        if section >= self.state.section_count() {
            return Err(SeqError::invalid(format!("section {} out of range", section)));
        }
        Ok(())
    }

    /// Advance the state machine by one completed pass of the current section.
    pub fn complete_pass(&mut self) -> PassOutcome {
        let section = self.state.current_section;
        if self.state.mode == PlaybackMode::SingleLoop {
            let iteration = self.state.iteration(section).saturating_add(1);
            self.set_iteration(section, iteration);
            return PassOutcome::Repeat { section, iteration };
        }

        let iteration = self.state.iteration(section) + 1;
        if iteration < self.state.loop_count(section) {
            self.set_iteration(section, iteration);
            return PassOutcome::Repeat { section, iteration };
        }
        self.set_iteration(section, 0);

        let order = &self.state.sequence_order;
        // A section outside the region hands over to the next one inside it.
        let next = match order.iter().position(|&s| s == section) {
            Some(pos) => order.get(pos + 1).copied(),
            None => order.iter().copied().find(|&s| s > section),
        };
        if let Some(next) = next {
            self.state.current_section = next;
            self.set_iteration(next, 0);
            PassOutcome::Advance { from: section, to: next }
        } else if self.state.stop_at_end {
            PassOutcome::Stop { section }
        } else {
            let first = order.first().copied().unwrap_or(0);
            self.state.current_section = first;
            self.set_iteration(first, 0);
            PassOutcome::Wrap { from: section, to: first }
        }
    }

    fn set_iteration(&mut self, section: usize, iteration: u32) {
        if let Some(slot) = self.state.loop_iterations.get_mut(section) {
            *slot = iteration;
        }
    }

    /// Force the controller to a position observed on the engine.
    pub fn observe(&mut self, section: usize, iteration: u32) {
        if section < self.state.section_count() {
            self.state.current_section = section;
            self.set_iteration(section, iteration);
        }
    }

    pub fn reset_iterations(&mut self) {
        self.state.loop_iterations.iter_mut().for_each(|i| *i = 0);
    }

    /// Engine loop mode for a section under the current playback mode.
    pub fn loop_config_for(&self, section: usize) -> PatternLoop {
        match self.state.mode {
            PlaybackMode::Sequence => PatternLoop::Count(self.state.loop_count(section)),
            PlaybackMode::SingleLoop if section == self.state.current_section => PatternLoop::Infinite,
            PlaybackMode::SingleLoop => PatternLoop::Off,
        }
    }

    /// Switch mode. SingleLoop → Sequence clamps the current iteration into
    /// the section's loop count.
    pub fn set_mode(&mut self, mode: PlaybackMode, section: usize) -> SeqResult {
        self.check_section(section)?;
        let carried = self.current_iteration();
        self.state.mode = mode;
        self.state.current_section = section;
        let iteration = match mode {
            PlaybackMode::SingleLoop => carried,
            PlaybackMode::Sequence => carried.min(self.state.loop_count(section).saturating_sub(1)),
        };
        self.set_iteration(section, iteration);
        Ok(())
    }

    pub fn set_loop_count(&mut self, section: usize, count: u32) -> SeqResult {
        self.check_section(section)?;
        self.state.loop_counts[section] = clamp_loops(count);
        Ok(())
    }

    pub fn set_stop_at_end(&mut self, enabled: bool) {
        self.state.stop_at_end = enabled;
    }

    /// Restore loop counts from history. The section count follows
    /// `loop_counts`; iterations restart and the region is cleared.
    pub fn restore(&mut self, loop_counts: &[u32], stop_at_end: bool) {
        let st = &mut self.state;
        st.loop_counts.clear();
        st.loop_counts.extend(loop_counts.iter().copied().map(clamp_loops));
        st.loop_iterations.clear();
        st.loop_iterations.resize(loop_counts.len(), 0);
        st.in_region.clear();
        st.in_region.resize(loop_counts.len(), true);
        st.current_section = st.current_section.min(loop_counts.len().saturating_sub(1));
        st.stop_at_end = stop_at_end;
        self.rebuild_order();
    }

    /// Limit Sequence playback to sections `first..=last`.
    pub fn set_region(&mut self, first: usize, last: usize) -> SeqResult {
        self.check_section(last)?;
        if first > last {
            return Err(SeqError::invalid(format!("region {}..={} is empty", first, last)));
        }
        for (section, inside) in self.state.in_region.iter_mut().enumerate() {
            *inside = (first..=last).contains(&section);
        }
        self.rebuild_order();
        Ok(())
    }

    pub fn clear_region(&mut self) {
        self.state.in_region.iter_mut().for_each(|r| *r = true);
        self.rebuild_order();
    }

    fn rebuild_order(&mut self) {
        let PlaybackModeState {
            in_region,
            sequence_order,
            ..
        } = &mut self.state;
        sequence_order.clear();
        sequence_order.extend(
            in_region
                .iter()
                .enumerate()
                .filter_map(|(section, &inside)| inside.then_some(section)),
        );
    }

    /// Keep per-section arrays in lockstep with the section list.
    pub fn apply_edit(&mut self, edit: StructuralEdit, section_count: usize) {
        let st = &mut self.state;
        let whole = st.in_region.iter().all(|&r| r);
        match edit {
            StructuralEdit::Added { section } if section <= st.loop_counts.len() => {
                st.loop_counts.insert(section, self.default_loops);
                st.loop_iterations.insert(section, 0);
                // A new section joins the region only when every neighbour is in it.
                let before = section.checked_sub(1).and_then(|i| st.in_region.get(i).copied());
                let after = st.in_region.get(section).copied();
                let joins = before.unwrap_or(true) && after.unwrap_or(true);
                st.in_region.insert(section, whole || joins);
            }
            StructuralEdit::Removed { section } if section < st.loop_counts.len() => {
                st.loop_counts.remove(section);
                st.loop_iterations.remove(section);
                st.in_region.remove(section);
            }
            StructuralEdit::Reordered { from, to } if from < st.loop_counts.len() && to < st.loop_counts.len() => {
                let count = st.loop_counts.remove(from);
                st.loop_counts.insert(to, count);
                let iteration = st.loop_iterations.remove(from);
                st.loop_iterations.insert(to, iteration);
                let inside = st.in_region.remove(from);
                st.in_region.insert(to, inside);
            }
            _ => {}
        }
        st.loop_counts.resize(section_count, self.default_loops);
        st.loop_iterations.resize(section_count, 0);
        st.in_region.resize(section_count, whole);
        if !st.in_region.contains(&true) {
            st.in_region.iter_mut().for_each(|r| *r = true);
        }
        self.rebuild_order();
        let st = &mut self.state;
        st.current_section = edit
            .map_section(st.current_section)
            .unwrap_or(st.current_section)
            .min(section_count.saturating_sub(1));
    }

    /// Write the current mode's loop configuration to the engine and restore
    /// `iteration` on the current section's pattern afterwards.
    ///
    /// `sequence_buf` must have capacity for every section so nothing is
    /// allocated while the lock is held.
    pub fn apply_config(
        &self,
        lock: &EngineLock<'_>,
        sync: &PatternSync,
        sequence_buf: &mut Vec<PatternId>,
        iteration: u32,
    ) -> SeqResult {
        for (section, binding) in sync.bindings().iter().enumerate() {
            if let Some(b) = binding {
                lock.set_pattern_loop(b.pattern, self.loop_config_for(section))?;
            }
        }

        sequence_buf.clear();
        match self.state.mode {
            PlaybackMode::Sequence => {
                for &section in self.state.sequence_order.iter().take(MAX_SECTIONS) {
                    if let Some(p) = sync.pattern(section) {
                        sequence_buf.push(p);
                    }
                }
            }
            PlaybackMode::SingleLoop => {
                if let Some(p) = sync.pattern(self.state.current_section) {
                    sequence_buf.push(p);
                }
            }
        }
        lock.set_sequence(sequence_buf)?;
        lock.set_autostop(self.state.mode == PlaybackMode::Sequence && self.state.stop_at_end)?;

        if let Some(p) = sync.pattern(self.state.current_section) {
            lock.set_pattern_loop_iteration(p, iteration)?;
        }
        Ok(())
    }
}
