//! Physical table store.
//!
//! The table is a compacted, gapless array of rows: row `i` is global step
//! `i`, and the number of occupied rows always equals the sum of all section
//! lengths. Inserting or deleting a step shifts every later row, across all
//! subsequent sections, and recomputes the section directory.
//!
//! Every operation validates fully before mutating, so a rejected edit leaves
//! the table unchanged.

use serde::{Deserialize, Serialize};

use super::cell::{valid_sample_slot, Cell, Row, EMPTY_ROW};
use super::section::{Section, SectionDirectory};
use crate::error::{SeqError, SeqResult};
use crate::limits::{
    clamp_pitch, clamp_volume, DEFAULT_SECTION_STEPS, MAX_COLS, MAX_COLS_PER_LAYER,
    MAX_LAYERS_PER_SECTION, MAX_SECTIONS, MAX_STEPS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    rows: Vec<Row>,
    sections: SectionDirectory,
    max_steps: usize,
    /// Bumped on every successful mutation. Readers compare it to detect change.
    version: u64,
}

impl Default for TableState {
    fn default() -> Self {
        Self::new()
    }
}

impl TableState {
    /// One empty section of the default length.
    pub fn new() -> Self {
        Self::with_capacity(MAX_STEPS, DEFAULT_SECTION_STEPS)
    }

    /// A table holding at most `max_steps` rows (capped at [`MAX_STEPS`]),
    /// starting with one empty section of `initial_steps`.
    pub fn with_capacity(max_steps: usize, initial_steps: usize) -> Self {
        let max_steps = max_steps.clamp(1, MAX_STEPS);
        let initial_steps = initial_steps.clamp(1, max_steps);
        let mut rows = Vec::with_capacity(max_steps);
        rows.resize(initial_steps, EMPTY_ROW);
        let mut sections = SectionDirectory::new();
        sections.insert(0, Section::new(initial_steps));
        Self {
            rows,
            sections,
            max_steps,
            version: 0,
        }
    }

    /// A table with empty sections of the given lengths.
    pub fn with_sections(lengths: &[usize]) -> SeqResult<Self> {
        let first = *lengths
            .first()
            .ok_or_else(|| SeqError::invalid("at least one section is required"))?;
        if first == 0 {
            return Err(SeqError::invalid("section length must be at least 1"));
        }
        let mut table = Self::with_capacity(MAX_STEPS, first);
        for &len in &lengths[1..] {
            table.append_section(len, None)?;
        }
        table.version = 0;
        Ok(table)
    }

    pub fn sections(&self) -> &SectionDirectory {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn occupied_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn section_at_step(&self, step: usize) -> Option<usize> {
        self.sections.section_at_step(step)
    }

    pub fn cell(&self, step: usize, col: usize) -> Option<&Cell> {
        self.rows.get(step).and_then(|row| row.get(col))
    }

    pub fn row(&self, step: usize) -> Option<&Row> {
        self.rows.get(step)
    }

    /// Rows belonging to one section.
    pub fn section_rows(&self, section: usize) -> Option<&[Row]> {
        let s = self.sections.get(section)?;
        self.rows.get(s.start_step()..s.end_step())
    }

    // ─── Cell edits ────────────────────────────────────────────────

    pub fn set_cell(&mut self, step: usize, col: usize, cell: Cell) -> SeqResult {
        self.check_coord(step, col)?;
        if let Some(slot) = cell.sample_slot {
            if !valid_sample_slot(slot) {
                return Err(SeqError::invalid(format!("sample slot {} out of range", slot)));
            }
        }
        let mut cell = cell;
        cell.volume = cell.volume.map(clamp_volume);
        cell.pitch = cell.pitch.map(clamp_pitch);
        self.rows[step][col] = cell;
        self.bump();
        Ok(())
    }

    pub fn set_cell_settings(
        &mut self,
        step: usize,
        col: usize,
        volume: Option<f32>,
        pitch: Option<f32>,
    ) -> SeqResult {
        self.check_coord(step, col)?;
        self.rows[step][col].set_settings(volume, pitch);
        self.bump();
        Ok(())
    }

    pub fn set_cell_sample_slot(&mut self, step: usize, col: usize, slot: Option<u8>) -> SeqResult {
        self.check_coord(step, col)?;
        if let Some(s) = slot {
            if !valid_sample_slot(s) {
                return Err(SeqError::invalid(format!("sample slot {} out of range", s)));
            }
        }
        self.rows[step][col].sample_slot = slot;
        self.bump();
        Ok(())
    }

    pub fn clear_cell(&mut self, step: usize, col: usize) -> SeqResult {
        self.check_coord(step, col)?;
        self.rows[step][col] = Cell::EMPTY;
        self.bump();
        Ok(())
    }

    /// Global steps of every cell referencing `slot`, as `(step, col)`.
    pub fn cells_using_slot(&self, slot: u8) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (step, row) in self.rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                if cell.sample_slot == Some(slot) {
                    out.push((step, col));
                }
            }
        }
        out
    }

    // ─── Structural edits ──────────────────────────────────────────

    /// Insert an empty row at local position `at` (`0..=num_steps`) of
    /// `section`. Every row at or below the global insertion point moves down.
    pub fn insert_step(&mut self, section: usize, at: usize) -> SeqResult {
        let s = self.section_checked(section)?;
        if at > s.num_steps() {
            return Err(SeqError::invalid(format!(
                "insert position {} out of range for section {} ({} steps)",
                at,
                section,
                s.num_steps()
            )));
        }
        self.check_capacity(1)?;
        let global = s.start_step() + at;
        self.rows.insert(global, EMPTY_ROW);
        self.adjust_length(section, 1);
        Ok(())
    }

    /// Delete the row at local position `at` of `section`; later rows move up.
    pub fn delete_step(&mut self, section: usize, at: usize) -> SeqResult {
        let s = self.section_checked(section)?;
        if at >= s.num_steps() {
            return Err(SeqError::invalid(format!(
                "delete position {} out of range for section {} ({} steps)",
                at,
                section,
                s.num_steps()
            )));
        }
        if s.num_steps() == 1 {
            return Err(SeqError::invalid(format!(
                "section {} must keep at least one step",
                section
            )));
        }
        let global = s.start_step() + at;
        self.rows.remove(global);
        self.adjust_length(section, -1);
        Ok(())
    }

    /// Grow or shrink a section at its tail.
    pub fn set_section_step_count(&mut self, section: usize, steps: usize) -> SeqResult {
        let s = self.section_checked(section)?;
        if steps == 0 {
            return Err(SeqError::invalid("section length must be at least 1"));
        }
        let current = s.num_steps();
        let end = s.end_step();
        if steps > current {
            self.check_capacity(steps - current)?;
            self.rows
                .splice(end..end, std::iter::repeat(EMPTY_ROW).take(steps - current));
        } else if steps < current {
            self.rows.drain(end - (current - steps)..end);
        } else {
            return Ok(());
        }
        if let Some(sec) = self.sections.section_mut(section) {
            sec.set_num_steps(steps);
        }
        self.sections.recompute_starts();
        self.bump();
        Ok(())
    }

    /// Insert a new section before index `at` (`0..=section_count`).
    /// With `copy_from`, the new section starts as a copy of that section's
    /// rows, truncated or padded with empty rows to `steps`.
    pub fn insert_section(
        &mut self,
        at: usize,
        steps: usize,
        copy_from: Option<usize>,
    ) -> SeqResult {
        if at > self.sections.len() {
            return Err(SeqError::invalid(format!(
                "section position {} out of range ({} sections)",
                at,
                self.sections.len()
            )));
        }
        if steps == 0 {
            return Err(SeqError::invalid("section length must be at least 1"));
        }
        if self.sections.len() >= MAX_SECTIONS {
            return Err(SeqError::exhausted(format!(
                "section limit of {} reached",
                MAX_SECTIONS
            )));
        }
        let template: Vec<Row> = match copy_from {
            Some(src) => {
                let rows = self.section_rows(src).ok_or_else(|| {
                    SeqError::invalid(format!("copy source section {} does not exist", src))
                })?;
                rows.iter().copied().take(steps).collect()
            }
            None => Vec::new(),
        };
        self.check_capacity(steps)?;

        let mut section = Section::new(steps);
        if let Some(src) = copy_from.and_then(|i| self.sections.get(i)) {
            for (layer, &len) in src.layers().iter().enumerate() {
                section.set_layer_len(layer, len);
            }
        }
        let global = match self.sections.get(at) {
            Some(s) => s.start_step(),
            None => self.rows.len(),
        };
        let padding = steps - template.len();
        self.rows.splice(
            global..global,
            template
                .into_iter()
                .chain(std::iter::repeat(EMPTY_ROW).take(padding)),
        );
        self.sections.insert(at, section);
        self.bump();
        Ok(())
    }

    pub fn append_section(&mut self, steps: usize, copy_from: Option<usize>) -> SeqResult {
        self.insert_section(self.sections.len(), steps, copy_from)
    }

    /// Remove a section and its rows. The last remaining section cannot be
    /// removed.
    pub fn remove_section(&mut self, section: usize) -> SeqResult {
        let s = self.section_checked(section)?;
        if self.sections.len() == 1 {
            return Err(SeqError::invalid("the last section cannot be removed"));
        }
        let range = s.start_step()..s.end_step();
        self.rows.drain(range);
        self.sections.remove(section);
        self.bump();
        Ok(())
    }

    /// Move a section to a new index. The moved rows are copied into a
    /// temporary buffer, then the table is rebuilt in the new order.
    pub fn reorder_section(&mut self, from: usize, to: usize) -> SeqResult {
        let s = self.section_checked(from)?;
        if to >= self.sections.len() {
            return Err(SeqError::invalid(format!(
                "target section index {} out of range ({} sections)",
                to,
                self.sections.len()
            )));
        }
        if from == to {
            return Ok(());
        }
        let moved: Vec<Row> = self.rows.drain(s.start_step()..s.end_step()).collect();
        self.sections.move_section(from, to);
        let dest = self.sections.get(to).map(|s| s.start_step()).unwrap_or(0);
        self.rows.splice(dest..dest, moved);
        self.bump();
        Ok(())
    }

    pub fn set_layer_len(&mut self, section: usize, layer: usize, len: usize) -> SeqResult {
        self.section_checked(section)?;
        if layer >= MAX_LAYERS_PER_SECTION {
            return Err(SeqError::invalid(format!("layer {} out of range", layer)));
        }
        if len > MAX_COLS_PER_LAYER {
            return Err(SeqError::invalid(format!(
                "layer length {} exceeds {}",
                len, MAX_COLS_PER_LAYER
            )));
        }
        if let Some(s) = self.sections.section_mut(section) {
            s.set_layer_len(layer, len as u8);
        }
        self.bump();
        Ok(())
    }

    pub fn set_section_muted(&mut self, section: usize, muted: bool) -> SeqResult {
        self.section_checked(section)?;
        if let Some(s) = self.sections.section_mut(section) {
            s.set_muted(muted);
        }
        self.bump();
        Ok(())
    }

    /// Structural invariants: rows match Σ num_steps and starts are contiguous.
    pub fn is_consistent(&self) -> bool {
        self.rows.len() == self.sections.total_steps()
            && self.sections.is_contiguous()
            && !self.sections.is_empty()
            && self.rows.len() <= self.max_steps
    }

    // ─── Helpers ───────────────────────────────────────────────────

    fn section_checked(&self, section: usize) -> SeqResult<Section> {
        self.sections.get(section).cloned().ok_or_else(|| {
            SeqError::invalid(format!(
                "section {} out of range ({} sections)",
                section,
                self.sections.len()
            ))
        })
    }

    fn check_coord(&self, step: usize, col: usize) -> SeqResult {
        if step >= self.rows.len() {
            return Err(SeqError::invalid(format!(
                "step {} out of range ({} steps)",
                step,
                self.rows.len()
            )));
        }
        if col >= MAX_COLS {
            return Err(SeqError::invalid(format!("column {} out of range", col)));
        }
        Ok(())
    }

    fn check_capacity(&self, extra: usize) -> SeqResult {
        if self.rows.len() + extra > self.max_steps {
            return Err(SeqError::exhausted(format!(
                "table holds {} of {} steps, cannot add {}",
                self.rows.len(),
                self.max_steps,
                extra
            )));
        }
        Ok(())
    }

    fn adjust_length(&mut self, section: usize, delta: isize) {
        if let Some(s) = self.sections.section_mut(section) {
            let steps = (s.num_steps() as isize + delta) as usize;
            s.set_num_steps(steps);
        }
        self.sections.recompute_starts();
        self.bump();
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}
