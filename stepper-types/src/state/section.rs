//! Section metadata and the section directory.
//!
//! `num_steps` is authoritative; `start_step` is derived and has exactly one
//! writer, [`SectionDirectory::recompute_starts`]. Only the table store in
//! this crate may change section lengths or the section list.

use serde::{Deserialize, Serialize};

use crate::limits::{DEFAULT_SECTION_STEPS, MAX_COLS_PER_LAYER, MAX_LAYERS_PER_SECTION};

/// A contiguous, gapless run of steps in the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    start_step: usize,
    num_steps: usize,
    /// Visible columns per layer. Layer `l` covers columns
    /// `l * MAX_COLS_PER_LAYER .. l * MAX_COLS_PER_LAYER + layers[l]`.
    layers: [u8; MAX_LAYERS_PER_SECTION],
    /// Silences the whole section through the engine's pattern mute.
    #[serde(default)]
    muted: bool,
}

impl Section {
    pub(crate) fn new(num_steps: usize) -> Self {
        Self {
            start_step: 0,
            num_steps,
            layers: [MAX_COLS_PER_LAYER as u8; MAX_LAYERS_PER_SECTION],
            muted: false,
        }
    }

    pub fn start_step(&self) -> usize {
        self.start_step
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// One past the last global step of this section.
    pub fn end_step(&self) -> usize {
        self.start_step + self.num_steps
    }

    pub fn contains(&self, step: usize) -> bool {
        step >= self.start_step && step < self.end_step()
    }

    pub fn layers(&self) -> &[u8; MAX_LAYERS_PER_SECTION] {
        &self.layers
    }

    /// Whether a column is inside one of this section's layers.
    pub fn column_visible(&self, col: usize) -> bool {
        let layer = col / MAX_COLS_PER_LAYER;
        let within = col % MAX_COLS_PER_LAYER;
        self.layers
            .get(layer)
            .map(|&len| within < len as usize)
            .unwrap_or(false)
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub(crate) fn set_num_steps(&mut self, steps: usize) {
        self.num_steps = steps;
    }

    pub(crate) fn set_layer_len(&mut self, layer: usize, len: u8) {
        self.layers[layer] = len;
    }
}

impl Default for Section {
    fn default() -> Self {
        Self::new(DEFAULT_SECTION_STEPS)
    }
}

/// Ordered list of sections with derived cumulative offsets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SectionDirectory {
    sections: Vec<Section>,
}

impl SectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a list of lengths. Used for tests and imports.
    pub fn from_lengths(lengths: &[usize]) -> Self {
        let mut dir = Self {
            sections: lengths.iter().map(|&n| Section::new(n)).collect(),
        };
        dir.recompute_starts();
        dir
    }

    /// The only writer of `start_step`: one cumulative-sum pass.
    pub fn recompute_starts(&mut self) {
        let mut running = 0;
        for section in &mut self.sections {
            section.start_step = running;
            running += section.num_steps;
        }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn as_slice(&self) -> &[Section] {
        &self.sections
    }

    /// Σ num_steps over all sections.
    pub fn total_steps(&self) -> usize {
        self.sections.iter().map(|s| s.num_steps).sum()
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.sections.iter().map(|s| s.num_steps).collect()
    }

    pub fn starts(&self) -> Vec<usize> {
        self.sections.iter().map(|s| s.start_step).collect()
    }

    /// Index of the section owning a global step.
    pub fn section_at_step(&self, step: usize) -> Option<usize> {
        // Sections are sorted by start, so a binary search on the end works.
        let idx = self.sections.partition_point(|s| s.end_step() <= step);
        (idx < self.sections.len()).then_some(idx)
    }

    /// Express a global step as `(section, local_offset)`.
    pub fn locate(&self, step: usize) -> Option<(usize, usize)> {
        let idx = self.section_at_step(step)?;
        Some((idx, step - self.sections[idx].start_step))
    }

    /// Global step for a `(section, local_offset)` pair, if in range.
    pub fn global_step(&self, section: usize, local: usize) -> Option<usize> {
        let s = self.sections.get(section)?;
        (local < s.num_steps).then_some(s.start_step + local)
    }

    /// True when every start equals the running sum of the lengths before it.
    pub fn is_contiguous(&self) -> bool {
        let mut running = 0;
        for s in &self.sections {
            if s.start_step != running {
                return false;
            }
            running += s.num_steps;
        }
        true
    }

    pub(crate) fn section_mut(&mut self, index: usize) -> Option<&mut Section> {
        self.sections.get_mut(index)
    }

    pub(crate) fn insert(&mut self, index: usize, section: Section) {
        self.sections.insert(index, section);
        self.recompute_starts();
    }

    pub(crate) fn remove(&mut self, index: usize) -> Section {
        let removed = self.sections.remove(index);
        self.recompute_starts();
        removed
    }

    pub(crate) fn move_section(&mut self, from: usize, to: usize) {
        let moved = self.sections.remove(from);
        self.sections.insert(to, moved);
        self.recompute_starts();
    }
}
