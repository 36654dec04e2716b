//! Timeline positioning.
//!
//! Places every section's pattern on the engine's global timeline. Offsets are
//! a running sum of the engine-reported pattern lengths; the directory values
//! are only used for the consistency check.

use serde::Serialize;
use stepper_types::{SectionDirectory, SeqResult};

use crate::engine::{EngineLock, PatternEngine};
use crate::sync::PatternSync;

/// A binding that disagreed with the section directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayoutMismatch {
    pub section: usize,
    pub expected_offset: u32,
    pub actual_offset: u32,
    pub expected_lines: u32,
    pub actual_lines: u32,
}

/// Outcome of one positioning pass. Fixed size so it can be filled while the
/// engine is locked and logged afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimelineReport {
    pub total_lines: u32,
    pub mismatches: u32,
    pub first_mismatch: Option<LayoutMismatch>,
    /// Sections with no bound pattern.
    pub unbound: u32,
}

impl TimelineReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches == 0 && self.unbound == 0
    }

    fn note(&mut self, mismatch: LayoutMismatch) {
        self.mismatches += 1;
        if self.first_mismatch.is_none() {
            self.first_mismatch = Some(mismatch);
        }
    }

    /// Log findings. Call after the lock is released.
    pub fn log(&self) {
        if let Some(m) = self.first_mismatch {
            log::warn!(
                target: "audio::timeline",
                "{} section(s) out of layout; section {}: offset {} (expected {}), lines {} (expected {})",
                self.mismatches,
                m.section,
                m.actual_offset,
                m.expected_offset,
                m.actual_lines,
                m.expected_lines
            );
        }
        if self.unbound > 0 {
            log::warn!(target: "audio::timeline", "{} section(s) have no pattern", self.unbound);
        }
    }
}

/// Single ordered pass: set each pattern's offset to the running offset, then
/// advance by the pattern's freshly queried length. Idempotent.
pub fn reposition(
    lock: &EngineLock<'_>,
    sync: &mut PatternSync,
    sections: &SectionDirectory,
    check: bool,
) -> SeqResult<TimelineReport> {
    let mut report = TimelineReport::default();
    let mut offset: u32 = 0;
    for (index, slot) in sync.bindings_mut().iter_mut().enumerate() {
        let Some(binding) = slot.as_mut() else {
            report.unbound += 1;
            continue;
        };
        lock.set_pattern_offset(binding.pattern, offset)?;
        let lines = lock.pattern_lines(binding.pattern)?;
        binding.timeline_offset = offset;
        binding.line_count = lines;

        if check {
            let (expected_offset, expected_lines) = sections
                .get(index)
                .map(|s| (s.start_step() as u32, s.num_steps() as u32))
                .unwrap_or((u32::MAX, 0));
            if expected_offset != offset || expected_lines != lines {
                report.note(LayoutMismatch {
                    section: index,
                    expected_offset,
                    actual_offset: offset,
                    expected_lines,
                    actual_lines: lines,
                });
            }
        }
        offset += lines;
    }
    if check && sync.section_count() < sections.len() {
        report.unbound += (sections.len() - sync.section_count()) as u32;
    }
    report.total_lines = offset;
    Ok(report)
}
