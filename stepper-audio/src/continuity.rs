//! Playhead continuity across structural edits.
//!
//! Before an edit the live playhead is captured as `(section, local_offset)`
//! against the bindings as they stood; afterwards the same musical position is
//! looked up in the repositioned layout and clamped into the section.

use serde::Serialize;

use crate::engine::{EngineLock, PatternEngine};
use crate::sync::PatternSync;

/// Structural change applied to the section list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StructuralEdit {
    /// Section length changed; indices unchanged.
    Resized { section: usize },
    /// A section was inserted at this index.
    Added { section: usize },
    /// The section at this index was removed.
    Removed { section: usize },
    Reordered { from: usize, to: usize },
    /// Everything may have changed (history restore, first attach).
    Rebuilt,
}

impl StructuralEdit {
    /// Index after the edit of the section that was at `section` before it.
    /// `None` when that section no longer exists.
    pub fn map_section(&self, section: usize) -> Option<usize> {
        match *self {
            StructuralEdit::Resized { .. } | StructuralEdit::Rebuilt => Some(section),
            StructuralEdit::Added { section: at } => {
                Some(if section >= at { section + 1 } else { section })
            }
            StructuralEdit::Removed { section: at } => match section.cmp(&at) {
                std::cmp::Ordering::Less => Some(section),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(section - 1),
            },
            StructuralEdit::Reordered { from, to } => Some(if section == from {
                to
            } else if from < to && section > from && section <= to {
                section - 1
            } else if to < from && section >= to && section < from {
                section + 1
            } else {
                section
            }),
        }
    }

    /// Section whose pattern content changed, if any.
    pub fn touched_section(&self) -> Option<usize> {
        match *self {
            StructuralEdit::Resized { section } | StructuralEdit::Added { section } => Some(section),
            _ => None,
        }
    }
}

/// Playhead position captured before an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayheadAnchor {
    pub line: u32,
    pub section: usize,
    pub local: u32,
}

/// Resolve the engine's current line against the pre-edit bindings.
///
/// A playhead past the last pattern (stopped at the end) anchors to the last
/// section. Returns `None` when no section is bound.
pub fn capture(lock: &EngineLock<'_>, sync: &PatternSync) -> Option<PlayheadAnchor> {
    let line = lock.current_line();
    if let Some((section, local)) = sync.locate_line(line) {
        return Some(PlayheadAnchor { line, section, local });
    }
    let (section, binding) = sync
        .bindings()
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, b)| b.as_ref().map(|b| (i, b)))?;
    let local = if line < binding.timeline_offset {
        0
    } else {
        line - binding.timeline_offset
    };
    Some(PlayheadAnchor { line, section, local })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemapOutcome {
    pub before_line: u32,
    pub after_line: u32,
    pub anchor: PlayheadAnchor,
    /// Section and local offset after the edit.
    pub section: usize,
    pub local: u32,
    /// The local offset fell outside the shrunk section.
    pub clamped: bool,
}

/// Map an anchor through `edit` onto the repositioned bindings.
pub fn remap(anchor: PlayheadAnchor, edit: StructuralEdit, sync: &PatternSync) -> Option<RemapOutcome> {
    let count = sync.section_count();
    if count == 0 {
        return None;
    }
    let section = edit
        .map_section(anchor.section)
        .unwrap_or(anchor.section)
        .min(count - 1);
    let binding = sync.binding(section)?;
    let last = binding.line_count.saturating_sub(1);
    let local = anchor.local.min(last);
    Some(RemapOutcome {
        before_line: anchor.line,
        after_line: binding.timeline_offset + local,
        anchor,
        section,
        local,
        clamped: local != anchor.local,
    })
}
