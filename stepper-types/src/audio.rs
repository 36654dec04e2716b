use serde::{Deserialize, Serialize};

use crate::state::PlaybackMode;

/// Events published by the audio side for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackFeedback {
    SectionChanged { from: usize, to: usize },
    LoopIteration { section: usize, iteration: u32 },
    Stopped,
    ModeChanged { mode: PlaybackMode, section: usize },
    /// Playback region in steps, `end` exclusive. `None` when cleared.
    RegionChanged { region: Option<(usize, usize)> },
    /// A resize could not be verified and the pattern was rebuilt.
    PatternRecreated { section: usize },
    /// Computed timeline disagreed with the section directory.
    ConsistencyWarning { section: usize, expected: u32, actual: u32 },
}
