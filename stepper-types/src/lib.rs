//! # stepper-types
//!
//! Shared data model for the step sequencer: the physical cell table, the
//! section directory, sample bank metadata, playback mode state, commands
//! and the error taxonomy. No engine access happens here.

pub mod action;
mod audio;
pub mod error;
pub mod limits;
pub mod state;

pub use action::SequencerCommand;
pub use audio::PlaybackFeedback;
pub use error::{EngineError, SeqError, SeqResult};

// Re-export all state types at crate root for convenience
pub use state::*;
