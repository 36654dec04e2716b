//! State types shared by the audio and core crates.

pub mod cell;
pub mod playback;
pub mod sample_bank;
pub mod section;
pub mod table;

pub use cell::{Cell, Row, EMPTY_ROW};
pub use playback::{PlaybackMode, PlaybackModeState};
pub use sample_bank::{SampleBankState, SampleDefaults, SampleSlot, VoiceHandle};
pub use section::{Section, SectionDirectory};
pub use table::TableState;
