//! Cell value conversion into engine-native units.

use stepper_types::limits::{clamp_pitch, clamp_volume};

/// Engine note playing a sample at its recorded pitch.
pub const BASE_NOTE: u8 = 61;
pub const MIN_NOTE: u8 = 1;
pub const MAX_NOTE: u8 = 120;

/// Convert a pitch ratio to an engine note: one semitone per step of
/// `12 * log2(ratio)`, rounded, centred on [`BASE_NOTE`].
pub fn pitch_to_note(ratio: f32) -> u8 {
    let semitones = (12.0 * clamp_pitch(ratio).log2()).round() as i32;
    (BASE_NOTE as i32 + semitones).clamp(MIN_NOTE as i32, MAX_NOTE as i32) as u8
}

/// Convert a 0..=1 volume to engine velocity (1..=129). Returns `None` for
/// silence so the caller can emit an empty event instead.
pub fn volume_to_velocity(volume: f32) -> Option<u8> {
    let v = clamp_volume(volume);
    if v <= 0.0 {
        return None;
    }
    Some(((v * 128.0).round() as u16 + 1).min(u8::MAX as u16) as u8)
}
