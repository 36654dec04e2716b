//! Hard limits shared by the table store, the sync engine and the controller.

/// Physical row capacity of the table store.
pub const MAX_STEPS: usize = 2048;
/// Columns per row. Each column maps to one engine track.
pub const MAX_COLS: usize = 16;
/// Sample slots A..Z.
pub const MAX_SAMPLE_SLOTS: usize = 26;
pub const MAX_SECTIONS: usize = 64;
pub const DEFAULT_SECTION_STEPS: usize = 16;

pub const MAX_LAYERS_PER_SECTION: usize = 4;
pub const MAX_COLS_PER_LAYER: usize = 4;

pub const DEFAULT_SECTION_LOOPS: u32 = 4;
pub const MIN_SECTION_LOOPS: u32 = 1;
pub const MAX_SECTION_LOOPS: u32 = 1024;

pub const MIN_BPM: u32 = 1;
pub const MAX_BPM: u32 = 300;
pub const DEFAULT_BPM: u32 = 120;

pub const MIN_PITCH_RATIO: f32 = 0.25;
pub const MAX_PITCH_RATIO: f32 = 4.0;

/// Clamp a loop count into the supported range.
pub fn clamp_loops(loops: u32) -> u32 {
    loops.clamp(MIN_SECTION_LOOPS, MAX_SECTION_LOOPS)
}

pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 1.0;
    }
    volume.clamp(0.0, 1.0)
}

pub fn clamp_pitch(ratio: f32) -> f32 {
    if !ratio.is_finite() || ratio <= 0.0 {
        return 1.0;
    }
    ratio.clamp(MIN_PITCH_RATIO, MAX_PITCH_RATIO)
}
