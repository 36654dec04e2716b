//! Sample bank metadata.
//!
//! Decoding and loading audio is handled outside this crate; the bank only
//! tracks what the sync engine needs: per-slot defaults and the voice handle
//! the engine plays the slot through.

use serde::{Deserialize, Serialize};

use crate::error::{SeqError, SeqResult};
use crate::limits::{clamp_pitch, clamp_volume, MAX_SAMPLE_SLOTS};

/// Engine-side voice (sampler module) a slot is routed to.
pub type VoiceHandle = u16;

/// Default playback settings of a sample slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleDefaults {
    pub volume: f32,
    pub pitch: f32,
}

impl Default for SampleDefaults {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSlot {
    pub loaded: bool,
    pub display_name: String,
    pub defaults: SampleDefaults,
    pub voice: Option<VoiceHandle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBankState {
    slots: Vec<SampleSlot>,
}

impl Default for SampleBankState {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBankState {
    pub fn new() -> Self {
        Self {
            slots: vec![SampleSlot::default(); MAX_SAMPLE_SLOTS],
        }
    }

    pub fn slot(&self, slot: u8) -> Option<&SampleSlot> {
        self.slots.get(slot as usize)
    }

    pub fn loaded_count(&self) -> usize {
        self.slots.iter().filter(|s| s.loaded).count()
    }

    /// Mark a slot loaded and routed to `voice`. Settings reset to defaults.
    pub fn load(&mut self, slot: u8, display_name: &str, voice: VoiceHandle) -> SeqResult {
        let entry = self.slot_mut(slot)?;
        *entry = SampleSlot {
            loaded: true,
            display_name: display_name.to_string(),
            defaults: SampleDefaults::default(),
            voice: Some(voice),
        };
        Ok(())
    }

    pub fn unload(&mut self, slot: u8) -> SeqResult {
        *self.slot_mut(slot)? = SampleSlot::default();
        Ok(())
    }

    pub fn set_settings(&mut self, slot: u8, volume: f32, pitch: f32) -> SeqResult {
        let entry = self.slot_mut(slot)?;
        entry.defaults = SampleDefaults {
            volume: clamp_volume(volume),
            pitch: clamp_pitch(pitch),
        };
        Ok(())
    }

    fn slot_mut(&mut self, slot: u8) -> SeqResult<&mut SampleSlot> {
        self.slots
            .get_mut(slot as usize)
            .ok_or_else(|| SeqError::invalid(format!("sample slot {} out of range", slot)))
    }
}
