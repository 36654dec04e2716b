//! Sample/voice provider contract.

use stepper_types::{SampleBankState, SampleDefaults, VoiceHandle};

/// Supplies per-slot defaults and the engine voice a slot plays through.
pub trait VoiceProvider {
    /// Defaults of a loaded slot. `None` for empty or out-of-range slots.
    fn defaults(&self, slot: u8) -> Option<SampleDefaults>;

    fn voice_handle(&self, slot: u8) -> Option<VoiceHandle>;
}

impl VoiceProvider for SampleBankState {
    fn defaults(&self, slot: u8) -> Option<SampleDefaults> {
        self.slot(slot).filter(|s| s.loaded).map(|s| s.defaults)
    }

    fn voice_handle(&self, slot: u8) -> Option<VoiceHandle> {
        self.slot(slot).filter(|s| s.loaded).and_then(|s| s.voice)
    }
}
