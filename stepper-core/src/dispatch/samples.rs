use stepper_audio::AudioHandle;
use stepper_types::{SeqResult, SequencerCommand};

use super::DispatchResult;
use crate::state::AppState;

/// Sample bank edits. Every cell that references the slot is resynced so the
/// engine picks up the new voice or defaults.
pub(super) fn dispatch_samples(
    cmd: &SequencerCommand,
    state: &mut AppState,
    audio: &mut AudioHandle,
) -> SeqResult<DispatchResult> {
    let slot = match cmd {
        SequencerCommand::LoadSample { slot, name, voice } => {
            state.samples.load(*slot, name, *voice)?;
            log::info!(target: "core::dispatch", "loaded '{}' into slot {}", name, slot);
            *slot
        }
        SequencerCommand::UnloadSample(slot) => {
            state.samples.unload(*slot)?;
            *slot
        }
        SequencerCommand::SetSampleSettings {
            slot,
            volume,
            pitch,
        } => {
            state.samples.set_settings(*slot, *volume, *pitch)?;
            *slot
        }
        _ => return Ok(DispatchResult::none()),
    };

    let cells = state.table.cells_using_slot(slot);
    if !cells.is_empty() {
        audio.sync_cells(state, &cells)?;
    }
    Ok(DispatchResult::none())
}
