use stepper_audio::AudioHandle;
use stepper_types::limits::clamp_bpm;
use stepper_types::{SeqResult, SequencerCommand};

use super::DispatchResult;
use crate::state::AppState;

pub(super) fn dispatch_playback(
    cmd: &SequencerCommand,
    state: &mut AppState,
    audio: &mut AudioHandle,
) -> SeqResult<DispatchResult> {
    match cmd {
        SequencerCommand::SetMode { mode, section } => {
            audio.set_mode(*mode, *section)?;
        }
        SequencerCommand::SetLoopCount { section, count } => {
            audio.set_loop_count(*section, *count)?;
        }
        SequencerCommand::SetStopAtEnd(enabled) => {
            audio.set_stop_at_end(*enabled)?;
        }
        SequencerCommand::SetBpm(bpm) => {
            state.bpm = clamp_bpm(*bpm);
            audio.set_bpm(state.bpm)?;
        }
        SequencerCommand::Play { from_step } => {
            audio.play(*from_step)?;
        }
        SequencerCommand::Stop => {
            audio.stop()?;
        }
        SequencerCommand::SetRegion { start, end } => {
            audio.set_region(&state.table, *start, *end)?;
        }
        SequencerCommand::ClearRegion => {
            audio.clear_region()?;
        }
        SequencerCommand::SwitchToSection(section) => {
            audio.switch_to_section(*section)?;
        }
        SequencerCommand::SetTrackMuted { col, muted } => {
            audio.set_track_muted(state, *col, *muted)?;
        }
        SequencerCommand::SetSectionMuted { section, muted } => {
            state.table.set_section_muted(*section, *muted)?;
            audio.sync_section_mute(state, *section)?;
        }
        _ => {}
    }
    Ok(DispatchResult::none())
}
