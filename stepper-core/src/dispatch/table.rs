use stepper_audio::continuity::StructuralEdit;
use stepper_audio::AudioHandle;
use stepper_types::{SeqResult, SequencerCommand};

use super::DispatchResult;
use crate::state::AppState;

pub(super) fn dispatch_table(
    cmd: &SequencerCommand,
    state: &mut AppState,
    audio: &mut AudioHandle,
) -> SeqResult<DispatchResult> {
    match cmd {
        SequencerCommand::SetCell { step, col, cell } => {
            state.table.set_cell(*step, *col, *cell)?;
            audio.sync_cell(state, *step, *col)?;
            Ok(DispatchResult::none())
        }
        SequencerCommand::SetCellSettings {
            step,
            col,
            volume,
            pitch,
        } => {
            state.table.set_cell_settings(*step, *col, *volume, *pitch)?;
            audio.sync_cell(state, *step, *col)?;
            Ok(DispatchResult::none())
        }
        SequencerCommand::SetCellSampleSlot { step, col, slot } => {
            state.table.set_cell_sample_slot(*step, *col, *slot)?;
            audio.sync_cell(state, *step, *col)?;
            Ok(DispatchResult::none())
        }
        SequencerCommand::ClearCell { step, col } => {
            state.table.clear_cell(*step, *col)?;
            audio.sync_cell(state, *step, *col)?;
            Ok(DispatchResult::none())
        }

        SequencerCommand::InsertStep { section, at } => {
            state.table.insert_step(*section, *at)?;
            structural(state, audio, StructuralEdit::Resized { section: *section })
        }
        SequencerCommand::DeleteStep { section, at } => {
            state.table.delete_step(*section, *at)?;
            structural(state, audio, StructuralEdit::Resized { section: *section })
        }
        SequencerCommand::SetSectionSteps { section, steps } => {
            state.table.set_section_step_count(*section, *steps)?;
            structural(state, audio, StructuralEdit::Resized { section: *section })
        }
        SequencerCommand::InsertSection {
            at,
            steps,
            copy_from,
        } => {
            state.table.insert_section(*at, *steps, *copy_from)?;
            structural(state, audio, StructuralEdit::Added { section: *at })
        }
        SequencerCommand::AppendSection { steps, copy_from } => {
            state.table.append_section(*steps, *copy_from)?;
            let section = state.table.section_count() - 1;
            structural(state, audio, StructuralEdit::Added { section })
        }
        SequencerCommand::RemoveSection(section) => {
            state.table.remove_section(*section)?;
            structural(state, audio, StructuralEdit::Removed { section: *section })
        }
        SequencerCommand::ReorderSection { from, to } => {
            state.table.reorder_section(*from, *to)?;
            if from == to {
                return Ok(DispatchResult::none());
            }
            structural(state, audio, StructuralEdit::Reordered { from: *from, to: *to })
        }
        SequencerCommand::SetLayerLen { section, layer, len } => {
            state.table.set_layer_len(*section, *layer, *len)?;
            audio.sync_section(state, *section)?;
            Ok(DispatchResult::none())
        }
        _ => Ok(DispatchResult::none()),
    }
}

fn structural(state: &AppState, audio: &mut AudioHandle, edit: StructuralEdit) -> SeqResult<DispatchResult> {
    let report = audio.apply_structural_edit(state, edit)?;
    log::debug!(
        target: "core::dispatch",
        "{:?}: {} sections, {} lines",
        edit,
        state.table.section_count(),
        report.timeline.total_lines
    );
    Ok(DispatchResult::with_edit(report))
}
