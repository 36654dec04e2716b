mod playback;
mod samples;
mod table;

use stepper_audio::continuity::StructuralEdit;
use stepper_audio::handle::EditReport;
use stepper_audio::AudioHandle;
use stepper_types::{SeqResult, SequencerCommand};

use crate::state::undo::{coalesce_key, undo_scope, LoopSnapshot, UndoScope, UndoTarget};
use crate::state::AppState;

/// What a dispatched command did beyond mutating state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResult {
    /// Set when the command ran the structural edit protocol.
    pub edit: Option<EditReport>,
    /// Set when undo/redo restored a snapshot.
    pub restored: Option<UndoScope>,
}

impl DispatchResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_edit(report: EditReport) -> Self {
        Self {
            edit: Some(report),
            restored: None,
        }
    }
}

/// Dispatch a command: push an undo snapshot when the command is undoable,
/// mutate the table or sample bank, then bring the engine in line.
///
/// Rejected commands (`InvalidArgument`, `ResourceExhausted`) leave state
/// unchanged and drop the snapshot they pushed.
pub fn dispatch_command(
    cmd: &SequencerCommand,
    state: &mut AppState,
    audio: &mut AudioHandle,
) -> SeqResult<DispatchResult> {
    let pushed = if cmd.is_undoable() {
        let loops = LoopSnapshot::from(audio.loop_state());
        state.undo_history.push_coalesced(
            undo_scope(cmd),
            &state.table,
            &state.samples,
            &loops,
            coalesce_key(cmd),
        )
    } else {
        false
    };

    let result = match cmd {
        SequencerCommand::Undo => dispatch_history(false, state, audio),
        SequencerCommand::Redo => dispatch_history(true, state, audio),
        SequencerCommand::LoadSample { .. }
        | SequencerCommand::UnloadSample(_)
        | SequencerCommand::SetSampleSettings { .. } => samples::dispatch_samples(cmd, state, audio),
        SequencerCommand::SetMode { .. }
        | SequencerCommand::SetLoopCount { .. }
        | SequencerCommand::SetStopAtEnd(_)
        | SequencerCommand::SetBpm(_)
        | SequencerCommand::Play { .. }
        | SequencerCommand::Stop
        | SequencerCommand::SetRegion { .. }
        | SequencerCommand::ClearRegion
        | SequencerCommand::SwitchToSection(_)
        | SequencerCommand::SetTrackMuted { .. }
        | SequencerCommand::SetSectionMuted { .. } => playback::dispatch_playback(cmd, state, audio),
        _ => table::dispatch_table(cmd, state, audio),
    };

    if let Err(e) = &result {
        if e.is_rejection() {
            if pushed {
                state.undo_history.discard_last();
            }
            log::warn!(target: "core::dispatch", "{:?} rejected: {}", cmd, e);
        } else {
            log::error!(target: "core::dispatch", "{:?} failed: {}", cmd, e);
        }
    }
    result
}

fn dispatch_history(redo: bool, state: &mut AppState, audio: &mut AudioHandle) -> SeqResult<DispatchResult> {
    let mut loops = LoopSnapshot::from(audio.loop_state());
    let target = UndoTarget {
        table: &mut state.table,
        samples: &mut state.samples,
        loops: &mut loops,
    };
    let restored = if redo {
        state.undo_history.redo(target)
    } else {
        state.undo_history.undo(target)
    };
    let Some(scope) = restored else {
        return Ok(DispatchResult::none());
    };

    if scope.touches_loops() {
        audio.restore_loop_state(&loops.counts, loops.stop_at_end);
    }
    let report = audio.apply_structural_edit(state, StructuralEdit::Rebuilt)?;
    log::debug!(
        target: "core::dispatch",
        "{} restored {:?} ({} sections)",
        if redo { "redo" } else { "undo" },
        scope,
        state.table.section_count()
    );
    Ok(DispatchResult {
        edit: Some(report),
        restored: Some(scope),
    })
}
