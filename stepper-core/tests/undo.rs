mod common;

use common::Session;
use stepper_audio::engine::{PatternEvent, PatternLoop};
use stepper_core::state::undo::UndoScope;
use stepper_types::{Cell, PlaybackMode, SequencerCommand};

fn with_kick(lengths: &[usize], cells: &[(usize, usize)]) -> Session {
    let mut s = Session::new(lengths);
    s.run(SequencerCommand::LoadSample {
        slot: 0,
        name: "kick".to_string(),
        voice: 1,
    });
    for &(step, col) in cells {
        s.run(SequencerCommand::SetCell {
            step,
            col,
            cell: Cell::with_sample(0),
        });
    }
    s
}

#[test]
fn undo_and_redo_insert_step() {
    let mut s = with_kick(&[8, 8], &[(5, 0)]);

    s.run(SequencerCommand::InsertStep { section: 0, at: 0 });
    assert_eq!(s.engine_starts(), vec![0, 9]);

    s.engine.clear_operations();
    let undone = s.run(SequencerCommand::Undo);
    assert_eq!(undone.restored, Some(UndoScope::Structure));
    assert_eq!(s.state.table.sections().lengths(), vec![8, 8]);
    assert_eq!(s.engine_starts(), vec![0, 8]);
    let p0 = s.pattern(0);
    assert_eq!(s.engine.event(p0, 0, 5).unwrap().voice, Some(1));
    assert_eq!(s.engine.event(p0, 0, 6), Some(PatternEvent::EMPTY));
    assert_eq!(s.engine.lock_acquisitions(), 1);
    assert_eq!(s.rewinds(), 0);
    s.assert_quiescent();

    s.run(SequencerCommand::Redo);
    assert_eq!(s.state.table.sections().lengths(), vec![9, 8]);
    assert_eq!(s.engine.event(s.pattern(0), 0, 6).unwrap().voice, Some(1));
    s.assert_quiescent();
}

#[test]
fn undo_remove_section_rebuilds_bindings() {
    let mut s = with_kick(&[4, 4, 4], &[(9, 2)]);

    s.run(SequencerCommand::RemoveSection(1));
    assert_eq!(s.engine.live_patterns(), 2);

    s.run(SequencerCommand::Undo);
    assert_eq!(s.state.table.section_count(), 3);
    assert_eq!(s.engine.live_patterns(), 3);
    assert_eq!(s.engine_starts(), vec![0, 4, 8]);
    assert_eq!(s.engine.event(s.pattern(2), 2, 1).unwrap().voice, Some(1));
    assert_eq!(s.audio.loop_state().section_count(), 3);
    s.assert_quiescent();
}

#[test]
fn undo_keeps_playhead_position() {
    let mut s = Session::new(&[8, 8]);
    s.engine.set_current_line(12);

    s.run(SequencerCommand::SetSectionSteps { section: 1, steps: 2 });
    assert_eq!(s.line(), 9);

    s.engine.clear_operations();
    s.run(SequencerCommand::Undo);
    assert_eq!(s.seeks(), vec![9]);
    assert_eq!(s.state.table.sections().lengths(), vec![8, 8]);
    s.assert_quiescent();
}

#[test]
fn cell_settings_drags_coalesce() {
    let mut s = with_kick(&[4], &[(1, 0)]);
    let depth = s.state.undo_history.undo_depth();

    for volume in [0.9, 0.8, 0.7] {
        s.run(SequencerCommand::SetCellSettings {
            step: 1,
            col: 0,
            volume: Some(volume),
            pitch: None,
        });
    }
    assert_eq!(s.state.undo_history.undo_depth(), depth + 1);

    s.run(SequencerCommand::Undo);
    assert_eq!(s.state.table.cell(1, 0).unwrap().volume, None);
    assert_eq!(s.engine.event(s.pattern(0), 0, 1).unwrap().velocity, 129);
}

#[test]
fn rejected_command_leaves_no_history() {
    let mut s = Session::new(&[4]);
    assert!(s
        .try_run(SequencerCommand::SetCell {
            step: 40,
            col: 0,
            cell: Cell::with_sample(0),
        })
        .is_err());
    assert!(s.try_run(SequencerCommand::RemoveSection(0)).is_err());
    assert!(!s.state.undo_history.can_undo());
}

#[test]
fn transport_and_mode_are_not_undoable() {
    let mut s = Session::new(&[4, 4]);
    s.run(SequencerCommand::SetMode {
        mode: PlaybackMode::SingleLoop,
        section: 1,
    });
    s.run(SequencerCommand::SetBpm(90));
    s.run(SequencerCommand::SetTrackMuted { col: 0, muted: true });
    assert!(!s.state.undo_history.can_undo());

    let result = s.run(SequencerCommand::Undo);
    assert_eq!(result.restored, None);
    assert_eq!(result.edit, None);
}

#[test]
fn undo_loop_count_restores_engine_config() {
    let mut s = Session::new(&[4, 4]);
    s.run(SequencerCommand::SetLoopCount { section: 1, count: 6 });
    assert_eq!(
        s.engine.pattern_info(s.pattern(1)).unwrap().loop_mode,
        PatternLoop::Count(6)
    );

    let result = s.run(SequencerCommand::Undo);

    assert_eq!(result.restored, Some(UndoScope::Loops));
    assert_eq!(s.audio.loop_state().loop_count(1), 4);
    assert_eq!(
        s.engine.pattern_info(s.pattern(1)).unwrap().loop_mode,
        PatternLoop::Count(4)
    );
    s.assert_quiescent();
}

#[test]
fn undo_stop_at_end() {
    let mut s = Session::new(&[4]);
    s.run(SequencerCommand::SetStopAtEnd(true));
    assert!(s.engine.autostop());

    s.run(SequencerCommand::Undo);
    assert!(!s.audio.loop_state().stop_at_end);
    assert!(!s.engine.autostop());
}

#[test]
fn undo_structure_restores_loop_counts() {
    let mut s = Session::new(&[4, 4]);
    s.run(SequencerCommand::SetLoopCount { section: 1, count: 9 });
    s.run(SequencerCommand::ReorderSection { from: 1, to: 0 });
    assert_eq!(s.audio.loop_state().loop_counts, vec![9, 4]);

    s.run(SequencerCommand::Undo);
    assert_eq!(s.audio.loop_state().loop_counts, vec![4, 9]);
    s.assert_quiescent();
}

#[test]
fn undo_unload_sample_restores_events() {
    let mut s = with_kick(&[4], &[(2, 3)]);
    let p = s.pattern(0);

    s.run(SequencerCommand::UnloadSample(0));
    assert_eq!(s.engine.event(p, 3, 2), Some(PatternEvent::EMPTY));

    let result = s.run(SequencerCommand::Undo);
    assert_eq!(result.restored, Some(UndoScope::Samples));
    assert_eq!(s.engine.event(s.pattern(0), 3, 2).unwrap().voice, Some(1));
    s.assert_quiescent();
}

#[test]
fn new_command_clears_redo() {
    let mut s = Session::new(&[4]);
    s.run(SequencerCommand::InsertStep { section: 0, at: 0 });
    s.run(SequencerCommand::Undo);
    assert!(s.state.undo_history.can_redo());

    s.run(SequencerCommand::DeleteStep { section: 0, at: 0 });
    assert!(!s.state.undo_history.can_redo());
}
