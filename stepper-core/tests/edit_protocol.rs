mod common;

use common::Session;
use stepper_audio::engine::{EngineQuirks, PatternEvent};
use stepper_types::{Cell, PlaybackFeedback, SeqError, SequencerCommand};

fn load_kick(session: &mut Session) {
    session.run(SequencerCommand::LoadSample {
        slot: 0,
        name: "kick".to_string(),
        voice: 1,
    });
}

#[test]
fn shrinking_earlier_section_moves_playhead_with_its_section() {
    let mut s = Session::new(&[16, 16, 16]);
    s.engine.set_current_line(21);

    let result = s.run(SequencerCommand::SetSectionSteps { section: 0, steps: 11 });

    assert_eq!(s.engine_starts(), vec![0, 11, 27]);
    assert_eq!(s.line(), 16);
    let remap = result.edit.unwrap().remap.unwrap();
    assert_eq!((remap.section, remap.local), (1, 5));
    assert!(!remap.clamped);
    assert_eq!(s.seeks(), vec![16]);
    assert_eq!(s.rewinds(), 0);
    s.assert_quiescent();
}

#[test]
fn deleting_steps_one_at_a_time_tracks_the_playhead() {
    let mut s = Session::new(&[16, 16, 16]);
    s.engine.set_current_line(21);

    for _ in 0..5 {
        s.run(SequencerCommand::DeleteStep { section: 0, at: 0 });
    }

    assert_eq!(s.engine_starts(), vec![0, 11, 27]);
    assert_eq!(s.line(), 16);
    assert_eq!(s.seeks(), vec![20, 19, 18, 17, 16]);
    assert_eq!(s.engine.lock_acquisitions(), 5);
    assert_eq!(s.rewinds(), 0);
    s.assert_quiescent();
}

#[test]
fn insert_at_playhead_puts_new_row_under_it() {
    let mut s = Session::new(&[8, 8]);
    load_kick(&mut s);
    s.run(SequencerCommand::SetCell {
        step: 3,
        col: 0,
        cell: Cell::with_sample(0),
    });
    s.engine.set_current_line(3);

    s.run(SequencerCommand::InsertStep { section: 0, at: 3 });

    assert_eq!(s.line(), 3);
    let p0 = s.pattern(0);
    assert_eq!(s.engine.event(p0, 0, 3), Some(PatternEvent::EMPTY));
    assert_eq!(s.engine.event(p0, 0, 4).unwrap().voice, Some(1));
    assert!(s.state.table.cell(3, 0).unwrap().is_empty());
    assert_eq!(s.engine_starts(), vec![0, 9]);
    s.assert_quiescent();
}

#[test]
fn insert_after_playhead_leaves_line_unchanged() {
    let mut s = Session::new(&[8, 8]);
    s.engine.set_current_line(2);

    s.run(SequencerCommand::InsertStep { section: 0, at: 6 });
    assert_eq!(s.line(), 2);
    s.run(SequencerCommand::InsertStep { section: 1, at: 0 });
    assert_eq!(s.line(), 2);
    assert_eq!(s.engine_starts(), vec![0, 9]);
    s.assert_quiescent();
}

#[test]
fn insert_in_earlier_section_shifts_line_but_not_position() {
    let mut s = Session::new(&[8, 8]);
    s.engine.set_current_line(10);

    let result = s.run(SequencerCommand::InsertStep { section: 0, at: 0 });

    assert_eq!(s.line(), 11);
    let remap = result.edit.unwrap().remap.unwrap();
    assert_eq!((remap.section, remap.local), (1, 2));
    assert_eq!(s.audio.monitor().snapshot().line, 11);
    s.assert_quiescent();
}

#[test]
fn deleting_last_row_under_playhead_clamps() {
    let mut s = Session::new(&[8, 4]);
    s.engine.set_current_line(11);

    let result = s.run(SequencerCommand::DeleteStep { section: 1, at: 3 });

    let remap = result.edit.unwrap().remap.unwrap();
    assert!(remap.clamped);
    assert_eq!(remap.local, 2);
    assert_eq!(s.line(), 10);
    s.assert_quiescent();
}

#[test]
fn insert_then_delete_restores_layout_and_events() {
    let mut s = Session::new(&[8, 8]);
    load_kick(&mut s);
    for step in [0, 5, 9] {
        s.run(SequencerCommand::SetCell {
            step,
            col: 1,
            cell: Cell::with_sample(0),
        });
    }
    let p0 = s.pattern(0);
    let p1 = s.pattern(1);
    let before: Vec<_> = (0..8)
        .map(|line| (s.engine.event(p0, 1, line), s.engine.event(p1, 1, line)))
        .collect();

    s.run(SequencerCommand::InsertStep { section: 0, at: 2 });
    s.run(SequencerCommand::DeleteStep { section: 0, at: 2 });

    let after: Vec<_> = (0..8)
        .map(|line| (s.engine.event(p0, 1, line), s.engine.event(p1, 1, line)))
        .collect();
    assert_eq!(before, after);
    assert_eq!(s.engine_starts(), vec![0, 8]);
    s.assert_quiescent();
}

#[test]
fn timeline_positioning_is_idempotent() {
    let mut s = Session::new(&[5, 7, 3]);
    let first = s.audio.reposition_timeline(&s.state).unwrap();
    let starts = s.engine_starts();
    let second = s.audio.reposition_timeline(&s.state).unwrap();

    assert_eq!(first, second);
    assert!(second.is_consistent());
    assert_eq!(second.total_lines, 15);
    assert_eq!(s.engine_starts(), starts);
    assert_eq!(starts, vec![0, 5, 12]);
    s.assert_quiescent();
}

#[test]
fn stale_length_after_shrink_recreates_pattern() {
    let mut s = Session::with_quirks(
        &[8, 8],
        EngineQuirks {
            stale_length_after_shrink: true,
            ..Default::default()
        },
    );
    load_kick(&mut s);
    s.run(SequencerCommand::SetCell {
        step: 1,
        col: 0,
        cell: Cell::with_sample(0),
    });
    let old = s.pattern(0);

    let report = s
        .run(SequencerCommand::SetSectionSteps { section: 0, steps: 4 })
        .edit
        .unwrap();

    assert_eq!(report.recreated_sections().collect::<Vec<_>>(), vec![0]);
    let fresh = s.pattern(0);
    assert_ne!(fresh, old);
    assert!(s.engine.pattern_info(old).is_none());
    assert_eq!(s.engine.pattern_info(fresh).unwrap().lines, 4);
    assert_eq!(s.engine.event(fresh, 0, 1).unwrap().voice, Some(1));
    assert_eq!(s.engine.live_patterns(), 2);
    assert_eq!(s.engine_starts(), vec![0, 4]);
    assert!(s
        .audio
        .drain_feedback()
        .contains(&PlaybackFeedback::PatternRecreated { section: 0 }));
    s.assert_quiescent();
}

#[test]
fn removing_playhead_section_reanchors_to_same_index() {
    let mut s = Session::new(&[4, 4, 4]);
    s.engine.set_current_line(5);

    s.run(SequencerCommand::RemoveSection(1));

    assert_eq!(s.engine_starts(), vec![0, 4]);
    assert_eq!(s.line(), 5);
    assert_eq!(s.engine.live_patterns(), 2);
    s.assert_quiescent();
}

#[test]
fn removing_last_section_under_playhead_clamps_index() {
    let mut s = Session::new(&[4, 4, 4]);
    s.engine.set_current_line(10);

    s.run(SequencerCommand::RemoveSection(2));

    assert_eq!(s.line(), 6);
    s.assert_quiescent();
}

#[test]
fn reorder_follows_the_moved_section() {
    let mut s = Session::new(&[4, 8, 4]);
    s.engine.set_current_line(6);
    let moved = s.pattern(1);

    s.run(SequencerCommand::ReorderSection { from: 1, to: 0 });

    assert_eq!(s.pattern(0), moved);
    assert_eq!(s.engine_starts(), vec![0, 8, 12]);
    assert_eq!(s.line(), 2);
    assert_eq!(s.engine.sequence()[0], moved);
    s.assert_quiescent();
}

#[test]
fn added_section_copies_events() {
    let mut s = Session::new(&[4]);
    load_kick(&mut s);
    s.run(SequencerCommand::SetCell {
        step: 2,
        col: 3,
        cell: Cell::with_sample(0),
    });

    s.run(SequencerCommand::AppendSection {
        steps: 6,
        copy_from: Some(0),
    });

    let copy = s.pattern(1);
    assert_eq!(s.engine.event(copy, 3, 2).unwrap().voice, Some(1));
    assert_eq!(s.engine.event(copy, 3, 5), Some(PatternEvent::EMPTY));
    assert_eq!(s.engine_starts(), vec![0, 4]);
    assert_eq!(s.engine.sequence().len(), 2);
    s.assert_quiescent();
}

#[test]
fn inserted_section_shifts_later_bindings() {
    let mut s = Session::new(&[4, 4]);
    s.engine.set_current_line(5);
    let second = s.pattern(1);

    s.run(SequencerCommand::InsertSection {
        at: 1,
        steps: 2,
        copy_from: None,
    });

    assert_eq!(s.pattern(2), second);
    assert_eq!(s.engine_starts(), vec![0, 4, 6]);
    assert_eq!(s.line(), 7);
    s.assert_quiescent();
}

#[test]
fn rejected_edit_does_not_touch_engine() {
    let mut s = Session::new(&[4, 4]);

    let err = s
        .try_run(SequencerCommand::DeleteStep { section: 5, at: 0 })
        .unwrap_err();
    assert!(matches!(err, SeqError::InvalidArgument(_)));
    let err = s
        .try_run(SequencerCommand::DeleteStep { section: 0, at: 4 })
        .unwrap_err();
    assert!(matches!(err, SeqError::InvalidArgument(_)));

    assert!(s.engine.operations().is_empty());
    assert!(!s.state.undo_history.can_undo());
    s.assert_quiescent();
}

#[test]
fn section_keeps_at_least_one_step() {
    let mut s = Session::new(&[1, 4]);
    assert!(s
        .try_run(SequencerCommand::DeleteStep { section: 0, at: 0 })
        .is_err());
    assert!(s
        .try_run(SequencerCommand::SetSectionSteps { section: 1, steps: 0 })
        .is_err());
    assert_eq!(s.state.table.sections().lengths(), vec![1, 4]);
    s.assert_quiescent();
}

#[test]
fn section_limit_is_enforced() {
    let lengths = vec![1; stepper_types::limits::MAX_SECTIONS];
    let mut s = Session::new(&lengths);

    let err = s
        .try_run(SequencerCommand::AppendSection {
            steps: 1,
            copy_from: None,
        })
        .unwrap_err();

    assert!(matches!(err, SeqError::ResourceExhausted(_)));
    assert_eq!(s.engine.live_patterns(), lengths.len());
    s.assert_quiescent();
}

#[test]
fn every_structural_edit_takes_one_lock_and_one_seek() {
    let mut s = Session::new(&[8, 8, 8]);
    s.engine.set_current_line(12);
    let commands = [
        SequencerCommand::InsertStep { section: 1, at: 0 },
        SequencerCommand::DeleteStep { section: 2, at: 7 },
        SequencerCommand::SetSectionSteps { section: 0, steps: 12 },
        SequencerCommand::InsertSection {
            at: 0,
            steps: 4,
            copy_from: Some(1),
        },
        SequencerCommand::AppendSection {
            steps: 4,
            copy_from: None,
        },
        SequencerCommand::ReorderSection { from: 0, to: 3 },
        SequencerCommand::RemoveSection(1),
    ];

    for cmd in commands {
        s.engine.clear_operations();
        s.run(cmd.clone());
        assert_eq!(s.engine.lock_acquisitions(), 1, "{:?}", cmd);
        assert_eq!(s.seeks().len(), 1, "{:?}", cmd);
        assert_eq!(s.rewinds(), 0, "{:?}", cmd);
        s.assert_quiescent();
    }
}

#[test]
fn muted_track_is_filtered_at_sync_time() {
    let mut s = Session::new(&[4]);
    load_kick(&mut s);
    s.run(SequencerCommand::SetCell {
        step: 1,
        col: 2,
        cell: Cell::with_sample(0),
    });
    let p = s.pattern(0);

    s.run(SequencerCommand::SetTrackMuted { col: 2, muted: true });
    assert_eq!(s.engine.event(p, 2, 1), Some(PatternEvent::EMPTY));
    assert!(s.state.table.cell(1, 2).unwrap().sample_slot.is_some());

    s.run(SequencerCommand::SetTrackMuted { col: 2, muted: false });
    assert_eq!(s.engine.event(p, 2, 1).unwrap().voice, Some(1));
    s.assert_quiescent();
}

#[test]
fn section_mute_uses_pattern_mute() {
    let mut s = Session::new(&[4, 4]);
    s.run(SequencerCommand::SetSectionMuted {
        section: 1,
        muted: true,
    });
    assert!(s.engine.pattern_info(s.pattern(1)).unwrap().muted);
    assert!(s.audio.bindings()[1].unwrap().muted);

    s.run(SequencerCommand::InsertStep { section: 1, at: 0 });
    assert!(s.engine.pattern_info(s.pattern(1)).unwrap().muted);
    s.assert_quiescent();
}

fn pattern_mutes(s: &Session) -> Vec<bool> {
    (0..s.state.table.section_count())
        .map(|i| s.engine.pattern_info(s.pattern(i)).unwrap().muted)
        .collect()
}

#[test]
fn section_mute_follows_its_section_through_undo() {
    let mut s = Session::new(&[4, 4, 4]);
    s.run(SequencerCommand::SetSectionMuted {
        section: 2,
        muted: true,
    });

    s.run(SequencerCommand::RemoveSection(0));
    assert_eq!(pattern_mutes(&s), vec![false, true]);

    s.run(SequencerCommand::Undo);
    assert_eq!(pattern_mutes(&s), vec![false, false, true]);
    assert!(s.state.table.section(2).unwrap().is_muted());

    s.run(SequencerCommand::ReorderSection { from: 2, to: 0 });
    assert_eq!(pattern_mutes(&s), vec![true, false, false]);
    s.assert_quiescent();

    s.run(SequencerCommand::Undo);
    s.run(SequencerCommand::Undo);
    assert_eq!(pattern_mutes(&s), vec![false, false, false]);
    s.assert_quiescent();
}

#[test]
fn sample_settings_resync_referencing_cells() {
    let mut s = Session::new(&[4]);
    load_kick(&mut s);
    s.run(SequencerCommand::SetCell {
        step: 0,
        col: 0,
        cell: Cell::with_sample(0),
    });
    let p = s.pattern(0);
    assert_eq!(s.engine.event(p, 0, 0).unwrap().velocity, 129);

    s.run(SequencerCommand::SetSampleSettings {
        slot: 0,
        volume: 0.5,
        pitch: 2.0,
    });
    let ev = s.engine.event(p, 0, 0).unwrap();
    assert_eq!(ev.velocity, 65);
    assert_eq!(ev.note, 73);

    s.run(SequencerCommand::UnloadSample(0));
    assert_eq!(s.engine.event(p, 0, 0), Some(PatternEvent::EMPTY));
    s.assert_quiescent();
}

#[test]
fn shortened_layer_silences_hidden_columns() {
    let mut s = Session::new(&[4, 4]);
    load_kick(&mut s);
    s.run(SequencerCommand::SetCell {
        step: 5,
        col: 3,
        cell: Cell::with_sample(0),
    });
    let p1 = s.pattern(1);
    assert_eq!(s.engine.event(p1, 3, 1).unwrap().voice, Some(1));

    s.run(SequencerCommand::SetLayerLen {
        section: 1,
        layer: 0,
        len: 3,
    });
    assert_eq!(s.engine.event(p1, 3, 1), Some(PatternEvent::EMPTY));

    s.run(SequencerCommand::Undo);
    assert_eq!(s.engine.event(s.pattern(1), 3, 1).unwrap().voice, Some(1));
    s.assert_quiescent();
}
