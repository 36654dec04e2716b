mod common;

use common::Session;
use stepper_audio::engine::{EngineOp, EngineQuirks, PatternLoop};
use stepper_audio::PatternEngine;
use stepper_types::{PlaybackFeedback, PlaybackMode, SequencerCommand};

fn single_loop(section: usize) -> SequencerCommand {
    SequencerCommand::SetMode {
        mode: PlaybackMode::SingleLoop,
        section,
    }
}

fn sequence(section: usize) -> SequencerCommand {
    SequencerCommand::SetMode {
        mode: PlaybackMode::Sequence,
        section,
    }
}

fn quirky(lengths: &[usize]) -> Session {
    Session::with_quirks(
        lengths,
        EngineQuirks {
            reset_iteration_on_loop_config: true,
            ..Default::default()
        },
    )
}

#[test]
fn leaving_single_loop_is_one_seek_in_place() {
    let mut s = Session::new(&[16, 16]);
    s.engine.set_current_line(20);
    s.run(single_loop(1));
    assert_eq!(s.line(), 20);
    s.engine.clear_operations();

    s.run(sequence(1));

    assert_eq!(s.seeks(), vec![20]);
    assert_eq!(s.rewinds(), 0);
    assert_eq!(s.engine.lock_acquisitions(), 1);
    assert_eq!(s.engine.sequence(), vec![s.pattern(0), s.pattern(1)]);
    assert_eq!(s.audio.loop_state().mode, PlaybackMode::Sequence);
    assert_eq!(s.audio.loop_state().current_section, 1);
    s.assert_quiescent();
}

#[test]
fn single_loop_on_another_section_starts_it_from_the_top() {
    let mut s = Session::new(&[16, 16]);
    s.engine.set_current_line(3);

    s.run(single_loop(1));

    assert_eq!(s.seeks(), vec![16]);
    assert_eq!(s.engine.sequence(), vec![s.pattern(1)]);
    let info = s.engine.pattern_info(s.pattern(1)).unwrap();
    assert_eq!(info.loop_mode, PatternLoop::Infinite);
    let other = s.engine.pattern_info(s.pattern(0)).unwrap();
    assert_eq!(other.loop_mode, PatternLoop::Off);
    assert!(!s.engine.autostop());
    assert!(s.audio.drain_feedback().contains(&PlaybackFeedback::ModeChanged {
        mode: PlaybackMode::SingleLoop,
        section: 1,
    }));
    s.assert_quiescent();
}

#[test]
fn shrinking_looping_section_clamps_and_keeps_iteration() {
    let mut s = quirky(&[8, 8]);
    s.engine.set_current_line(14);
    s.run(single_loop(1));
    let p1 = s.pattern(1);
    s.engine.set_iteration(p1, 3);

    let report = s
        .run(SequencerCommand::SetSectionSteps { section: 1, steps: 4 })
        .edit
        .unwrap();

    let remap = report.remap.unwrap();
    assert!(remap.clamped);
    assert_eq!(s.line(), 11);
    assert_eq!(report.iteration, 3);
    assert!(report.loop_refreshed);
    let info = s.engine.pattern_info(p1).unwrap();
    assert_eq!(info.iteration, 3);
    assert_eq!(info.loop_mode, PatternLoop::Infinite);
    assert_eq!(s.audio.loop_state().iteration(1), 3);
    s.assert_quiescent();
}

#[test]
fn sequence_edit_carries_iteration_through_reset_quirk() {
    let mut s = quirky(&[8, 8]);
    s.engine.set_current_line(10);
    s.engine.set_iteration(s.pattern(1), 2);

    s.run(SequencerCommand::InsertSection {
        at: 0,
        steps: 4,
        copy_from: None,
    });

    let p = s.pattern(2);
    assert_eq!(s.line(), 14);
    assert_eq!(s.engine.pattern_info(p).unwrap().iteration, 2);
    assert_eq!(s.engine.pattern_info(p).unwrap().loop_mode, PatternLoop::Count(4));
    assert_eq!(s.audio.loop_state().current_section, 2);
    s.assert_quiescent();
}

#[test]
fn back_to_sequence_clamps_iteration_to_loop_count() {
    let mut s = Session::new(&[4, 4]);
    s.engine.set_current_line(5);
    s.run(single_loop(1));
    s.engine.set_iteration(s.pattern(1), 7);

    s.run(sequence(1));

    assert_eq!(s.audio.loop_state().iteration(1), 3);
    assert_eq!(s.engine.pattern_info(s.pattern(1)).unwrap().iteration, 3);
    assert_eq!(s.line(), 5);
}

#[test]
fn back_to_sequence_resumes_the_section_under_the_playhead() {
    let mut s = Session::new(&[4, 4]);
    s.engine.set_current_line(5);
    s.run(single_loop(1));
    let (p0, p1) = (s.pattern(0), s.pattern(1));
    s.engine.set_iteration(p1, 7);

    s.run(sequence(0));

    assert_eq!(s.engine.pattern_info(p1).unwrap().iteration, 3);
    assert_eq!(s.engine.pattern_info(p1).unwrap().loop_mode, PatternLoop::Count(4));
    assert_eq!(s.engine.pattern_info(p0).unwrap().iteration, 0);
    assert_eq!(s.audio.loop_state().current_section, 1);
    assert_eq!(s.audio.loop_state().iteration(1), 3);
    assert_eq!(s.line(), 5);
    assert!(s.audio.drain_feedback().contains(&PlaybackFeedback::ModeChanged {
        mode: PlaybackMode::Sequence,
        section: 1,
    }));

    s.engine.set_playing(true);
    let snap = s.audio.poll();
    assert_eq!((snap.section, snap.iteration), (1, 3));
    assert!(s.audio.drain_feedback().is_empty());
    s.assert_quiescent();
}

#[test]
fn stop_at_end_plays_each_section_its_loop_count() {
    let mut s = Session::new(&[2, 2, 2]);
    s.run(SequencerCommand::SetLoopCount { section: 0, count: 2 });
    s.run(SequencerCommand::SetLoopCount { section: 1, count: 1 });
    s.run(SequencerCommand::SetLoopCount { section: 2, count: 3 });
    s.run(SequencerCommand::SetStopAtEnd(true));
    assert!(s.engine.autostop());
    s.run(SequencerCommand::Play { from_step: 0 });

    let mut visited = Vec::new();
    for _ in 0..12 {
        s.engine.advance(1);
        let snap = s.audio.poll();
        if snap.playing {
            visited.push((snap.section, snap.iteration));
        }
    }

    assert!(!s.audio.monitor().snapshot().playing);
    visited.dedup();
    assert_eq!(
        visited,
        vec![(0, 0), (0, 1), (1, 0), (2, 0), (2, 1), (2, 2)]
    );
    let feedback = s.audio.drain_feedback();
    assert!(feedback.contains(&PlaybackFeedback::SectionChanged { from: 0, to: 1 }));
    assert!(feedback.contains(&PlaybackFeedback::SectionChanged { from: 1, to: 2 }));
    assert_eq!(feedback.last(), Some(&PlaybackFeedback::Stopped));
    s.assert_quiescent();
}

#[test]
fn restart_plays_every_section_its_full_loop_count() {
    let mut s = Session::new(&[2, 2, 2]);
    s.run(SequencerCommand::SetStopAtEnd(true));
    for section in 0..3 {
        s.run(SequencerCommand::SetLoopCount { section, count: 3 });
    }
    s.run(SequencerCommand::Play { from_step: 0 });
    for _ in 0..15 {
        s.engine.advance(1);
        s.audio.poll();
    }
    assert_eq!(s.engine.pattern_info(s.pattern(2)).unwrap().iteration, 1);
    s.run(SequencerCommand::Stop);

    s.run(SequencerCommand::Play { from_step: 0 });
    assert_eq!(s.audio.loop_state().loop_iterations, vec![0, 0, 0]);
    for section in 0..3 {
        assert_eq!(s.engine.pattern_info(s.pattern(section)).unwrap().iteration, 0);
    }

    let mut rendered = 0;
    while s.engine.is_playing() && rendered < 40 {
        s.engine.advance(1);
        s.audio.poll();
        rendered += 1;
    }
    assert_eq!(rendered, 18);
    assert_eq!(s.audio.drain_feedback().last(), Some(&PlaybackFeedback::Stopped));
    s.assert_quiescent();
}

#[test]
fn sequence_wraps_without_stop_at_end() {
    let mut s = Session::new(&[2, 2]);
    s.run(SequencerCommand::SetLoopCount { section: 0, count: 1 });
    s.run(SequencerCommand::SetLoopCount { section: 1, count: 1 });
    s.run(SequencerCommand::Play { from_step: 0 });

    for _ in 0..4 {
        s.engine.advance(1);
        s.audio.poll();
    }

    let snap = s.audio.poll();
    assert!(snap.playing);
    assert_eq!((snap.section, snap.line), (0, 0));
    assert!(s
        .audio
        .drain_feedback()
        .contains(&PlaybackFeedback::SectionChanged { from: 1, to: 0 }));
}

#[test]
fn poll_replays_passes_it_missed() {
    let mut s = Session::new(&[2, 2, 2]);
    s.run(SequencerCommand::Play { from_step: 0 });
    // Jump straight into section 2 without rendering the passes between.
    s.engine.set_current_line(5);

    let snap = s.audio.poll();

    assert_eq!(snap.section, 2);
    assert_eq!(s.audio.loop_state().current_section, 2);
    let feedback = s.audio.drain_feedback();
    assert!(feedback.contains(&PlaybackFeedback::LoopIteration { section: 0, iteration: 3 }));
    assert!(feedback.contains(&PlaybackFeedback::SectionChanged { from: 1, to: 2 }));
}

#[test]
fn poll_snaps_to_engine_when_too_far_behind() {
    let mut s = Session::new(&[2, 2, 2]);
    for section in 0..3 {
        s.run(SequencerCommand::SetLoopCount { section, count: 100 });
    }
    s.run(SequencerCommand::Play { from_step: 0 });
    s.engine.set_current_line(5);

    let snap = s.audio.poll();

    assert_eq!((snap.section, snap.iteration), (2, 0));
    assert!(s
        .audio
        .drain_feedback()
        .contains(&PlaybackFeedback::SectionChanged { from: 0, to: 2 }));
}

#[test]
fn play_in_single_loop_starts_inside_the_looping_section() {
    let mut s = Session::new(&[16, 16]);
    s.run(single_loop(1));
    s.engine.clear_operations();

    s.run(SequencerCommand::Play { from_step: 2 });
    assert!(s.engine.operations().contains(&EngineOp::Rewind(16)));

    s.run(SequencerCommand::Stop);
    s.engine.clear_operations();
    s.run(SequencerCommand::Play { from_step: 20 });
    assert!(s.engine.operations().contains(&EngineOp::Rewind(20)));
    assert!(s.engine.is_playing());
}

#[test]
fn play_outside_the_timeline_is_rejected() {
    let mut s = Session::new(&[4]);
    assert!(s
        .try_run(SequencerCommand::Play { from_step: 40 })
        .is_err());
    assert!(!s.engine.is_playing());
}

#[test]
fn loop_count_is_clamped_and_applied() {
    let mut s = Session::new(&[4, 4]);
    s.run(SequencerCommand::SetLoopCount { section: 1, count: 0 });
    assert_eq!(s.audio.loop_state().loop_count(1), 1);
    assert_eq!(
        s.engine.pattern_info(s.pattern(1)).unwrap().loop_mode,
        PatternLoop::Count(1)
    );
    assert!(s
        .try_run(SequencerCommand::SetLoopCount { section: 9, count: 2 })
        .is_err());
}

#[test]
fn loop_arrays_follow_section_edits() {
    let mut s = Session::new(&[4, 4, 4]);
    s.run(SequencerCommand::SetLoopCount { section: 2, count: 7 });

    s.run(SequencerCommand::ReorderSection { from: 2, to: 0 });
    assert_eq!(s.audio.loop_state().loop_counts, vec![7, 4, 4]);

    s.run(SequencerCommand::InsertSection {
        at: 1,
        steps: 2,
        copy_from: None,
    });
    assert_eq!(s.audio.loop_state().loop_counts, vec![7, 4, 4, 4]);

    s.run(SequencerCommand::RemoveSection(0));
    assert_eq!(s.audio.loop_state().loop_counts, vec![4, 4, 4]);
    assert_eq!(s.audio.loop_state().sequence_order, vec![0, 1, 2]);
    s.assert_quiescent();
}

#[test]
fn bpm_is_clamped_and_forwarded() {
    let mut s = Session::new(&[4]);
    s.run(SequencerCommand::SetBpm(1000));
    assert_eq!(s.state.bpm, 300);
    assert_eq!(s.engine.bpm(), 300);
}
