//! Headless driver: runs a scripted editing session against the in-memory
//! engine and prints the resulting engine layout.

use std::sync::Arc;

use stepper_audio::engine::{SharedTestEngine, TestEngine};
use stepper_audio::AudioHandle;
use stepper_core::config::Config;
use stepper_core::dispatch::dispatch_command;
use stepper_core::state::AppState;
use stepper_types::{Cell, PlaybackMode, SequencerCommand};

fn init_logging(verbose: bool) {
    use simplelog::{ColorChoice, LevelFilter, SimpleLogger, TermLogger, TerminalMode};

    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let config = simplelog::Config::default();
    if TermLogger::init(level, config.clone(), TerminalMode::Stderr, ColorChoice::Auto).is_err() {
        let _ = SimpleLogger::init(level, config);
    }
}

fn script(state: &AppState) -> Vec<SequencerCommand> {
    let steps = state.table.sections().total_steps();
    let mut commands = vec![SequencerCommand::LoadSample {
        slot: 0,
        name: "kick".to_string(),
        voice: 1,
    }];
    for step in (0..steps).step_by(4) {
        commands.push(SequencerCommand::SetCell {
            step,
            col: 0,
            cell: Cell::with_sample(0),
        });
    }
    commands.extend([
        SequencerCommand::AppendSection {
            steps,
            copy_from: Some(0),
        },
        SequencerCommand::AppendSection {
            steps,
            copy_from: None,
        },
        SequencerCommand::SetLoopCount { section: 0, count: 2 },
        SequencerCommand::Play { from_step: 0 },
    ]);
    commands
}

fn edits_while_playing() -> Vec<SequencerCommand> {
    vec![
        SequencerCommand::DeleteStep { section: 0, at: 1 },
        SequencerCommand::InsertStep { section: 1, at: 0 },
        SequencerCommand::SetMode {
            mode: PlaybackMode::SingleLoop,
            section: 1,
        },
        SequencerCommand::SetSectionSteps { section: 1, steps: 8 },
        SequencerCommand::SetMode {
            mode: PlaybackMode::Sequence,
            section: 1,
        },
        SequencerCommand::SwitchToSection(2),
        SequencerCommand::SetSectionMuted {
            section: 0,
            muted: true,
        },
        SequencerCommand::Undo,
        SequencerCommand::Redo,
    ]
}

fn run(state: &mut AppState, audio: &mut AudioHandle, engine: &TestEngine, commands: &[SequencerCommand]) {
    for cmd in commands {
        if let Err(e) = dispatch_command(cmd, state, audio) {
            eprintln!("{:?}: {}", cmd, e);
        }
        engine.advance(3);
        let snapshot = audio.poll();
        println!(
            "{:<48} line {:>4}  section {}  iteration {}",
            format!("{:?}", cmd),
            snapshot.line,
            snapshot.section,
            snapshot.iteration
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let verbose = std::env::args().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = Config::load();
    let mut state = AppState::from_config(&config);
    let engine = Arc::new(TestEngine::new());
    let mut audio = AudioHandle::with_settings(
        Box::new(SharedTestEngine(Arc::clone(&engine))),
        config.audio_settings(),
    );
    audio.attach(&state)?;

    let setup = script(&state);
    run(&mut state, &mut audio, &engine, &setup);
    run(&mut state, &mut audio, &engine, &edits_while_playing());
    run(&mut state, &mut audio, &engine, &[SequencerCommand::Stop]);

    audio.verify_bindings(&state.table)?;
    for event in audio.drain_feedback() {
        log::info!(target: "headless", "{:?}", event);
    }
    println!("{}", audio.debug_dump()?);
    if engine.unlocked_mutations() > 0 {
        log::warn!(target: "headless", "{} engine mutations ran unlocked", engine.unlocked_mutations());
    }
    Ok(())
}
