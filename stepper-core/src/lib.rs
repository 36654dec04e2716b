//! # stepper-core
//!
//! State ownership and command dispatch for the step sequencer. Owns the cell
//! table, the sample bank and the undo history; drives the engine through
//! `stepper_audio::AudioHandle`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stepper_audio::engine::{SharedTestEngine, TestEngine};
//! use stepper_audio::AudioHandle;
//! use stepper_core::config::Config;
//! use stepper_core::dispatch::dispatch_command;
//! use stepper_core::state::AppState;
//! use stepper_types::SequencerCommand;
//!
//! let config = Config::load();
//! let mut state = AppState::from_config(&config);
//! let engine = Arc::new(TestEngine::new());
//! let mut audio = AudioHandle::with_settings(
//!     Box::new(SharedTestEngine(engine)),
//!     config.audio_settings(),
//! );
//! audio.attach(&state)?;
//!
//! dispatch_command(&SequencerCommand::InsertStep { section: 0, at: 4 }, &mut state, &mut audio)?;
//! audio.poll();
//! ```
//!
//! ## Module Overview
//!
//! - [`state`] — `AppState` and the undo history
//! - [`dispatch`] — `dispatch_command()`, the single entry point for mutation.
//!   Pushes undo snapshots and drives the edit protocol for structural edits.
//! - [`config`] — TOML configuration (embedded defaults + user override)

pub mod config;
pub mod dispatch;
pub mod state;
