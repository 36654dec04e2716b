use std::path::{Path, PathBuf};

use serde::Deserialize;
use stepper_audio::handle::AudioSettings;
use stepper_types::limits::{
    clamp_bpm, clamp_loops, DEFAULT_BPM, DEFAULT_SECTION_LOOPS, DEFAULT_SECTION_STEPS, MAX_STEPS,
};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

const DEFAULT_UNDO_DEPTH: usize = 100;
const MAX_UNDO_DEPTH: usize = 10_000;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    limits: LimitsConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    bpm: Option<u32>,
    section_steps: Option<usize>,
    section_loops: Option<u32>,
    stop_at_end: Option<bool>,
}

#[derive(Deserialize, Default)]
struct LimitsConfig {
    max_steps: Option<usize>,
    undo_depth: Option<usize>,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    lock_budget_us: Option<u32>,
    consistency_checks: Option<bool>,
}

/// Defaults for a new project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerDefaults {
    pub bpm: u32,
    pub section_steps: usize,
    pub section_loops: u32,
    pub stop_at_end: bool,
}

pub struct Config {
    defaults: DefaultsConfig,
    limits: LimitsConfig,
    runtime: RuntimeConfig,
}

impl Config {
    /// Embedded defaults merged with the user's config file, if any.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::embedded(),
        }
    }

    /// Embedded defaults merged with the file at `path`. A missing file is
    /// not an error; an unreadable or malformed one is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::embedded();
        if !path.exists() {
            return config;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => config.merge(user),
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    fn embedded() -> Self {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });
        Config {
            defaults: base.defaults,
            limits: base.limits,
            runtime: base.runtime,
        }
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_defaults(&mut self.defaults, user.defaults);
        merge_limits(&mut self.limits, user.limits);
        merge_runtime(&mut self.runtime, user.runtime);
    }

    pub fn defaults(&self) -> SequencerDefaults {
        SequencerDefaults {
            bpm: clamp_bpm(self.defaults.bpm.unwrap_or(DEFAULT_BPM)),
            section_steps: self
                .defaults
                .section_steps
                .unwrap_or(DEFAULT_SECTION_STEPS)
                .clamp(1, self.max_steps()),
            section_loops: clamp_loops(self.defaults.section_loops.unwrap_or(DEFAULT_SECTION_LOOPS)),
            stop_at_end: self.defaults.stop_at_end.unwrap_or(false),
        }
    }

    /// Table row capacity (clamped to 1..=MAX_STEPS).
    pub fn max_steps(&self) -> usize {
        self.limits.max_steps.unwrap_or(MAX_STEPS).clamp(1, MAX_STEPS)
    }

    pub fn undo_depth(&self) -> usize {
        self.limits
            .undo_depth
            .unwrap_or(DEFAULT_UNDO_DEPTH)
            .clamp(1, MAX_UNDO_DEPTH)
    }

    pub fn audio_settings(&self) -> AudioSettings {
        let fallback = AudioSettings::default();
        let defaults = self.defaults();
        AudioSettings {
            lock_budget_us: self.runtime.lock_budget_us.unwrap_or(fallback.lock_budget_us).max(1),
            consistency_checks: self
                .runtime
                .consistency_checks
                .unwrap_or(fallback.consistency_checks),
            default_loops: defaults.section_loops,
            stop_at_end: defaults.stop_at_end,
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stepper").join("config.toml"))
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.section_steps.is_some() {
        base.section_steps = user.section_steps;
    }
    if user.section_loops.is_some() {
        base.section_loops = user.section_loops;
    }
    if user.stop_at_end.is_some() {
        base.stop_at_end = user.stop_at_end;
    }
}

fn merge_limits(base: &mut LimitsConfig, user: LimitsConfig) {
    if user.max_steps.is_some() {
        base.max_steps = user.max_steps;
    }
    if user.undo_depth.is_some() {
        base.undo_depth = user.undo_depth;
    }
}

fn merge_runtime(base: &mut RuntimeConfig, user: RuntimeConfig) {
    if user.lock_budget_us.is_some() {
        base.lock_budget_us = user.lock_budget_us;
    }
    if user.consistency_checks.is_some() {
        base.consistency_checks = user.consistency_checks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_embedded_config() {
        let config = Config::embedded();
        let defaults = config.defaults();
        assert_eq!(defaults.bpm, 120);
        assert_eq!(defaults.section_steps, 16);
        assert_eq!(defaults.section_loops, 4);
        assert!(!defaults.stop_at_end);
        assert_eq!(config.max_steps(), 2048);
        assert_eq!(config.undo_depth(), 100);
        let audio = config.audio_settings();
        assert_eq!(audio.lock_budget_us, 1000);
        assert!(audio.consistency_checks);
    }

    #[test]
    fn test_user_file_overrides_field_by_field() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[defaults]\nbpm = 90\n\n[runtime]\nconsistency_checks = false").unwrap();
        let config = Config::load_from(file.path());
        assert_eq!(config.defaults().bpm, 90);
        assert_eq!(config.defaults().section_steps, 16);
        assert!(!config.audio_settings().consistency_checks);
        assert_eq!(config.audio_settings().lock_budget_us, 1000);
    }

    #[test]
    fn test_values_are_clamped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[defaults]\nbpm = 999\nsection_loops = 0\nsection_steps = 5000\n\n[limits]\nmax_steps = 64"
        )
        .unwrap();
        let config = Config::load_from(file.path());
        let defaults = config.defaults();
        assert_eq!(defaults.bpm, 300);
        assert_eq!(defaults.section_loops, 1);
        assert_eq!(config.max_steps(), 64);
        assert_eq!(defaults.section_steps, 64);
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[defaults\nbpm = ").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.defaults().bpm, 120);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml"));
        assert_eq!(config.undo_depth(), 100);
    }
}
