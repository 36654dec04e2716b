pub mod continuity;
pub mod convert;
pub mod engine;
pub mod handle;
pub mod looping;
pub mod monitor;
pub mod sync;
pub mod telemetry;
pub mod timeline;
pub mod voices;

pub use engine::{EngineLock, PatternEngine, PatternEvent, PatternId, PatternLoop};
pub use handle::AudioHandle;
pub use monitor::PlaybackMonitor;
pub use voices::VoiceProvider;

use stepper_types::TableState;

/// Trait for types that provide the table and sample state needed by the
/// sync engine. Implemented by `AppState` in stepper-core to break the
/// circular dependency.
pub trait SyncStateProvider {
    fn table(&self) -> &TableState;
    fn voices(&self) -> &dyn VoiceProvider;
}
