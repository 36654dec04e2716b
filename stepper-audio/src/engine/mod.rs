pub mod backend;
pub mod test_engine;

pub use backend::{EngineLock, EngineResult, PatternEngine, PatternEvent, PatternId, PatternLoop};
pub use test_engine::{EngineOp, EngineQuirks, PatternInfo, SharedTestEngine, TestEngine};
