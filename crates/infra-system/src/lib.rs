// Compat Table Infrastructure - System Adapters
// Implements: ScriptEngine over an external JavaScript shell

pub mod driver;
pub mod prelude;
pub mod subprocess_engine;

pub use prelude::COMPAT_PRELUDE;
pub use subprocess_engine::{EngineConfig, SubprocessEngine};
