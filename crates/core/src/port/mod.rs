// Port Layer - Interfaces for external dependencies

pub mod script_engine;

// Re-exports
pub use script_engine::mocks;
pub use script_engine::{
    AsyncCallbacks, CompletionSignal, EvalContext, ScriptEngine, ScriptError, ScriptValue,
};
