// Compat Table Core - Harness Logic, Domain Model & Engine Port
// NO process or file-system dependencies: engines are plugged in through `port::ScriptEngine`

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::HarnessConfig;
pub use error::{HarnessError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
