// Probe Outcome & Protocol

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::application::constants::NO_MESSAGE_PLACEHOLDER;

/// Execution discipline a probe follows to report completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Returns a value or throws before evaluation ends
    Sync,
    /// Signals through the injected pass/fail callbacks
    Async,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Sync => write!(f, "SYNC"),
            Protocol::Async => write!(f, "ASYNC"),
        }
    }
}

/// Classified result of running one probe
///
/// Serializes to the compat-table document shape: `true`, `false` or the
/// error message string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
    ErrorMessage(String),
}

impl Outcome {
    /// Truthy return value passes, anything else fails
    pub fn from_truthiness(truthy: bool) -> Self {
        if truthy {
            Outcome::Pass
        } else {
            Outcome::Fail
        }
    }

    /// Thrown value without a message gets the placeholder text
    pub fn from_thrown(message: Option<String>) -> Self {
        Outcome::ErrorMessage(message.unwrap_or_else(|| NO_MESSAGE_PLACEHOLDER.to_string()))
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail => write!(f, "FAIL"),
            Outcome::ErrorMessage(msg) => write!(f, "ERROR({})", msg),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Pass => serializer.serialize_bool(true),
            Outcome::Fail => serializer.serialize_bool(false),
            Outcome::ErrorMessage(msg) => serializer.serialize_str(msg),
        }
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Message(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(flag) => Outcome::from_truthiness(flag),
            Raw::Message(msg) => Outcome::ErrorMessage(msg),
        })
    }
}
