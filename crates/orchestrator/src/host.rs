//! Runtime execution-mode contract.
//!
//! Switching into [`RuntimeMode::Capture`] restarts the runtime and wipes
//! all in-memory state. The host performs the switch; the orchestrator only
//! requests it after persisting everything it needs to continue.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Authoring mode; captures cannot run.
    Edit,
    /// Capture-capable mode.
    Capture,
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeMode::Edit => f.write_str("edit"),
            RuntimeMode::Capture => f.write_str("capture"),
        }
    }
}

/// The process hosting the scene.
pub trait RuntimeHost: Send {
    fn current_mode(&self) -> RuntimeMode;

    /// Ask the host to switch modes. The switch may happen after this call
    /// returns, and may restart the process.
    fn request_mode(&mut self, mode: RuntimeMode);
}
