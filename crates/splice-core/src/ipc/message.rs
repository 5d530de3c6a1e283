//! Wire messages. Every message travels as one JSON payload inside a
//! little-endian length-prefixed frame.
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::plugin_system::plan::LoadOperation;
use crate::plugin_system::stub::PluginId;

/// Controller -> worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Apply one planned transition and reply
    LoadArtifact(LoadOperation),
    /// Call `target`'s function `index`, reply with the outcome, then shut down
    Execute {
        target: PathBuf,
        index: usize,
        table_len: usize,
    },
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::LoadArtifact(op) => write!(f, "load {}", op),
            ControlMessage::Execute { target, index, .. } => {
                write!(f, "execute {}[{}]", target.display(), index)
            }
        }
    }
}

/// Worker -> controller, one per `LoadArtifact` and one for `Execute`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    Ack,
    /// Human-readable description of what went wrong on the worker
    Error { message: String },
}

/// Client -> daemon. Missing fields fall back to the daemon's configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub plugin: Option<PluginId>,
    #[serde(default)]
    pub function: Option<String>,
}

/// Daemon -> client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecuteResponse {
    Accepted { request_id: u64 },
    Rejected { message: String },
}
