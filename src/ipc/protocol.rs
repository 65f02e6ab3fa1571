//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::CommitEvent;
use crate::state::MachineStatus;

/// Requests from clients to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Submit one classifier frame
    Classify { label: String, confidence: f32 },

    /// Report that no hand is visible
    HandLost,

    /// Abort any open window and clear the output
    Reset,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to commit event notifications
    Subscribe,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Frame or reset forwarded to the state machine
    Accepted {
        /// False when the label was not part of the alphabet
        recognized: bool,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Commit event occurred
    CommitEvent { event: CommitEvent },

    /// Events were dropped because the client fell behind
    Lagged { skipped: u64 },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Commit state machine snapshot
    #[serde(flatten)]
    pub machine: MachineStatus,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: 0,
            machine: MachineStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Label;

    #[test]
    fn test_request_serialization() {
        let req = Request::Classify {
            label: "A".to_string(),
            confidence: 0.75,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("classify"));
        assert!(json.contains("0.75"));
    }

    #[test]
    fn test_request_deserialization() {
        let req: Request = serde_json::from_str(r#"{"type":"hand_lost"}"#).unwrap();
        assert_eq!(req, Request::HandLost);
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("\"phase\":\"idle\""));
    }

    #[test]
    fn test_notification_serialization() {
        let note = Notification::CommitEvent {
            event: CommitEvent::WindowOpened {
                label: Label::Letter('A'),
            },
        };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("commit_event"));
        assert!(json.contains("window_opened"));
    }
}
