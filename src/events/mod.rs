//! Events module for commit window transitions
//!
//! Provides structured event types for window open/restart/abort,
//! committed actions and the output changes they cause.

use serde::{Deserialize, Serialize};

use crate::alphabet::{Action, Label};

/// Events emitted by the commit state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommitEvent {
    /// A confident sign opened a dwell window
    WindowOpened { label: Label },

    /// A different confident sign restarted the dwell window
    WindowRestarted { from: Label, to: Label },

    /// The hand was lost or a reset arrived before the dwell completed
    WindowAborted {
        label: Label,
        /// Votes discarded with the window
        votes: usize,
    },

    /// The dwell completed and the majority sign was committed
    Committed {
        label: Label,
        action: Action,
        votes: usize,
        /// Time from window open to commit
        elapsed_ms: u64,
    },

    /// The output text changed
    OutputChanged { text: String },

    /// A search was requested for the output text
    SearchRequested { query: String, url: String },
}

impl std::fmt::Display for CommitEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitEvent::WindowOpened { label } => write!(f, "WINDOW_OPENED ({})", label),
            CommitEvent::WindowRestarted { from, to } => {
                write!(f, "WINDOW_RESTARTED ({} -> {})", from, to)
            }
            CommitEvent::WindowAborted { label, votes } => {
                write!(f, "WINDOW_ABORTED ({}, {} votes)", label, votes)
            }
            CommitEvent::Committed {
                label, elapsed_ms, ..
            } => write!(f, "COMMITTED ({} after {}ms)", label, elapsed_ms),
            CommitEvent::OutputChanged { text } => write!(f, "OUTPUT_CHANGED ({:?})", text),
            CommitEvent::SearchRequested { query, .. } => {
                write!(f, "SEARCH_REQUESTED ({:?})", query)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CommitEvent::Committed {
            label: Label::Letter('A'),
            action: Action::AppendLetter('A'),
            votes: 4,
            elapsed_ms: 3_050,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("committed"));
        assert!(json.contains("\"A\""));
        assert!(json.contains("3050"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"window_restarted","from":"A","to":"CLEAR"}"#;
        let event: CommitEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            CommitEvent::WindowRestarted {
                from: Label::Letter('A'),
                to: Label::Clear,
            }
        );
    }

    #[test]
    fn test_event_display() {
        let event = CommitEvent::WindowAborted {
            label: Label::Search,
            votes: 2,
        };
        assert_eq!(event.to_string(), "WINDOW_ABORTED (SEARCH, 2 votes)");
    }
}
