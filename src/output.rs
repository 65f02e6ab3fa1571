//! Output text buffer driven by committed actions

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alphabet::Action;

const SEARCH_BASE_URL: &str = "https://www.google.com/search?q=";

/// A search handed off to whatever hosts the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub url: String,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        let url = format!("{}{}", SEARCH_BASE_URL, encode_query(&query));
        Self { query, url }
    }
}

/// Applies committed actions to an output
pub trait ActionExecutor {
    /// Apply one action, returning a search request when the action asks for one
    fn execute(&mut self, action: Action) -> Option<SearchRequest>;

    /// Current output text
    fn text(&self) -> &str;

    /// Empty the output
    fn clear(&mut self);
}

/// In-memory output text
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActionExecutor for TextBuffer {
    fn execute(&mut self, action: Action) -> Option<SearchRequest> {
        match action {
            Action::AppendLetter(c) => {
                self.text.push(c);
                None
            }
            Action::ClearOutput => {
                self.text.clear();
                None
            }
            Action::TriggerSearch => {
                let query = self.text.trim();
                if query.is_empty() {
                    debug!("search requested with empty output, ignoring");
                    return None;
                }
                Some(SearchRequest::new(query))
            }
        }
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn clear(&mut self) {
        self.text.clear();
    }
}

/// Percent-encode a query string for use in a URL
fn encode_query(query: &str) -> String {
    let mut encoded = String::with_capacity(query.len());
    for byte in query.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b' ' => encoded.push('+'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_clear() {
        let mut buf = TextBuffer::new();
        assert!(buf.execute(Action::AppendLetter('H')).is_none());
        buf.execute(Action::AppendLetter('I'));
        assert_eq!(buf.text(), "HI");

        buf.execute(Action::ClearOutput);
        assert_eq!(buf.text(), "");
    }

    #[test]
    fn test_search_keeps_text() {
        let mut buf = TextBuffer::new();
        for c in "CAT".chars() {
            buf.execute(Action::AppendLetter(c));
        }
        let request = buf.execute(Action::TriggerSearch).unwrap();
        assert_eq!(request.query, "CAT");
        assert_eq!(request.url, "https://www.google.com/search?q=CAT");
        assert_eq!(buf.text(), "CAT");
    }

    #[test]
    fn test_search_on_empty_output() {
        let mut buf = TextBuffer::new();
        assert!(buf.execute(Action::TriggerSearch).is_none());
    }

    #[test]
    fn test_encode_query() {
        assert_eq!(encode_query("sign language"), "sign+language");
        assert_eq!(encode_query("a&b"), "a%26b");
    }
}
