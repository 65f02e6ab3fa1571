//! Classification feed for the commit state machine
//!
//! Reads one classifier result per line from a byte stream (stdin in
//! the daemon) on a dedicated thread and forwards it as a frame.

mod reader;

pub use reader::{ClassificationFeed, RawFrame};
