//! Line-oriented classification reader
//!
//! Each line is a JSON frame: `{"label":"A","confidence":0.8}`, or
//! `null` / `{}` / an empty line when no hand was detected. Runs on a
//! dedicated thread because reads from stdin block.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::alphabet::Classification;
use crate::state::Input;

/// A classifier result as it arrives on the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFrame {
    /// Absent when no hand was detected
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

impl RawFrame {
    /// Convert to a frame for the state machine.
    ///
    /// Labels outside the alphabet are logged and count as no classification.
    pub fn into_frame(self) -> Option<Classification> {
        let label = self.label?;
        match Classification::parse(&label, self.confidence) {
            Ok(classification) => Some(classification),
            Err(e) => {
                warn!(%label, confidence = self.confidence, error = %e, "unusable classification");
                None
            }
        }
    }
}

/// Reads classifier frames and sends them to the state machine
pub struct ClassificationFeed {
    input_tx: mpsc::Sender<Input>,
    running: Arc<AtomicBool>,
}

impl ClassificationFeed {
    /// Create a new classification feed
    pub fn new(input_tx: mpsc::Sender<Input>) -> Self {
        Self {
            input_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start reading frames from stdin
    pub fn start(&self) -> Result<(), FeedError> {
        self.start_with_reader(std::io::BufReader::new(std::io::stdin()))
    }

    /// Start reading frames from an arbitrary reader
    ///
    /// This spawns a dedicated thread that reads until end of input or
    /// until `stop()` is called.
    pub fn start_with_reader<R>(&self, reader: R) -> Result<(), FeedError>
    where
        R: BufRead + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(FeedError::AlreadyRunning);
        }

        let input_tx = self.input_tx.clone();
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("classification-feed".to_string())
            .spawn(move || {
                info!("classification feed thread started");

                if let Err(e) = read_frames(reader, &input_tx, &running) {
                    error!(?e, "classification feed error");
                }

                let _ = input_tx.blocking_send(Input::SourceClosed);
                running.store(false, Ordering::SeqCst);
                info!("classification feed thread stopped");
            })
            .map_err(|e| FeedError::ThreadSpawn(e.to_string()))?;

        Ok(())
    }

    /// Stop the feed after the current line
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the feed is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the classification feed
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("classification feed is already running")]
    AlreadyRunning,

    #[error("failed to spawn feed thread: {0}")]
    ThreadSpawn(String),

    #[error("failed to read frame: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("failed to send frame to channel")]
    ChannelSend,
}

/// Parse a single line into a frame
fn parse_line(line: &str) -> Result<Option<Classification>, FeedError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let raw: Option<RawFrame> = serde_json::from_str(line)?;
    Ok(raw.and_then(RawFrame::into_frame))
}

fn read_frames<R: BufRead>(
    reader: R,
    input_tx: &mpsc::Sender<Input>,
    running: &AtomicBool,
) -> Result<(), FeedError> {
    for line in reader.lines() {
        if !running.load(Ordering::SeqCst) {
            debug!("feed stopped, discarding remaining input");
            break;
        }

        let line = line?;
        let frame = match parse_line(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "skipping malformed frame");
                continue;
            }
        };

        input_tx
            .blocking_send(Input::Frame(frame))
            .map_err(|_| FeedError::ChannelSend)?;
    }

    Ok(())
}
