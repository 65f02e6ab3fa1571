//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications for
//! commit events to subscribed clients.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::events::CommitEvent;
use crate::feed::RawFrame;
use crate::state::{Input, MachineStatus};

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Handles shared by every client connection
#[derive(Clone)]
pub struct ServerContext {
    start_time: Instant,
    /// Latest state machine snapshot
    status_rx: watch::Receiver<MachineStatus>,
    /// Frames and resets forwarded to the state machine
    input_tx: mpsc::Sender<Input>,
    /// Source of commit events for subscribers
    event_tx: broadcast::Sender<CommitEvent>,
}

impl ServerContext {
    pub fn new(
        status_rx: watch::Receiver<MachineStatus>,
        input_tx: mpsc::Sender<Input>,
        event_tx: broadcast::Sender<CommitEvent>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            status_rx,
            input_tx,
            event_tx,
        }
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    context: ServerContext,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, context: ServerContext) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            context,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = self.context.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Responses and notifications share one writer task so a subscribed
    /// client can keep sending requests.
    async fn handle_client(stream: UnixStream, context: ServerContext) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(64);

        let writer_task = tokio::spawn(async move {
            while let Some(bytes) = out_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &bytes).await {
                    debug!(?e, "client write failed");
                    break;
                }
            }
        });

        let mut forwarder: Option<tokio::task::JoinHandle<()>> = None;

        let result = async {
            while let Some(body) = read_frame(&mut reader).await? {
                let request: Request =
                    serde_json::from_slice(&body).context("failed to parse request")?;

                debug!(?request, "received request");

                let (response, subscribe) = Self::process_request(request, &context).await;
                if subscribe && forwarder.is_none() {
                    debug!("client subscribed to notifications");
                    forwarder = Some(tokio::spawn(forward_events(
                        context.event_tx.subscribe(),
                        out_tx.clone(),
                    )));
                }

                if out_tx.send(serde_json::to_vec(&response)?).await.is_err() {
                    break;
                }
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        drop(out_tx);
        let _ = writer_task.await;

        result
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, context: &ServerContext) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let status = DaemonStatus {
                    uptime_secs: context.start_time.elapsed().as_secs(),
                    machine: context.status_rx.borrow().clone(),
                    ..DaemonStatus::default()
                };
                (Response::Status(status), false)
            }

            Request::Classify { label, confidence } => {
                let frame = RawFrame {
                    label: Some(label),
                    confidence,
                }
                .into_frame();
                let recognized = frame.is_some();
                (Self::forward(context, Input::Frame(frame), recognized).await, false)
            }

            Request::HandLost => (Self::forward(context, Input::Frame(None), true).await, false),

            Request::Reset => {
                info!("reset requested via IPC");
                (Self::forward(context, Input::Reset, true).await, false)
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    async fn forward(context: &ServerContext, input: Input, recognized: bool) -> Response {
        match context.input_tx.send(input).await {
            Ok(()) => Response::Accepted { recognized },
            Err(_) => Response::Error {
                code: "unavailable".to_string(),
                message: "commit state machine is not running".to_string(),
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Push commit events to a subscribed client until it disconnects
async fn forward_events(
    mut event_rx: broadcast::Receiver<CommitEvent>,
    out_tx: mpsc::Sender<Vec<u8>>,
) {
    loop {
        let notification = match event_rx.recv().await {
            Ok(event) => Notification::CommitEvent { event },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "subscriber lagged");
                Notification::Lagged { skipped }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let bytes = match serde_json::to_vec(&notification) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(?e, "failed to encode notification");
                continue;
            }
        };
        if out_tx.send(bytes).await.is_err() {
            break;
        }
    }
}

/// Read one length-prefixed message; `None` on clean disconnect
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            debug!("client disconnected");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Write one length-prefixed message
async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<()> {
    let len = (body.len() as u32).to_le_bytes();
    writer.write_all(&len).await?;
    writer.write_all(body).await?;
    Ok(())
}
