//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications to
//! subscribed clients. Display clients subscribe to lifecycle events; the
//! assistant peer subscribes separately to assistant commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandAction, CommandMap};
use crate::events::{BroadcastSink, MirrorEvent, NotificationSink};
use crate::registration::RegistrationFlow;
use crate::session::{
    AssistantCommand, BridgedAssistant, CoordinatorError, RequestOutcome, SessionCoordinator,
    SessionError,
};

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// Components the server dispatches requests to
pub struct ServerContext {
    coordinator: SessionCoordinator,
    bridge: Arc<BridgedAssistant>,
    registration: RegistrationFlow,
    commands: CommandMap,
    events: BroadcastSink,
    start_time: Instant,
}

impl ServerContext {
    pub fn new(
        coordinator: SessionCoordinator,
        bridge: Arc<BridgedAssistant>,
        registration: RegistrationFlow,
        commands: CommandMap,
        events: BroadcastSink,
    ) -> Self {
        Self {
            coordinator,
            bridge,
            registration,
            commands,
            events,
            start_time: Instant::now(),
        }
    }
}

/// Per-client notification feeds
#[derive(Default)]
struct Subscription {
    /// Lifecycle events, after `subscribe`
    events: Option<broadcast::Receiver<MirrorEvent>>,
    /// Assistant commands, after `subscribe_assistant`
    commands: Option<broadcast::Receiver<AssistantCommand>>,
}

impl Subscription {
    /// Next notification; pending forever while nothing is subscribed
    async fn next(&mut self) -> Notification {
        loop {
            tokio::select! {
                result = recv(&mut self.events) => match result {
                    Ok(event) => return Notification::Event { event },
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "event subscriber lagged"),
                    Err(RecvError::Closed) => self.events = None,
                },
                result = recv(&mut self.commands) => match result {
                    Ok(command) => return Notification::Assistant { command },
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "assistant peer lagged"),
                    Err(RecvError::Closed) => self.commands = None,
                },
            }
        }
    }
}

async fn recv<T: Clone>(rx: &mut Option<broadcast::Receiver<T>>) -> Result<T, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Aborts the request reader when its client handler goes away
struct ReaderGuard(AbortHandle);

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket and create the server
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
            listener,
            context: Arc::new(context),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
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
    async fn handle_client(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();

        // Frames are read on their own task so a pushed notification never
        // interrupts a partially read request.
        let (request_tx, mut request_rx) = mpsc::channel(16);
        let reader_task = tokio::spawn(Self::read_requests(reader, request_tx));
        let _reader_guard = ReaderGuard(reader_task.abort_handle());

        let mut subscription = Subscription::default();

        loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    debug!(?request, "received request");

                    let response = match request {
                        Request::Subscribe => {
                            subscription.events = Some(context.events.subscribe());
                            debug!("client subscribed to events");
                            Response::Subscribed
                        }
                        Request::SubscribeAssistant => {
                            subscription.commands = Some(context.bridge.subscribe());
                            info!("assistant peer attached");
                            Response::Subscribed
                        }
                        other => Self::process_request(other, &context).await,
                    };
                    Self::send_message(&mut writer, &response).await?;
                }

                notification = subscription.next() => {
                    Self::send_message(&mut writer, &notification).await?;
                }
            }
        }

        reader_task.await.context("request reader panicked")?
    }

    /// Read length-prefixed requests until EOF
    async fn read_requests(mut reader: OwnedReadHalf, request_tx: mpsc::Sender<Request>) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            let request: Request =
                serde_json::from_slice(&msg_buf).context("failed to parse request")?;

            if request_tx.send(request).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(request: Request, context: &ServerContext) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let code = context.registration.registration_code();
                let session_id = context.coordinator.current_session();
                Response::Status(DaemonStatus {
                    registered: context.registration.is_registered(),
                    registration_code: Some(code.code.clone()),
                    registration_url: Some(code.url.clone()),
                    session_open: session_id.is_some(),
                    session_id,
                    speaking: context.coordinator.is_speaking(),
                    uptime_secs: context.start_time.elapsed().as_secs(),
                    ..DaemonStatus::default()
                })
            }

            Request::Subscribe | Request::SubscribeAssistant => Response::Subscribed,

            Request::Trigger => Self::trigger(context),

            Request::Command { phrase } => match context.commands.resolve(&phrase) {
                Some(CommandAction::Trigger) => Self::trigger(context),
                Some(CommandAction::SendNotification {
                    notification,
                    payload,
                }) => {
                    context.events.display_notification(notification, payload);
                    Response::Accepted
                }
                None => {
                    debug!(%phrase, "unrecognised command");
                    Response::error("unknown_command", format!("no action bound to '{}'", phrase))
                }
            },

            Request::AudioLevel { level } => {
                context.coordinator.on_audio_level(level);
                Response::Accepted
            }

            Request::RequestSucceeded => Self::complete(context, RequestOutcome::Success),

            Request::RequestFailed { cause } => Self::complete(
                context,
                RequestOutcome::Error(SessionError::Request(cause)),
            ),

            Request::ExpectSpeech => {
                context.coordinator.on_expect_more_speech();
                Response::Accepted
            }

            Request::SpeechStarted => {
                context.coordinator.on_speech_started();
                Response::Accepted
            }

            Request::SpeechFinished => {
                context.coordinator.on_speech_finished();
                Response::Accepted
            }

            Request::RegisterDevice => match context.registration.register_device().await {
                Ok(_) => Response::Registered,
                Err(e) => {
                    let message = match std::error::Error::source(&e) {
                        Some(source) => format!("{}: {}", e, source),
                        None => e.to_string(),
                    };
                    Response::error("registration_failed", message)
                }
            },
        }
    }

    fn trigger(context: &ServerContext) -> Response {
        if !context.registration.is_registered() {
            return Response::error("not_registered", "device is not registered yet");
        }
        match context.coordinator.trigger_session() {
            Ok(session_id) => Response::SessionStarted { session_id },
            Err(e @ CoordinatorError::SessionAlreadyOpen(_)) => {
                Response::error("session_already_open", e.to_string())
            }
            Err(e @ CoordinatorError::ShutDown) => Response::error("shut_down", e.to_string()),
        }
    }

    fn complete(context: &ServerContext, outcome: RequestOutcome) -> Response {
        if context.bridge.complete(outcome) {
            Response::Accepted
        } else {
            Response::error("no_session", "no request is pending")
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
