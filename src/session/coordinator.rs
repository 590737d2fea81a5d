//! Session lifecycle and endpointing
//!
//! The coordinator owns at most one recording session. Audio level samples
//! arm and disarm the endpoint action; when it fires, capture is stopped and
//! the session waits for the assistant's outcome. Success, failure and the
//! listen watchdog all converge on one cleanup path that runs exactly once
//! per session.
//!
//! All mutable state lives behind a single lock, and collaborators (assistant,
//! sink) are only called after it is released so they may call back into the
//! coordinator. Every state change that leads to a collaborator call also
//! holds the reentrant delivery lock until that call returns, so a stop for
//! one session can never be overtaken by the completion of that session, the
//! start of the next one, or teardown.

use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::config::EndpointSettings;
use crate::deferred::{ActionTicket, DeferredAction};
use crate::endpoint::LevelClass;
use crate::events::NotificationSink;

use super::assistant::{AssistantClient, RequestOutcome, SessionError, SessionId};

/// Errors returned by `trigger_session`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("session {0} is already open")]
    SessionAlreadyOpen(SessionId),

    #[error("coordinator has shut down")]
    ShutDown,
}

/// Coordinates wake triggers, endpointing and request completion
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    assistant: Arc<dyn AssistantClient>,
    sink: Arc<dyn NotificationSink>,
    settings: EndpointSettings,
    /// Held from a state change until its collaborator calls have returned
    delivery: ReentrantMutex<()>,
    state: Mutex<CoordinatorState>,
}

struct CoordinatorState {
    session: Option<Session>,
    /// Stops capture after a quiet period
    endpoint: DeferredAction,
    /// Abandons sessions the assistant never resolves
    watchdog: DeferredAction,
    /// The assistant is playing back a response
    speaking: bool,
    next_session_id: u64,
    shut_down: bool,
}

struct Session {
    id: SessionId,
    /// Cleared once capture has been stopped by the endpoint action
    capturing: bool,
    opened_at: Instant,
}

/// Completion handle for one session
///
/// Handed to the assistant when capture starts. Completing consumes the
/// listener, and outcomes for a session that is no longer current are
/// ignored.
pub struct SessionListener {
    session: SessionId,
    coordinator: Weak<Inner>,
}

impl SessionListener {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Report the request outcome; returns true if it resolved the session
    pub fn complete(self, outcome: RequestOutcome) -> bool {
        match self.coordinator.upgrade() {
            Some(inner) => inner.finish(Some(self.session), outcome),
            None => false,
        }
    }
}

impl std::fmt::Debug for SessionListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionListener")
            .field("session", &self.session)
            .finish()
    }
}

impl SessionCoordinator {
    /// Create a coordinator around a ready assistant client
    ///
    /// Countdowns are spawned on `runtime`.
    pub fn new(
        assistant: Arc<dyn AssistantClient>,
        sink: Arc<dyn NotificationSink>,
        settings: EndpointSettings,
        runtime: Handle,
    ) -> Self {
        let state = CoordinatorState {
            session: None,
            endpoint: DeferredAction::new("endpoint", runtime.clone()),
            watchdog: DeferredAction::new("listen-watchdog", runtime),
            speaking: false,
            next_session_id: 0,
            shut_down: false,
        };

        Self {
            inner: Arc::new(Inner {
                assistant,
                sink,
                settings,
                delivery: ReentrantMutex::new(()),
                state: Mutex::new(state),
            }),
        }
    }

    /// Open a new session and begin capture
    pub fn trigger_session(&self) -> Result<SessionId, CoordinatorError> {
        let _delivery = self.inner.delivery.lock();
        let opened = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return Err(CoordinatorError::ShutDown);
            }
            match state.session.as_ref().map(|s| s.id) {
                Some(open) => Err(open),
                None => {
                    let id = SessionId(state.next_session_id);
                    state.next_session_id += 1;
                    state.session = Some(Session {
                        id,
                        capturing: true,
                        opened_at: Instant::now(),
                    });
                    // Paused while the assistant is still speaking
                    if !state.speaking {
                        self.inner.arm_watchdog(&mut state, id);
                    }
                    Ok(id)
                }
            }
        };

        let id = match opened {
            Ok(id) => id,
            Err(open) => {
                warn!(session = %open, "trigger ignored, session already open");
                return Err(CoordinatorError::SessionAlreadyOpen(open));
            }
        };
        info!(session = %id, "session opened");

        self.inner.assistant.on_activity();
        self.inner.sink.interaction_started();
        self.inner.assistant.start(SessionListener {
            session: id,
            coordinator: Arc::downgrade(&self.inner),
        });

        Ok(id)
    }

    /// Feed one audio level sample from the capture subsystem
    pub fn on_audio_level(&self, level: u32) {
        let class = LevelClass::classify(level, self.inner.settings.threshold);
        let mut state = self.inner.state.lock();

        if class.interrupts_silence() {
            if state.endpoint.cancel() {
                debug!(level, %class, "endpoint action disarmed");
            }
            return;
        }

        let session = match &state.session {
            Some(session) if session.capturing => session.id,
            _ => {
                trace!(level, action = ?state.endpoint.state(), "no capturing session, sample ignored");
                return;
            }
        };

        let weak = Arc::downgrade(&self.inner);
        let armed = state
            .endpoint
            .arm(self.inner.settings.quiet_period, move |ticket| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_endpoint(session, ticket);
                }
            });
        if armed.is_some() {
            debug!(session = %session, level, "silence detected, endpoint action armed");
        }
    }

    /// The assistant reported success for the current session
    pub fn on_session_success(&self) -> bool {
        self.inner.finish(None, RequestOutcome::Success)
    }

    /// The assistant reported failure for the current session
    pub fn on_session_error(&self, cause: SessionError) -> bool {
        self.inner.finish(None, RequestOutcome::Error(cause))
    }

    /// The assistant expects a follow-up utterance
    pub fn on_expect_more_speech(&self) {
        debug!("expect-speech directive received, multi-turn not supported");
    }

    /// The assistant began playing back a response
    ///
    /// The listen watchdog is paused until playback finishes.
    pub fn on_speech_started(&self) {
        let _delivery = self.inner.delivery.lock();
        {
            let mut state = self.inner.state.lock();
            if state.speaking || state.shut_down {
                return;
            }
            state.speaking = true;
            if state.watchdog.cancel() {
                debug!("listen watchdog paused during playback");
            }
        }

        info!("assistant speech started");
        self.inner.sink.speech_started();
    }

    /// The assistant finished playing back a response
    pub fn on_speech_finished(&self) {
        let _delivery = self.inner.delivery.lock();
        {
            let mut state = self.inner.state.lock();
            if !state.speaking {
                return;
            }
            state.speaking = false;
            if let Some(id) = state.session.as_ref().map(|s| s.id) {
                self.inner.arm_watchdog(&mut state, id);
            }
        }

        info!("assistant speech finished");
        self.inner.sink.speech_finished();
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.inner.state.lock().session.as_ref().map(|s| s.id)
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.state.lock().speaking
    }

    /// Tear down: cancel pending actions and drop the session without notifying
    ///
    /// Waits for any stop already being delivered. Later triggers are
    /// rejected with `CoordinatorError::ShutDown`.
    pub fn shutdown(&self) {
        let _delivery = self.inner.delivery.lock();
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        state.speaking = false;
        state.endpoint.cancel();
        state.watchdog.cancel();
        match state.session.take() {
            Some(session) => info!(session = %session.id, "session dropped on shutdown"),
            None => debug!("coordinator shut down"),
        }
    }
}

impl Inner {
    fn arm_watchdog(self: &Arc<Self>, state: &mut CoordinatorState, id: SessionId) {
        let weak = Arc::downgrade(self);
        state
            .watchdog
            .arm(self.settings.listen_timeout, move |ticket| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_listen_timeout(id, ticket);
                }
            });
    }

    /// Endpoint action elapsed: stop capture, keep the session open
    fn on_endpoint(&self, id: SessionId, ticket: ActionTicket) {
        let _delivery = self.delivery.lock();
        {
            let mut state = self.state.lock();
            if !state.endpoint.claim(ticket) {
                return;
            }
            match state.session.as_mut() {
                Some(session) if session.id == id && session.capturing => {
                    session.capturing = false;
                }
                _ => return,
            }
        }

        self.assistant.stop(id);
        info!(
            session = %id,
            quiet_ms = self.settings.quiet_period.as_millis() as u64,
            "endpoint reached, capture stopped"
        );
    }

    /// Listen watchdog elapsed: abandon the session as an error
    fn on_listen_timeout(&self, id: SessionId, ticket: ActionTicket) {
        let _delivery = self.delivery.lock();
        let capturing = {
            let mut state = self.state.lock();
            if !state.watchdog.claim(ticket) {
                return;
            }
            match state.session.as_mut() {
                Some(session) if session.id == id => {
                    std::mem::replace(&mut session.capturing, false)
                }
                _ => return,
            }
        };

        if capturing {
            self.assistant.stop(id);
        }
        let timeout = self.settings.listen_timeout;
        self.finish(
            Some(id),
            RequestOutcome::Error(SessionError::ListenTimeout(timeout)),
        );
    }

    /// Resolve a session (`None` = whichever is current)
    ///
    /// Returns false if there was nothing to resolve.
    fn finish(&self, target: Option<SessionId>, outcome: RequestOutcome) -> bool {
        let _delivery = self.delivery.lock();
        let session = {
            let mut state = self.state.lock();
            let matches = match (&state.session, target) {
                (Some(session), Some(id)) => session.id == id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !matches {
                debug!(?target, ?outcome, "outcome for inactive session ignored");
                return false;
            }
            state.endpoint.cancel();
            state.watchdog.cancel();
            state.session.take()
        };
        let Some(session) = session else {
            return false;
        };

        let duration_ms = session.opened_at.elapsed().as_millis() as u64;
        match &outcome {
            RequestOutcome::Success => {
                info!(session = %session.id, duration_ms, "interaction succeeded");
            }
            RequestOutcome::Error(e) => {
                warn!(session = %session.id, duration_ms, error = %e, "interaction failed");
            }
        }

        self.assistant.finished();
        self.sink.interaction_completed();
        true
    }
}
