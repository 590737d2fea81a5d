//! Test doubles for the external collaborators

use std::sync::{Arc, Barrier};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::events::{MirrorEvent, NotificationSink};
use crate::registration::{AuthError, Authenticator};
use crate::session::{
    AssistantClient, RequestOutcome, SessionError, SessionId, SessionListener,
};

/// A call recorded by `FakeAssistant`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantCall {
    Start(SessionId),
    Stop(SessionId),
    Finished,
    Activity,
    AccessToken(String),
}

/// Assistant client that records calls and keeps the pending listener
#[derive(Default)]
pub struct FakeAssistant {
    calls: Mutex<Vec<AssistantCall>>,
    listener: Mutex<Option<SessionListener>>,
    fail_on_start: Option<String>,
    /// `stop` meets this barrier twice: once on entry, once before returning
    stop_gate: Option<Arc<Barrier>>,
}

impl FakeAssistant {
    /// An assistant that rejects every request as soon as it starts
    pub fn failing_on_start(cause: &str) -> Self {
        Self {
            fail_on_start: Some(cause.to_string()),
            ..Self::default()
        }
    }

    /// An assistant whose `stop` blocks until released through `gate`
    pub fn gated_stop(gate: Arc<Barrier>) -> Self {
        Self {
            stop_gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<AssistantCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &AssistantCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn stops(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, AssistantCall::Stop(_)))
            .count()
    }

    /// Position of `call` in the recorded sequence
    pub fn position(&self, call: &AssistantCall) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    pub fn take_listener(&self) -> Option<SessionListener> {
        self.listener.lock().take()
    }

    fn record(&self, call: AssistantCall) {
        self.calls.lock().push(call);
    }
}

impl AssistantClient for FakeAssistant {
    fn start(&self, listener: SessionListener) {
        self.record(AssistantCall::Start(listener.session()));
        match &self.fail_on_start {
            Some(cause) => {
                listener.complete(RequestOutcome::Error(SessionError::Request(cause.clone())));
            }
            None => *self.listener.lock() = Some(listener),
        }
    }

    fn stop(&self, session: SessionId) {
        self.record(AssistantCall::Stop(session));
        if let Some(gate) = &self.stop_gate {
            gate.wait();
            gate.wait();
        }
    }

    fn finished(&self) {
        self.record(AssistantCall::Finished);
    }

    fn on_activity(&self) {
        self.record(AssistantCall::Activity);
    }

    fn on_access_token(&self, token: &str) {
        self.record(AssistantCall::AccessToken(token.to_string()));
    }
}

/// Sink that keeps every event it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MirrorEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<MirrorEvent> {
        self.events.lock().clone()
    }

    pub fn completed(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| **e == MirrorEvent::InteractionCompleted)
            .count()
    }
}

impl NotificationSink for RecordingSink {
    fn registration_code(&self, code: &str, url: &str) {
        self.events.lock().push(MirrorEvent::RegistrationCode {
            code: code.to_string(),
            url: url.to_string(),
        });
    }

    fn access_token(&self, token: &str) {
        self.events.lock().push(MirrorEvent::AccessToken {
            token: token.to_string(),
        });
    }

    fn interaction_started(&self) {
        self.events.lock().push(MirrorEvent::InteractionStarted);
    }

    fn interaction_completed(&self) {
        self.events.lock().push(MirrorEvent::InteractionCompleted);
    }

    fn speech_started(&self) {
        self.events.lock().push(MirrorEvent::SpeechStarted);
    }

    fn speech_finished(&self) {
        self.events.lock().push(MirrorEvent::SpeechFinished);
    }

    fn display_notification(&self, notification: &str, payload: &Value) {
        self.events.lock().push(MirrorEvent::Notification {
            notification: notification.to_string(),
            payload: payload.clone(),
        });
    }
}

/// Authenticator with canned answers; `None` fails with a 503
pub struct FakeAuthenticator {
    pub code: Option<String>,
    pub token: Option<String>,
}

impl FakeAuthenticator {
    pub fn issuing(code: &str, token: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            token: Some(token.to_string()),
        }
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn request_registration_code(&self) -> Result<String, AuthError> {
        self.code.clone().ok_or(AuthError::Status(503))
    }

    async fn request_access_token(&self) -> Result<String, AuthError> {
        self.token.clone().ok_or(AuthError::Status(503))
    }
}
