//! Voice-assistant client contract
//!
//! The protocol client (directives, audio streaming, authentication with the
//! remote service) is a black box. The coordinator only drives it through
//! this trait and learns each request's outcome through a `SessionListener`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::coordinator::SessionListener;

/// Identifier of one recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failure of an in-flight interaction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("assistant request failed: {0}")]
    Request(String),

    #[error("no response from assistant within {0:?}")]
    ListenTimeout(Duration),
}

/// Result of one assistant request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Error(SessionError),
}

/// Commands the coordinator issues to the voice-assistant client
pub trait AssistantClient: Send + Sync {
    /// Begin capture for a new request; the outcome is reported via `listener`
    fn start(&self, listener: SessionListener);

    /// Stop capture for `session`
    ///
    /// Only ever issued for the session that is current at delivery time.
    fn stop(&self, session: SessionId);

    /// The coordinator is done processing the current request
    fn finished(&self);

    /// The user showed activity (wake trigger)
    fn on_activity(&self);

    /// A new access token is available
    fn on_access_token(&self, token: &str);
}
