//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.
//! Responses and pushed notifications share one stream and are told apart by
//! their `type` tag.

use serde::{Deserialize, Serialize};

use crate::events::MirrorEvent;
use crate::session::{AssistantCommand, SessionId};

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from clients (display layer, wake detector, assistant peer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to lifecycle events (display layer)
    Subscribe,

    /// Attach as the assistant peer and receive assistant commands
    SubscribeAssistant,

    /// Wake trigger: open a new session
    Trigger,

    /// The wake detector recognised a command phrase
    Command { phrase: String },

    /// One audio level sample from the capture subsystem
    AudioLevel { level: u32 },

    /// The assistant peer finished the current request
    RequestSucceeded,

    /// The assistant peer failed the current request
    RequestFailed { cause: String },

    /// The assistant expects a follow-up utterance
    ExpectSpeech,

    /// The assistant peer began playing back a response
    SpeechStarted,

    /// The assistant peer finished playing back a response
    SpeechFinished,

    /// Exchange the pending registration for an access token
    RegisterDevice,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Request applied
    Accepted,

    /// A wake trigger opened a session
    SessionStarted { session_id: SessionId },

    /// Device registration completed
    Registered,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Lifecycle event for the display layer
    Event { event: MirrorEvent },

    /// Command for the assistant peer
    Assistant { command: AssistantCommand },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Whether an access token has been obtained
    pub registered: bool,

    /// Pending registration code
    pub registration_code: Option<String>,

    /// Where the registration code is entered
    pub registration_url: Option<String>,

    /// Whether a session is currently open
    pub session_open: bool,

    /// Identifier of the open session
    pub session_id: Option<SessionId>,

    /// Whether the assistant is playing back a response
    pub speaking: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            registered: false,
            registration_code: None,
            registration_url: None,
            session_open: false,
            session_id: None,
            speaking: false,
            uptime_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::AudioLevel { level: 3 };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"audio_level","level":3}"#);
    }

    #[test]
    fn test_request_deserialization() {
        let req: Request = serde_json::from_str(r#"{"type":"request_failed","cause":"timeout"}"#).unwrap();
        assert_eq!(
            req,
            Request::RequestFailed {
                cause: "timeout".to_string()
            }
        );
    }

    #[test]
    fn test_command_request_deserialization() {
        let req: Request =
            serde_json::from_str(r#"{"type":"command","phrase":"mirror mirror"}"#).unwrap();
        assert_eq!(
            req,
            Request::Command {
                phrase: "mirror mirror".to_string()
            }
        );

        let req: Request = serde_json::from_str(r#"{"type":"subscribe_assistant"}"#).unwrap();
        assert_eq!(req, Request::SubscribeAssistant);
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""session_open":false"#));
    }

    #[test]
    fn test_notification_nests_tagged_payload() {
        let note = Notification::Event {
            event: MirrorEvent::InteractionCompleted,
        };
        let json = serde_json::to_string(&note).unwrap();
        assert_eq!(
            json,
            r#"{"type":"event","event":{"type":"interaction_completed"}}"#
        );
    }
}
