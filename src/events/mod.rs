//! Lifecycle events for the display/companion layer
//!
//! Registration progress, interaction start/completion, assistant speech
//! playback and command-driven display notifications are published as
//! structured events. The sink never blocks the caller and only ever reports
//! "completed" for an interaction, whatever its outcome.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Events published to the display/companion layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MirrorEvent {
    /// A registration code was issued; the user completes pairing at `url`
    RegistrationCode {
        code: String,
        url: String,
    },

    /// The device received its access token
    AccessToken {
        token: String,
    },

    /// Capture began for a new interaction
    InteractionStarted,

    /// The interaction finished (success, failure or timeout alike)
    InteractionCompleted,

    /// The assistant began playing back a response
    SpeechStarted,

    /// Response playback ended
    SpeechFinished,

    /// A configured command asked the display to show a notification
    Notification {
        notification: String,
        #[serde(default)]
        payload: Value,
    },
}

impl std::fmt::Display for MirrorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MirrorEvent::RegistrationCode { code, .. } => write!(f, "REGISTRATION_CODE ({})", code),
            MirrorEvent::AccessToken { .. } => write!(f, "ACCESS_TOKEN"),
            MirrorEvent::InteractionStarted => write!(f, "INTERACTION_STARTED"),
            MirrorEvent::InteractionCompleted => write!(f, "INTERACTION_COMPLETED"),
            MirrorEvent::SpeechStarted => write!(f, "SPEECH_STARTED"),
            MirrorEvent::SpeechFinished => write!(f, "SPEECH_FINISHED"),
            MirrorEvent::Notification { notification, .. } => {
                write!(f, "NOTIFICATION ({})", notification)
            }
        }
    }
}

/// Receiver of lifecycle notifications
///
/// Implementations must return promptly; callers may hold no locks but
/// expect fire-and-forget semantics.
pub trait NotificationSink: Send + Sync {
    /// A registration code is ready to be shown
    fn registration_code(&self, code: &str, url: &str);

    /// Registration completed with an access token
    fn access_token(&self, token: &str);

    /// Capture began for a new interaction
    fn interaction_started(&self) {}

    /// The current interaction completed
    fn interaction_completed(&self);

    /// The assistant began playing back a response
    fn speech_started(&self) {}

    /// Response playback ended
    fn speech_finished(&self) {}

    /// Forward a notification to the display
    fn display_notification(&self, notification: &str, payload: &Value);
}

/// Sink that publishes events on a broadcast channel
#[derive(Clone)]
pub struct BroadcastSink {
    event_tx: broadcast::Sender<MirrorEvent>,
}

impl BroadcastSink {
    pub fn new(event_tx: broadcast::Sender<MirrorEvent>) -> Self {
        Self { event_tx }
    }

    /// Subscribe to the events published by this sink
    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.event_tx.subscribe()
    }

    fn publish(&self, event: MirrorEvent) {
        debug!(%event, "emitting event");
        // No subscribers is not an error; the display may not be attached yet
        if self.event_tx.send(event).is_err() {
            trace!("no event subscribers");
        }
    }
}

impl NotificationSink for BroadcastSink {
    fn registration_code(&self, code: &str, url: &str) {
        self.publish(MirrorEvent::RegistrationCode {
            code: code.to_string(),
            url: url.to_string(),
        });
    }

    fn access_token(&self, token: &str) {
        self.publish(MirrorEvent::AccessToken {
            token: token.to_string(),
        });
    }

    fn interaction_started(&self) {
        self.publish(MirrorEvent::InteractionStarted);
    }

    fn interaction_completed(&self) {
        self.publish(MirrorEvent::InteractionCompleted);
    }

    fn speech_started(&self) {
        self.publish(MirrorEvent::SpeechStarted);
    }

    fn speech_finished(&self) {
        self.publish(MirrorEvent::SpeechFinished);
    }

    fn display_notification(&self, notification: &str, payload: &Value) {
        self.publish(MirrorEvent::Notification {
            notification: notification.to_string(),
            payload: payload.clone(),
        });
    }
}
