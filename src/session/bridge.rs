//! Assistant client bridged over IPC
//!
//! The voice-protocol client runs in a separate process that subscribes to
//! the daemon socket as the assistant peer. Commands are pushed to it as
//! notifications and its request outcomes come back as IPC requests, which
//! resolve the pending `SessionListener`. Display clients never receive these
//! commands, so a failed send means no assistant peer is attached.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::assistant::{AssistantClient, RequestOutcome, SessionError, SessionId};
use super::coordinator::SessionListener;

/// Commands pushed to the assistant peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantCommand {
    /// Open the microphone and stream a new request
    StartRecording { session_id: SessionId },

    /// Close the microphone for `session_id`
    StopRecording { session_id: SessionId },

    /// The daemon is done with the current request
    ProcessingFinished,

    /// User activity was observed
    UserActivity,

    /// Use this token for the remote service
    AccessToken { token: String },
}

/// `AssistantClient` whose peer is reached through broadcast subscribers
pub struct BridgedAssistant {
    command_tx: broadcast::Sender<AssistantCommand>,
    /// Listener for the request currently streaming
    pending: Mutex<Option<SessionListener>>,
}

impl BridgedAssistant {
    pub fn new(command_tx: broadcast::Sender<AssistantCommand>) -> Self {
        Self {
            command_tx,
            pending: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssistantCommand> {
        self.command_tx.subscribe()
    }

    /// Deliver the peer's outcome for the pending request
    ///
    /// Returns true if it resolved a session.
    pub fn complete(&self, outcome: RequestOutcome) -> bool {
        let listener = self.pending.lock().take();
        match listener {
            Some(listener) => listener.complete(outcome),
            None => {
                debug!(?outcome, "no pending request, outcome dropped");
                false
            }
        }
    }

    fn send(&self, command: AssistantCommand) -> bool {
        debug!(?command, "sending assistant command");
        self.command_tx.send(command).is_ok()
    }
}

impl AssistantClient for BridgedAssistant {
    fn start(&self, listener: SessionListener) {
        let session_id = listener.session();

        // Any listener left over from an abandoned request is stale
        if let Some(stale) = self.pending.lock().replace(listener) {
            debug!(session = %stale.session(), "replacing stale listener");
        }

        if !self.send(AssistantCommand::StartRecording { session_id }) {
            warn!(session = %session_id, "no assistant peer attached");
            self.complete(RequestOutcome::Error(SessionError::Request(
                "no assistant peer attached".to_string(),
            )));
        }
    }

    fn stop(&self, session: SessionId) {
        let streaming = self.pending.lock().as_ref().map(SessionListener::session);
        if streaming != Some(session) {
            debug!(session = %session, ?streaming, "stop for inactive request dropped");
            return;
        }
        self.send(AssistantCommand::StopRecording { session_id: session });
    }

    fn finished(&self) {
        self.send(AssistantCommand::ProcessingFinished);
    }

    fn on_activity(&self) {
        self.send(AssistantCommand::UserActivity);
    }

    fn on_access_token(&self, token: &str) {
        self.send(AssistantCommand::AccessToken {
            token: token.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tokio::runtime::Handle;

    use crate::config::EndpointSettings;
    use crate::events::MirrorEvent;
    use crate::session::SessionCoordinator;
    use crate::testing::RecordingSink;

    fn create_bridge() -> (
        Arc<BridgedAssistant>,
        SessionCoordinator,
        Arc<RecordingSink>,
    ) {
        let (tx, _) = broadcast::channel(16);
        let bridge = Arc::new(BridgedAssistant::new(tx));
        let sink = Arc::new(RecordingSink::default());
        let coordinator = SessionCoordinator::new(
            bridge.clone(),
            sink.clone(),
            EndpointSettings::default(),
            Handle::current(),
        );
        (bridge, coordinator, sink)
    }

    #[test]
    fn test_command_serialization() {
        let command = AssistantCommand::StartRecording {
            session_id: SessionId(4),
        };
        let json = serde_json::to_string(&command).unwrap();
        assert_eq!(json, r#"{"type":"start_recording","session_id":4}"#);
    }

    #[tokio::test]
    async fn test_start_pushes_commands() {
        let (bridge, coordinator, _) = create_bridge();
        let mut rx = bridge.subscribe();

        let id = coordinator.trigger_session().unwrap();

        assert_eq!(rx.recv().await.unwrap(), AssistantCommand::UserActivity);
        assert_eq!(
            rx.recv().await.unwrap(),
            AssistantCommand::StartRecording { session_id: id }
        );
    }

    #[tokio::test]
    async fn test_complete_resolves_session() {
        let (bridge, coordinator, sink) = create_bridge();
        let mut rx = bridge.subscribe();

        coordinator.trigger_session().unwrap();
        assert!(bridge.complete(RequestOutcome::Success));
        assert!(!bridge.complete(RequestOutcome::Success));

        assert!(coordinator.current_session().is_none());
        assert_eq!(sink.completed(), 1);

        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        assert_eq!(commands.last(), Some(&AssistantCommand::ProcessingFinished));
    }

    #[tokio::test]
    async fn test_start_without_peer_fails_request() {
        let (bridge, coordinator, sink) = create_bridge();

        coordinator.trigger_session().unwrap();

        assert!(coordinator.current_session().is_none());
        assert_eq!(
            sink.events(),
            vec![
                MirrorEvent::InteractionStarted,
                MirrorEvent::InteractionCompleted
            ]
        );
        assert!(!bridge.complete(RequestOutcome::Success));
    }

    #[tokio::test]
    async fn test_stop_carries_session() {
        let (bridge, coordinator, _) = create_bridge();
        let mut rx = bridge.subscribe();

        let id = coordinator.trigger_session().unwrap();
        bridge.stop(id);

        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        assert_eq!(
            commands.last(),
            Some(&AssistantCommand::StopRecording { session_id: id })
        );
    }

    #[tokio::test]
    async fn test_stop_for_resolved_session_dropped() {
        let (bridge, coordinator, _) = create_bridge();
        let mut rx = bridge.subscribe();

        let first = coordinator.trigger_session().unwrap();
        assert!(bridge.complete(RequestOutcome::Success));
        let second = coordinator.trigger_session().unwrap();
        while rx.try_recv().is_ok() {}

        bridge.stop(first);
        assert!(rx.try_recv().is_err());

        bridge.stop(second);
        assert_eq!(
            rx.try_recv().unwrap(),
            AssistantCommand::StopRecording { session_id: second }
        );
    }
}
