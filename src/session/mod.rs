//! Recording session management
//!
//! - `coordinator`: one session at a time, endpointing, exactly-once cleanup
//! - `assistant`: the voice-assistant client contract
//! - `bridge`: an assistant client reached through IPC subscribers

mod assistant;
mod bridge;
mod coordinator;

pub use assistant::{AssistantClient, RequestOutcome, SessionError, SessionId};
pub use bridge::{AssistantCommand, BridgedAssistant};
pub use coordinator::{CoordinatorError, SessionCoordinator, SessionListener};
