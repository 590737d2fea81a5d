//! Spoken command dispatch table
//!
//! The wake detector reports which command phrase it recognised; the table
//! maps that phrase (case-insensitively) to what the daemon should do. The
//! table is read from a JSON object such as:
//!
//! ```json
//! {
//!   "mirror mirror": { "action": "trigger" },
//!   "show weather": { "action": "send_notification", "notification": "WEATHER_SHOW" }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Phrase the default table binds to a wake trigger
pub const DEFAULT_TRIGGER_PHRASE: &str = "mirror mirror";

/// What a recognised command does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommandAction {
    /// Open an assistant session
    Trigger,

    /// Forward a notification to the display
    SendNotification {
        notification: String,
        #[serde(default)]
        payload: Value,
    },
}

/// Case-insensitive phrase → action table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "HashMap<String, CommandAction>")]
pub struct CommandMap {
    entries: HashMap<String, CommandAction>,
}

impl From<HashMap<String, CommandAction>> for CommandMap {
    fn from(entries: HashMap<String, CommandAction>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(phrase, action)| (normalize(&phrase), action))
                .collect(),
        }
    }
}

impl Default for CommandMap {
    fn default() -> Self {
        Self::from(HashMap::from([(
            DEFAULT_TRIGGER_PHRASE.to_string(),
            CommandAction::Trigger,
        )]))
    }
}

impl CommandMap {
    /// Load the table from `path`, falling back to the default when absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "no command table, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let map: CommandMap = serde_json::from_str(&raw)
            .with_context(|| format!("invalid command table {}", path.display()))?;

        info!(?path, commands = map.len(), "command table loaded");
        Ok(map)
    }

    /// Action bound to a recognised phrase
    pub fn resolve(&self, phrase: &str) -> Option<&CommandAction> {
        self.entries.get(&normalize(phrase))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn normalize(phrase: &str) -> String {
    phrase.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_triggers() {
        let map = CommandMap::default();
        assert_eq!(map.resolve("Mirror Mirror"), Some(&CommandAction::Trigger));
        assert_eq!(map.resolve("show weather"), None);
    }

    #[test]
    fn test_table_deserialization() {
        let json = r#"{
            "Hey Mirror": { "action": "trigger" },
            "show weather": {
                "action": "send_notification",
                "notification": "WEATHER_SHOW",
                "payload": { "city": "Oslo" }
            },
            "hide": { "action": "send_notification", "notification": "HIDE_ALL" }
        }"#;
        let map: CommandMap = serde_json::from_str(json).unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.resolve("hey mirror"), Some(&CommandAction::Trigger));
        let Some(CommandAction::SendNotification { notification, payload }) =
            map.resolve("  SHOW WEATHER ")
        else {
            panic!("expected a notification action");
        };
        assert_eq!(notification, "WEATHER_SHOW");
        assert_eq!(payload["city"], "Oslo");
        assert_eq!(
            map.resolve("hide"),
            Some(&CommandAction::SendNotification {
                notification: "HIDE_ALL".to_string(),
                payload: Value::Null,
            })
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let json = r#"{ "dance": { "action": "dance" } }"#;
        assert!(serde_json::from_str::<CommandMap>(json).is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("mirror-voiced-no-such-commands.json");
        let map = CommandMap::load(&path).unwrap();
        assert_eq!(map, CommandMap::default());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "mirror-voiced-{}-commands.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "wake up": { "action": "trigger" } }"#).unwrap();

        let map = CommandMap::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(map.resolve("Wake Up"), Some(&CommandAction::Trigger));
        assert_eq!(map.resolve(DEFAULT_TRIGGER_PHRASE), None);
    }
}
