//! imebridge-core
//!
//! Lets many caller threads drive one single-threaded input-method engine.
//! All engine mutation is serialized onto a single owner thread through a
//! command queue; engine events flow back out through registered callbacks.
//!
//! Public API:
//! - `Bridge` - Caller-facing facade and lifecycle (`startup`, `exit`, queries)
//! - `Engine` - Interface the engine collaborator implements
//! - `CallbackRegistry` / `EngineEvent` - Outbound event delivery
//! - `ConfigTree` / `ConfigNode` - Arena configuration tree and boundary shape
//! - `OptionSet` - Declarative schema-backed `Configuration`
//! - `reconcile` - Addon enable/disable override reconciliation
//! - `BridgeSettings` - Settings of the bridge itself

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{BridgeError, ConfigError, EngineError, KeyParseError};

pub mod config_tree;
pub use config_tree::{merge_config_desc, ConfigNode, ConfigTree, Configuration, NodeId};

pub mod options;
pub use options::{OptionKind, OptionSet, OptionSetBuilder, OptionValue};

pub mod addon;
pub use addon::{reconcile, AddonCategory, AddonInfo, AddonOverrides, AddonState};

pub mod key;
pub use key::{Key, KeyStates, KeySym};

pub mod engine;
pub use engine::{
    ConfigTarget, Engine, EngineFactory, InputContextId, InputMethodEntry, InputMethodGroup,
    InputMethodStatus, LoopStep, PunctuationLookup, SubMode,
};

pub mod events;
pub use events::{CallbackRegistry, EngineEvent, EventEmitter, EventReceiver};

pub mod dispatcher;

mod command;
mod view;

pub mod facade;
pub use facade::Bridge;

pub mod lifecycle;
pub use lifecycle::{ExitStatus, LifecycleState};

/// Settings of the bridge itself (not of the engine).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Program name used when creating the frontend input context
    pub program_name: String,
    /// Primary frontend addon; its absence makes startup fail
    pub frontend_addon: String,

    // Companion modules, each optional at runtime
    pub quick_phrase_addon: String,
    pub punctuation_addon: String,
    pub unicode_addon: String,

    /// Layout given to a group rebuilt by `set_enabled_input_methods`
    pub default_layout: String,

    /// Longest the owner thread sleeps between engine turns (milliseconds)
    pub idle_wakeup_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            program_name: "imebridge".to_string(),
            frontend_addon: "frontend".to_string(),
            quick_phrase_addon: "quickphrase".to_string(),
            punctuation_addon: "punctuation".to_string(),
            unicode_addon: "unicode".to_string(),
            default_layout: "us".to_string(),
            idle_wakeup_ms: 500,
        }
    }
}

impl BridgeSettings {
    /// Load settings from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save settings to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
