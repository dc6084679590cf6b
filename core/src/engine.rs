//! Interface of the engine collaborator.
//!
//! The engine is single-threaded and stateful. It is constructed on the
//! owner thread and every method is only ever called from that thread, so
//! implementations need not be `Send` or `Sync`. The only engine-provided
//! object shared with caller threads is the punctuation lookup, which must be
//! read-only.

use crate::addon::{AddonCategory, AddonInfo, AddonOverrides};
use crate::config_tree::Configuration;
use crate::error::EngineError;
use crate::events::EventEmitter;
use crate::key::Key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Handle of an input context created by the primary frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputContextId(pub u64);

impl fmt::Display for InputContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ic#{}", self.0)
    }
}

/// Description of one input method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMethodEntry {
    pub unique_name: String,
    pub display_name: String,
    pub icon: String,
    pub native_name: String,
    pub label: String,
    pub language_code: String,
    /// Addon providing the input method.
    pub addon: String,
    pub configurable: bool,
}

/// Currently active sub-mode of an input method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMode {
    pub mode: String,
    pub label: String,
    pub icon: String,
}

/// The active input method of the focused context and its sub-mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMethodStatus {
    pub entry: InputMethodEntry,
    pub sub_mode: Option<SubMode>,
}

/// Named, ordered list of enabled input methods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMethodGroup {
    pub name: String,
    pub default_layout: String,
    pub input_methods: Vec<String>,
}

/// Which configuration object an operation addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigTarget {
    Global,
    Addon(String),
    InputMethod(String),
}

impl fmt::Display for ConfigTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigTarget::Global => f.write_str("global"),
            ConfigTarget::Addon(name) => write!(f, "addon:{name}"),
            ConfigTarget::InputMethod(name) => write!(f, "im:{name}"),
        }
    }
}

/// Outcome of one turn of the engine's own event processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStep {
    Continue,
    /// The engine finished on its own.
    Exit,
}

/// Punctuation companion lookup, shared read-only with caller threads.
pub trait PunctuationLookup: Send + Sync {
    /// Opening/closing forms of `ch` for `language`, or `None` if the
    /// character has no entry.
    fn lookup(&self, language: &str, ch: char) -> Option<(String, String)>;
}

/// The single-threaded input-method engine.
pub trait Engine {
    // ========== Addons ==========

    /// Resolve an addon instance, loading it first when `load` is set.
    /// Returns whether the addon is available.
    fn load_addon(&mut self, name: &str, load: bool) -> bool;

    fn addon_names(&self, category: AddonCategory) -> Vec<String>;

    fn addon_info(&self, name: &str) -> Option<AddonInfo>;

    fn addon_overrides(&self) -> &AddonOverrides;

    fn set_addon_overrides(&mut self, overrides: AddonOverrides);

    // ========== Primary frontend ==========

    fn create_input_context(&mut self, program: &str) -> Result<InputContextId, EngineError>;

    /// Deliver a key to the context. Returns whether the engine consumed it.
    fn key_event(&mut self, ic: InputContextId, key: &Key) -> Result<bool, EngineError>;

    fn select_candidate(&mut self, ic: InputContextId, index: usize) -> Result<(), EngineError>;

    fn is_input_panel_empty(&self, ic: InputContextId) -> bool;

    fn reset_input_panel(&mut self, ic: InputContextId) -> Result<(), EngineError>;

    fn reposition_cursor(&mut self, ic: InputContextId, position: i32) -> Result<(), EngineError>;

    fn focus_input_context(&mut self, ic: InputContextId, focus: bool) -> Result<(), EngineError>;

    // ========== Input methods ==========

    fn current_group(&self) -> InputMethodGroup;

    fn set_group(&mut self, group: InputMethodGroup);

    fn input_method_entry(&self, name: &str) -> Option<InputMethodEntry>;

    /// Every known input method, in registration order.
    fn input_method_entries(&self) -> Vec<InputMethodEntry>;

    fn set_current_input_method(&mut self, ic: InputContextId, name: &str) -> Result<(), EngineError>;

    fn input_method_status(&self, ic: InputContextId) -> Option<InputMethodStatus>;

    // ========== Configuration ==========

    /// Configuration object for `target`, or `None` if it exposes none.
    fn configuration(&mut self, target: &ConfigTarget) -> Option<&mut dyn Configuration>;

    /// Persist the configuration for `target`.
    fn save_configuration(&mut self, target: &ConfigTarget) -> Result<(), EngineError>;

    /// Persist the input-method groups.
    fn save_input_methods(&mut self) -> Result<(), EngineError>;

    /// Persist every addon's configuration.
    fn save_all_addons(&mut self) -> Result<(), EngineError>;

    /// Re-read and re-apply the global configuration.
    fn reload_config(&mut self);

    // ========== Companion modules ==========

    fn punctuation(&self) -> Option<Arc<dyn PunctuationLookup>>;

    fn trigger_quick_phrase(&mut self, ic: InputContextId) -> Result<(), EngineError>;

    fn trigger_unicode(&mut self, ic: InputContextId) -> Result<(), EngineError>;

    // ========== Run loop ==========

    /// Process engine-internal work (timers, IO). Errors end the run;
    /// `EngineError::QuietQuit` ends it cleanly.
    fn pump(&mut self) -> Result<LoopStep, EngineError>;

    /// How long the owner loop may sleep before the engine needs a `pump`.
    fn next_wakeup(&self) -> Option<Duration> {
        None
    }

    /// Begin shutdown. Called by the terminal command.
    fn exit(&mut self);
}

/// Builds an engine on the owner thread, handing it the event emitter.
pub trait EngineFactory {
    fn build(self, events: EventEmitter) -> Result<Box<dyn Engine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: FnOnce(EventEmitter) -> Result<Box<dyn Engine>, EngineError>,
{
    fn build(self, events: EventEmitter) -> Result<Box<dyn Engine>, EngineError> {
        self(events)
    }
}
