//! Error types shared across the bridge.
//!
//! Errors are local to the operation that raised them: a `ConfigError` or
//! `KeyParseError` rejects one boundary call (or aborts one queued command),
//! while an `EngineError` coming out of the engine's own run loop ends the
//! whole run and is mapped to an exit status by the lifecycle.

use thiserror::Error;

/// Data-shape and value errors of configuration trees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A boundary node carried both a value and children.
    #[error("node `{path}` has both a value and children")]
    MixedNode { path: String },

    /// A child node had an empty name.
    #[error("node under `{parent}` has an empty name")]
    EmptyName { parent: String },

    /// A leaf option received an interior node.
    #[error("option `{path}` expects a value, found a subtree")]
    ExpectedValue { path: String },

    /// A value could not be converted to the option's declared type.
    #[error("invalid value `{value}` for option `{path}`: {reason}")]
    InvalidValue {
        path: String,
        value: String,
        reason: String,
    },

    /// An option path does not exist in the schema.
    #[error("unknown option `{0}`")]
    UnknownOption(String),
}

/// Errors produced when parsing a key description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("empty key description")]
    Empty,

    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),

    #[error("unknown key symbol `{0}`")]
    UnknownSymbol(String),
}

/// Failures reported by the engine collaborator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Controlled shutdown; mapped to a clean exit status.
    #[error("engine quit quietly")]
    QuietQuit,

    /// The primary frontend could not be resolved during bootstrap.
    #[error("frontend addon `{0}` is unavailable")]
    FrontendUnavailable(String),

    #[error("unknown input method `{0}`")]
    UnknownInputMethod(String),

    #[error("unknown input context {0}")]
    UnknownInputContext(u64),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether this error is the distinguished controlled-shutdown kind.
    pub fn is_quiet_quit(&self) -> bool {
        matches!(self, EngineError::QuietQuit)
    }
}

/// Rejections reported to callers at the bridge boundary.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("addon state arrays differ in length: {names} names, {states} states")]
    LengthMismatch { names: usize, states: usize },

    #[error(transparent)]
    Key(#[from] KeyParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
