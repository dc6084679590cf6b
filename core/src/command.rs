//! Deferred operations applied on the owner thread.

use crate::config_tree::ConfigTree;
use crate::engine::ConfigTarget;
use crate::key::Key;
use crossbeam_channel::Sender;
use std::collections::BTreeMap;

/// One queued operation. Every payload is owned, so nothing borrowed from a
/// caller thread is read on the owner thread.
#[derive(Debug)]
pub(crate) enum Command {
    /// Always the first command of a run: resolves the frontend and
    /// companions, then fires `ready`.
    Bootstrap,
    KeySend(Key),
    CandidateSelect(usize),
    ResetPanel,
    RepositionCursor(i32),
    SetInputMethod(String),
    SetEnabledInputMethods(Vec<String>),
    SetGlobalConfig(ConfigTree),
    SetAddonConfig {
        addon: String,
        tree: ConfigTree,
    },
    SetInputMethodConfig {
        input_method: String,
        tree: ConfigTree,
    },
    SetAddonState(BTreeMap<String, bool>),
    TriggerQuickPhrase,
    TriggerUnicode,
    FocusChange(bool),
    SaveAll,
    /// Build a merged `{cfg, desc}` document and send it back.
    FetchConfig {
        target: ConfigTarget,
        reply: Sender<Option<ConfigTree>>,
    },
    /// Answer once everything queued before it has been applied.
    Sync(Sender<()>),
    /// Terminal command.
    Exit,
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Bootstrap => "bootstrap",
            Command::KeySend(_) => "key_send",
            Command::CandidateSelect(_) => "candidate_select",
            Command::ResetPanel => "reset_panel",
            Command::RepositionCursor(_) => "reposition_cursor",
            Command::SetInputMethod(_) => "set_input_method",
            Command::SetEnabledInputMethods(_) => "set_enabled_input_methods",
            Command::SetGlobalConfig(_) => "set_global_config",
            Command::SetAddonConfig { .. } => "set_addon_config",
            Command::SetInputMethodConfig { .. } => "set_input_method_config",
            Command::SetAddonState(_) => "set_addon_state",
            Command::TriggerQuickPhrase => "trigger_quick_phrase",
            Command::TriggerUnicode => "trigger_unicode",
            Command::FocusChange(_) => "focus_change",
            Command::SaveAll => "save_all",
            Command::FetchConfig { .. } => "fetch_config",
            Command::Sync(_) => "sync",
            Command::Exit => "exit",
        }
    }
}
