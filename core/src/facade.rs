//! The caller-facing bridge.
//!
//! [`Bridge`] is an explicitly constructed context object shared between
//! threads (usually as `Arc<Bridge>`). One thread runs [`Bridge::startup`]
//! and becomes the owner thread for that run; every other operation may be
//! called from any thread.
//!
//! Mutating operations are fire-and-forget: they enqueue a command and
//! return. When the bridge is not running they do nothing. Reads come in two
//! kinds:
//!
//! - panel, input-method and addon queries are served from the latest
//!   snapshot published by the owner thread (relaxed consistency);
//! - configuration documents are built on the owner thread and returned
//!   through a one-shot reply, so they reflect every command queued before
//!   the request.

use crate::addon::{AddonOverrides, AddonState};
use crate::command::Command;
use crate::config_tree::ConfigTree;
use crate::dispatcher::CommandSender;
use crate::engine::{ConfigTarget, InputMethodEntry, InputMethodStatus, PunctuationLookup};
use crate::error::{BridgeError, KeyParseError};
use crate::key::Key;
use crate::lifecycle::LifecycleState;
use crate::view::EngineView;
use crate::BridgeSettings;
use arc_swap::{ArcSwap, ArcSwapOption};
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Companion modules resolved once per run.
#[derive(Clone, Default)]
pub(crate) struct Companions {
    pub(crate) quick_phrase: bool,
    pub(crate) unicode: bool,
    pub(crate) punctuation: Option<Arc<dyn PunctuationLookup>>,
}

impl fmt::Debug for Companions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Companions")
            .field("quick_phrase", &self.quick_phrase)
            .field("unicode", &self.unicode)
            .field("punctuation", &self.punctuation.is_some())
            .finish()
    }
}

/// Everything a running bridge shares with caller threads.
///
/// Present exactly while the engine, the command queue and the primary
/// frontend all exist; published at the end of bootstrap and withdrawn as
/// the first action of exit.
#[derive(Debug)]
pub(crate) struct Live {
    pub(crate) generation: u64,
    pub(crate) owner: ThreadId,
    pub(crate) commands: CommandSender<Command>,
    pub(crate) view: ArcSwap<EngineView>,
    pub(crate) companions: Companions,
}

/// Handle through which callers drive the engine.
pub struct Bridge {
    pub(crate) settings: BridgeSettings,
    pub(crate) state: Mutex<LifecycleState>,
    pub(crate) state_changed: Condvar,
    pub(crate) live: ArcSwapOption<Live>,
    pub(crate) generation: AtomicU64,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeSettings::default())
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

impl Bridge {
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(LifecycleState::NotStarted),
            state_changed: Condvar::new(),
            live: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    // ========== Lifecycle queries ==========

    pub fn is_running(&self) -> bool {
        self.live.load().is_some()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Number of startups that got past the already-running check.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.lock();
        debug!(from = ?*state, to = ?next, "lifecycle transition");
        *state = next;
        self.state_changed.notify_all();
    }

    /// Block until the bridge is running, up to `timeout`. Returns whether it
    /// is running.
    ///
    /// Called between runs, this waits for the next startup: a run that is
    /// already stopped (or exiting) on entry does not end the wait, only one
    /// that started afterwards and stopped without reaching `Running`.
    pub fn wait_until_running(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let current = self.generation();
        let awaited = match *state {
            LifecycleState::Starting | LifecycleState::Running => current,
            LifecycleState::NotStarted | LifecycleState::Exiting | LifecycleState::Stopped => {
                current + 1
            }
        };
        loop {
            match *state {
                LifecycleState::Running => return true,
                LifecycleState::Stopped if self.generation() >= awaited => return false,
                _ => {}
            }
            if self.state_changed.wait_until(&mut state, deadline).timed_out() {
                return *state == LifecycleState::Running;
            }
        }
    }

    /// Block until the current run has stopped, up to `timeout`.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state != LifecycleState::Stopped {
            if self.state_changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state == LifecycleState::Stopped
    }

    fn running(&self) -> Option<Arc<Live>> {
        let live = self.live.load_full();
        if live.is_none() {
            debug!("bridge is not running");
        }
        live
    }

    fn submit(&self, command: Command) {
        let name = command.name();
        let Some(live) = self.running() else {
            debug!(command = name, "dropping command");
            return;
        };
        if !live.commands.enqueue(command) {
            debug!(command = name, generation = live.generation, "command queue closed");
        }
    }

    /// Enqueue a command carrying a reply slot and wait for the answer.
    /// Returns `None` when not running, when called from the owner thread,
    /// or when the run ends before the command is applied.
    fn round_trip<R>(&self, make: impl FnOnce(Sender<R>) -> Command) -> Option<R> {
        let live = self.running()?;
        if live.owner == thread::current().id() {
            warn!("blocking round trip requested from the owner thread, refusing");
            return None;
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        if !live.commands.enqueue(make(tx)) {
            return None;
        }
        // The owner must be able to tear down while we wait.
        drop(live);
        rx.recv().ok()
    }

    fn with_view<R>(&self, default: R, read: impl FnOnce(&EngineView) -> R) -> R {
        match self.running() {
            Some(live) => read(&live.view.load()),
            None => default,
        }
    }

    // ========== Input ==========

    pub fn send_key(&self, key: Key) {
        self.submit(Command::KeySend(key));
    }

    /// Parse a key description such as `"Control+space"` and send it.
    /// Nothing is enqueued if parsing fails.
    pub fn send_key_str(&self, description: &str) -> Result<(), KeyParseError> {
        let key: Key = description.parse()?;
        self.send_key(key);
        Ok(())
    }

    pub fn send_key_code(&self, code: u32) {
        self.send_key(Key::from_code(code));
    }

    pub fn send_char(&self, ch: char) {
        self.send_key(Key::from_char(ch));
    }

    pub fn select(&self, index: usize) {
        self.submit(Command::CandidateSelect(index));
    }

    pub fn reset_input_panel(&self) {
        self.submit(Command::ResetPanel);
    }

    pub fn reposition_cursor(&self, position: i32) {
        self.submit(Command::RepositionCursor(position));
    }

    pub fn focus_input_context(&self, focus: bool) {
        self.submit(Command::FocusChange(focus));
    }

    pub fn set_input_method(&self, name: &str) {
        self.submit(Command::SetInputMethod(name.to_string()));
    }

    /// Replace the current group's input methods with `names` and persist.
    pub fn set_enabled_input_methods<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        self.submit(Command::SetEnabledInputMethods(names));
    }

    // ========== Snapshot reads ==========

    /// Relaxed-consistency read. `true` when not running.
    pub fn is_input_panel_empty(&self) -> bool {
        self.with_view(true, |v| v.panel_empty)
    }

    /// Input methods of the current group, in group order.
    pub fn list_input_methods(&self) -> Vec<InputMethodEntry> {
        self.with_view(Vec::new(), |v| v.enabled.clone())
    }

    /// Every input method the engine knows.
    pub fn available_input_methods(&self) -> Vec<InputMethodEntry> {
        self.with_view(Vec::new(), |v| v.available.clone())
    }

    pub fn input_method_status(&self) -> Option<InputMethodStatus> {
        self.with_view(None, |v| v.status.clone())
    }

    /// Every addon with its effective enabled state, grouped by category.
    pub fn get_addons(&self) -> Vec<AddonState> {
        self.with_view(Vec::new(), |v| v.addons.clone())
    }

    pub fn addon_overrides(&self) -> AddonOverrides {
        self.with_view(AddonOverrides::default(), |v| v.overrides.clone())
    }

    // ========== Configuration ==========

    fn fetch_config(&self, target: ConfigTarget) -> Option<ConfigTree> {
        self.round_trip(|reply| Command::FetchConfig { target, reply })
            .flatten()
    }

    /// Merged `{cfg, desc}` document of the global configuration.
    pub fn get_global_config(&self) -> Option<ConfigTree> {
        self.fetch_config(ConfigTarget::Global)
    }

    /// `None` if the addon is unknown, not configurable, cannot be loaded,
    /// or exposes no configuration.
    pub fn get_addon_config(&self, addon: &str) -> Option<ConfigTree> {
        self.fetch_config(ConfigTarget::Addon(addon.to_string()))
    }

    pub fn get_input_method_config(&self, input_method: &str) -> Option<ConfigTree> {
        self.fetch_config(ConfigTarget::InputMethod(input_method.to_string()))
    }

    /// Sparse-load `values` (shaped like the `cfg` section) into the global
    /// configuration, save, and reload.
    pub fn set_global_config(&self, values: ConfigTree) {
        self.submit(Command::SetGlobalConfig(values));
    }

    pub fn set_addon_config(&self, addon: &str, values: ConfigTree) {
        self.submit(Command::SetAddonConfig {
            addon: addon.to_string(),
            tree: values,
        });
    }

    pub fn set_input_method_config(&self, input_method: &str, values: ConfigTree) {
        self.submit(Command::SetInputMethodConfig {
            input_method: input_method.to_string(),
            tree: values,
        });
    }

    /// Save global config, input-method groups and every addon config.
    pub fn save_config(&self) {
        self.submit(Command::SaveAll);
    }

    // ========== Addons ==========

    /// Request enabled states by addon name. Unknown names are ignored.
    pub fn set_addon_state(&self, desired: BTreeMap<String, bool>) {
        if desired.is_empty() {
            return;
        }
        self.submit(Command::SetAddonState(desired));
    }

    /// Parallel-array form of [`set_addon_state`](Self::set_addon_state).
    pub fn set_addon_state_arrays<S: AsRef<str>>(
        &self,
        names: &[S],
        states: &[bool],
    ) -> Result<(), BridgeError> {
        if names.len() != states.len() {
            return Err(BridgeError::LengthMismatch {
                names: names.len(),
                states: states.len(),
            });
        }
        let desired = names
            .iter()
            .map(|n| n.as_ref().to_string())
            .zip(states.iter().copied())
            .collect();
        self.set_addon_state(desired);
        Ok(())
    }

    // ========== Companions ==========

    pub fn trigger_quick_phrase(&self) {
        match self.running() {
            Some(live) if live.companions.quick_phrase => {
                self.submit(Command::TriggerQuickPhrase)
            }
            Some(_) => debug!("quick phrase module not loaded"),
            None => {}
        }
    }

    pub fn trigger_unicode(&self) {
        match self.running() {
            Some(live) if live.companions.unicode => self.submit(Command::TriggerUnicode),
            Some(_) => debug!("unicode module not loaded"),
            None => {}
        }
    }

    /// Opening and closing punctuation for `ch` in `language`. Falls back to
    /// `ch` itself for both halves.
    pub fn query_punctuation(&self, ch: char, language: &str) -> (String, String) {
        let lookup = self
            .running()
            .and_then(|live| live.companions.punctuation.clone());
        lookup
            .and_then(|p| p.lookup(language, ch))
            .unwrap_or_else(|| (ch.to_string(), ch.to_string()))
    }

    // ========== Flow control ==========

    /// Wait until every command queued before this call has been applied and
    /// the snapshot republished. Returns `false` if the bridge is not running
    /// or stopped first.
    pub fn sync(&self) -> bool {
        self.round_trip(Command::Sync).is_some()
    }

    /// Request shutdown. The exit command is the last one applied.
    pub fn exit(&self) {
        let live = {
            let mut state = self.state.lock();
            if *state != LifecycleState::Running {
                debug!(state = ?*state, "exit ignored");
                return;
            }
            *state = LifecycleState::Exiting;
            self.state_changed.notify_all();
            self.live.load_full()
        };
        match live {
            Some(live) => {
                live.commands.enqueue(Command::Exit);
            }
            None => debug!("exit raced with shutdown"),
        }
    }
}
