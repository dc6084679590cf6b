//! In-memory reference engine.
//!
//! Implements the bridge's `Engine` interface over the built-in catalog:
//! a keyboard input method that commits printable keys, phonetic input
//! methods that compose a preedit against a small syllable table, and the
//! quick-phrase, unicode and punctuation companions. Configuration lives in
//! `OptionSet`s persisted through a [`ConfigStore`].

use crate::catalog::{self, CLIPBOARD, FRONTEND, KEYBOARD, PINYIN, PUNCTUATION, QUICK_PHRASE, UNICODE};
use crate::panel::{Panel, PanelMode};
use crate::punctuation::PunctuationTable;
use crate::storage::{self, ConfigStore};
use anyhow::anyhow;
use imebridge_core::{
    AddonCategory, AddonInfo, AddonOverrides, ConfigTarget, Configuration, Engine, EngineError,
    EngineEvent, EventEmitter, InputContextId, InputMethodEntry, InputMethodGroup,
    InputMethodStatus, Key, KeySym, LoopStep, OptionSet, PunctuationLookup, SubMode,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ========== Test hooks ==========

/// Failure injected into the engine from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Next `pump` requests a controlled shutdown.
    Quiet,
    /// Next `pump` fails with this message.
    Crash(String),
    /// Next `pump` reports that the engine finished on its own.
    Finish,
    /// Next key event fails.
    KeyError,
}

/// Shared switch for injecting a [`Fault`]. Each fault fires once.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch(Arc<Mutex<Option<Fault>>>);

impl FaultSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self, fault: Fault) {
        *self.0.lock() = Some(fault);
    }

    fn take_if(&self, pred: impl FnOnce(&Fault) -> bool) -> Option<Fault> {
        let mut slot = self.0.lock();
        if slot.as_ref().is_some_and(pred) {
            slot.take()
        } else {
            None
        }
    }
}

/// What the engine did, observable from other threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeData {
    pub saves: Vec<String>,
    pub reloads: usize,
    pub exited: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EngineProbe(Arc<Mutex<ProbeData>>);

impl EngineProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProbeData {
        self.0.lock().clone()
    }

    fn saved(&self, key: &str) {
        self.0.lock().saves.push(key.to_string());
    }
}

// ========== Builder ==========

#[derive(Debug, Clone, Default)]
pub struct MemoryEngineBuilder {
    config_dir: Option<PathBuf>,
    overrides: AddonOverrides,
    faults: FaultSwitch,
    probe: EngineProbe,
}

impl MemoryEngineBuilder {
    /// Persist configuration as TOML files under `dir`.
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Overrides used when none were saved before.
    pub fn overrides(mut self, overrides: AddonOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn faults(mut self, faults: FaultSwitch) -> Self {
        self.faults = faults;
        self
    }

    pub fn probe(mut self, probe: EngineProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn build(self, events: EventEmitter) -> Result<MemoryEngine, EngineError> {
        let store = match &self.config_dir {
            Some(dir) => ConfigStore::at_dir(dir)?,
            None => ConfigStore::in_memory(),
        };

        let mut global = catalog::global_options();
        store.restore_config(storage::GLOBAL_KEY, &mut global)?;

        let mut addon_configs = BTreeMap::new();
        for info in catalog::ADDONS.iter().filter(|a| a.configurable) {
            if let Some(mut set) = catalog::addon_options(&info.unique_name) {
                store.restore_config(&storage::addon_key(&info.unique_name), &mut set)?;
                addon_configs.insert(info.unique_name.clone(), set);
            }
        }
        let mut im_configs = BTreeMap::new();
        for entry in catalog::INPUT_METHODS.iter().filter(|im| im.configurable) {
            if let Some(mut set) = catalog::input_method_options(&entry.unique_name) {
                store.restore_config(&storage::input_method_key(&entry.unique_name), &mut set)?;
                im_configs.insert(entry.unique_name.clone(), set);
            }
        }

        let overrides = store.restore_overrides()?.unwrap_or(self.overrides);
        let group = store.restore_group()?.unwrap_or_else(|| InputMethodGroup {
            name: catalog::DEFAULT_GROUP.to_string(),
            default_layout: "us".to_string(),
            input_methods: catalog::default_group_methods(),
        });
        let current_im = group
            .input_methods
            .iter()
            .find(|name| catalog::input_method_entry(name).is_some())
            .cloned()
            .unwrap_or_else(|| "keyboard-us".to_string());

        let mut engine = MemoryEngine {
            events,
            store,
            faults: self.faults,
            probe: self.probe,
            overrides,
            loaded: BTreeSet::new(),
            global,
            addon_configs,
            im_configs,
            group,
            current_im,
            contexts: BTreeMap::new(),
            next_ic: 1,
            punctuation: Arc::new(PunctuationTable::new()),
        };
        engine.load_startup_addons();
        info!(loaded = ?engine.loaded, current = %engine.current_im, "memory engine ready");
        Ok(engine)
    }

    /// Factory for `Bridge::startup`.
    pub fn into_factory(self) -> impl FnOnce(EventEmitter) -> Result<Box<dyn Engine>, EngineError> {
        move |events: EventEmitter| -> Result<Box<dyn Engine>, EngineError> {
            let engine = self.build(events)?;
            Ok(Box::new(engine))
        }
    }
}

// ========== Engine ==========

/// Which option set a configuration target resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Global,
    Addon(String),
    InputMethod(String),
}

pub struct MemoryEngine {
    events: EventEmitter,
    store: ConfigStore,
    faults: FaultSwitch,
    probe: EngineProbe,
    overrides: AddonOverrides,
    loaded: BTreeSet<String>,
    global: OptionSet,
    addon_configs: BTreeMap<String, OptionSet>,
    im_configs: BTreeMap<String, OptionSet>,
    group: InputMethodGroup,
    current_im: String,
    contexts: BTreeMap<u64, Panel>,
    next_ic: u64,
    punctuation: Arc<PunctuationTable>,
}

/// Full-width form of a printable ASCII character.
fn to_fullwidth(ch: char) -> char {
    match ch {
        ' ' => '\u{3000}',
        '!'..='~' => char::from_u32(ch as u32 + 0xFEE0).unwrap_or(ch),
        _ => ch,
    }
}

enum Action {
    Refresh,
    CommitPreedit,
    Select(usize),
    Passthrough(char),
    Swallow,
    Forward,
}

impl MemoryEngine {
    pub fn builder() -> MemoryEngineBuilder {
        MemoryEngineBuilder::default()
    }

    pub fn current_input_method(&self) -> &str {
        &self.current_im
    }

    pub fn loaded_addons(&self) -> Vec<String> {
        self.loaded.iter().cloned().collect()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    fn is_enabled(&self, info: &AddonInfo) -> bool {
        self.overrides.effective(&info.unique_name, info.default_enabled)
    }

    fn load_startup_addons(&mut self) {
        for info in catalog::ADDONS.iter() {
            if !info.on_demand && self.is_enabled(info) {
                self.loaded.insert(info.unique_name.clone());
            }
        }
    }

    fn panel(&self, ic: InputContextId) -> Result<&Panel, EngineError> {
        self.contexts
            .get(&ic.0)
            .ok_or(EngineError::UnknownInputContext(ic.0))
    }

    fn panel_mut(&mut self, ic: InputContextId) -> Result<&mut Panel, EngineError> {
        self.contexts
            .get_mut(&ic.0)
            .ok_or(EngineError::UnknownInputContext(ic.0))
    }

    fn current_entry(&self) -> InputMethodEntry {
        catalog::input_method_entry(&self.current_im)
            .cloned()
            .unwrap_or_default()
    }

    fn status(&self) -> Option<InputMethodStatus> {
        let entry = catalog::input_method_entry(&self.current_im)?.clone();
        let sub_mode = (entry.addon == PINYIN).then(|| {
            if self.full_width() {
                SubMode {
                    mode: "fullwidth".into(),
                    label: "全".into(),
                    icon: "fullwidth-active".into(),
                }
            } else {
                SubMode {
                    mode: "halfwidth".into(),
                    label: "半".into(),
                    icon: "fullwidth-inactive".into(),
                }
            }
        });
        Some(InputMethodStatus { entry, sub_mode })
    }

    fn pinyin_option_bool(&self, path: &str) -> bool {
        self.addon_configs
            .get(PINYIN)
            .and_then(|set| set.get_bool(path))
            .unwrap_or(false)
    }

    fn full_width(&self) -> bool {
        self.pinyin_option_bool("FullWidth")
    }

    fn page_size(&self) -> usize {
        self.addon_configs
            .get(PINYIN)
            .and_then(|set| set.get_int("PageSize"))
            .or_else(|| self.global.get_int("Behavior/DefaultPageSize"))
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(5)
    }

    // ========== Event helpers ==========

    fn commit(&self, text: String) {
        if !text.is_empty() {
            self.events.emit(EngineEvent::StringCommitted(text));
        }
    }

    fn publish(&self, ic: InputContextId) {
        let Some(panel) = self.contexts.get(&ic.0) else {
            return;
        };
        self.events.emit(EngineEvent::PreeditUpdated {
            preedit: panel.preedit.clone(),
            client_preedit: panel.preedit.clone(),
            cursor: panel.cursor_bytes(),
        });
        self.events
            .emit(EngineEvent::CandidateListUpdated(panel.candidates.clone()));
        self.events.emit(EngineEvent::AuxTextUpdated {
            aux_up: panel.aux_up.clone(),
            aux_down: panel.aux_down.clone(),
        });
    }

    fn announce_input_method(&self) {
        self.events.emit(EngineEvent::InputMethodChanged(self.status()));
    }

    // ========== Composition ==========

    fn refresh_candidates(&mut self, ic: InputContextId) -> Result<(), EngineError> {
        let page_size = self.page_size();
        let panel = self.panel_mut(ic)?;
        match panel.mode {
            PanelMode::Normal => {
                panel.candidates = catalog::lookup_phrases(&panel.preedit);
                panel.candidates.truncate(page_size);
                panel.aux_up.clear();
            }
            PanelMode::QuickPhrase => {
                panel.candidates = match catalog::QUICK_PHRASES.get(panel.preedit.as_str()) {
                    Some(words) => words.iter().map(|w| w.to_string()).collect(),
                    None if panel.preedit.is_empty() => Vec::new(),
                    None => vec![panel.preedit.clone()],
                };
                panel.aux_up = "Quick Phrase: ".into();
            }
            PanelMode::Unicode => {
                panel.candidates = u32::from_str_radix(&panel.preedit, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|ch| vec![ch.to_string()])
                    .unwrap_or_default();
                panel.aux_up = "Unicode: ".into();
                panel.aux_down = if panel.preedit.is_empty() {
                    String::new()
                } else {
                    format!("U+{}", panel.preedit.to_uppercase())
                };
            }
        }
        Ok(())
    }

    fn accepts(mode: PanelMode, ch: char) -> bool {
        match mode {
            PanelMode::Normal | PanelMode::QuickPhrase => ch.is_ascii_lowercase(),
            PanelMode::Unicode => ch.is_ascii_hexdigit(),
        }
    }

    fn compose_key(&mut self, ic: InputContextId, key: &Key) -> Result<bool, EngineError> {
        let panel = self.panel_mut(ic)?;
        let printable = key.printable();
        let composing = !panel.preedit.is_empty();
        let has_candidates = !panel.candidates.is_empty();
        let action = match (key.sym, printable) {
            (_, Some(ch)) if Self::accepts(panel.mode, ch) => {
                panel.insert(ch);
                Action::Refresh
            }
            (KeySym::BackSpace, _) if composing => {
                panel.backspace();
                Action::Refresh
            }
            (KeySym::Escape, _) if !panel.is_empty() => {
                panel.clear();
                Action::Refresh
            }
            (KeySym::Return, _) if composing => Action::CommitPreedit,
            (_, Some(' ')) if has_candidates => Action::Select(0),
            (_, Some(d @ '1'..='9')) if has_candidates => Action::Select(d as usize - '1' as usize),
            _ if panel.mode != PanelMode::Normal => Action::Swallow,
            (_, Some(ch)) => Action::Passthrough(ch),
            _ => Action::Forward,
        };

        match action {
            Action::Refresh => {
                self.refresh_candidates(ic)?;
                self.publish(ic);
            }
            Action::CommitPreedit => {
                let panel = self.panel_mut(ic)?;
                let text = std::mem::take(&mut panel.preedit);
                panel.clear();
                self.commit(text);
                self.publish(ic);
            }
            Action::Select(index) => self.select_candidate(ic, index)?,
            Action::Passthrough(ch) => {
                // Pending composition goes out first.
                if has_candidates {
                    self.select_candidate(ic, 0)?;
                }
                let language = self.current_entry().language_code;
                let punctuated = if self.loaded.contains(PUNCTUATION) {
                    self.punctuation.commit_text(&language, ch)
                } else {
                    None
                };
                let text = match punctuated {
                    Some(text) => text,
                    None if self.full_width() => to_fullwidth(ch).to_string(),
                    None => ch.to_string(),
                };
                self.commit(text);
            }
            Action::Swallow => {}
            Action::Forward => {
                self.forward(key);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn keyboard_key(&self, key: &Key) -> bool {
        match key.printable() {
            Some(ch) => {
                self.commit(ch.to_string());
                true
            }
            None => {
                self.forward(key);
                false
            }
        }
    }

    fn forward(&self, key: &Key) {
        self.events.emit(EngineEvent::RawKeyForwarded {
            code: key.sym.code() as i32,
            symbol: key.to_string(),
        });
    }

    fn enter_mode(&mut self, ic: InputContextId, mode: PanelMode) -> Result<(), EngineError> {
        let panel = self.panel_mut(ic)?;
        panel.clear();
        panel.mode = mode;
        self.refresh_candidates(ic)?;
        self.publish(ic);
        Ok(())
    }

    // ========== Configuration ==========

    fn slot(&self, target: &ConfigTarget) -> Option<Slot> {
        match target {
            ConfigTarget::Global => Some(Slot::Global),
            ConfigTarget::Addon(name) => self
                .addon_configs
                .contains_key(name)
                .then(|| Slot::Addon(name.clone())),
            ConfigTarget::InputMethod(name) => {
                if self.im_configs.contains_key(name) {
                    return Some(Slot::InputMethod(name.clone()));
                }
                let entry = catalog::input_method_entry(name)?;
                (entry.addon == *name && self.addon_configs.contains_key(name))
                    .then(|| Slot::Addon(name.clone()))
            }
        }
    }

    fn save_slot(&mut self, slot: &Slot) -> Result<(), EngineError> {
        let (key, set) = match slot {
            Slot::Global => {
                self.store.save_overrides(&self.overrides)?;
                self.probe.saved(storage::OVERRIDES_KEY);
                (storage::GLOBAL_KEY.to_string(), &self.global)
            }
            Slot::Addon(name) => (
                storage::addon_key(name),
                self.addon_configs
                    .get(name)
                    .ok_or_else(|| anyhow!("no configuration for addon `{name}`"))?,
            ),
            Slot::InputMethod(name) => (
                storage::input_method_key(name),
                self.im_configs
                    .get(name)
                    .ok_or_else(|| anyhow!("no configuration for input method `{name}`"))?,
            ),
        };
        self.store.save_config(&key, set)?;
        self.probe.saved(&key);
        Ok(())
    }
}

impl Engine for MemoryEngine {
    // ========== Addons ==========

    fn load_addon(&mut self, name: &str, load: bool) -> bool {
        let Some(info) = catalog::addon_info(name) else {
            debug!(addon = name, "unknown addon");
            return false;
        };
        if !self.is_enabled(info) {
            debug!(addon = name, "addon is disabled");
            return false;
        }
        if self.loaded.contains(name) {
            return true;
        }
        if !load {
            return false;
        }
        info!(addon = name, "loading addon");
        self.loaded.insert(name.to_string());
        true
    }

    fn addon_names(&self, category: AddonCategory) -> Vec<String> {
        catalog::ADDONS
            .iter()
            .filter(|a| a.category == category)
            .map(|a| a.unique_name.clone())
            .collect()
    }

    fn addon_info(&self, name: &str) -> Option<AddonInfo> {
        catalog::addon_info(name).cloned()
    }

    fn addon_overrides(&self) -> &AddonOverrides {
        &self.overrides
    }

    fn set_addon_overrides(&mut self, overrides: AddonOverrides) {
        self.overrides = overrides;
    }

    // ========== Primary frontend ==========

    fn create_input_context(&mut self, program: &str) -> Result<InputContextId, EngineError> {
        if !self.loaded.contains(FRONTEND) {
            return Err(EngineError::FrontendUnavailable(FRONTEND.to_string()));
        }
        let ic = InputContextId(self.next_ic);
        self.next_ic += 1;
        self.contexts.insert(ic.0, Panel::new());
        info!(%ic, program, "input context created");
        self.announce_input_method();
        Ok(ic)
    }

    fn key_event(&mut self, ic: InputContextId, key: &Key) -> Result<bool, EngineError> {
        if self.faults.take_if(|f| *f == Fault::KeyError).is_some() {
            return Err(EngineError::Other(anyhow!("injected key failure on {key}")));
        }
        let mode = self.panel(ic)?.mode;
        if mode == PanelMode::Normal && self.current_entry().addon == KEYBOARD {
            return Ok(self.keyboard_key(key));
        }
        self.compose_key(ic, key)
    }

    fn select_candidate(&mut self, ic: InputContextId, index: usize) -> Result<(), EngineError> {
        let panel = self.panel_mut(ic)?;
        let Some(text) = panel.candidates.get(index).cloned() else {
            debug!(index, "no candidate at index");
            return Ok(());
        };
        panel.clear();
        self.commit(text);
        self.publish(ic);
        Ok(())
    }

    fn is_input_panel_empty(&self, ic: InputContextId) -> bool {
        self.panel(ic).map(Panel::is_empty).unwrap_or(true)
    }

    fn reset_input_panel(&mut self, ic: InputContextId) -> Result<(), EngineError> {
        self.panel_mut(ic)?.clear();
        self.publish(ic);
        Ok(())
    }

    fn reposition_cursor(&mut self, ic: InputContextId, position: i32) -> Result<(), EngineError> {
        if self.panel_mut(ic)?.set_cursor(position) {
            self.publish(ic);
        } else {
            debug!(position, "cursor position out of range");
        }
        Ok(())
    }

    fn focus_input_context(&mut self, ic: InputContextId, focus: bool) -> Result<(), EngineError> {
        let panel = self.panel_mut(ic)?;
        panel.focused = focus;
        if !focus && !panel.is_empty() {
            panel.clear();
            self.publish(ic);
        }
        Ok(())
    }

    // ========== Input methods ==========

    fn current_group(&self) -> InputMethodGroup {
        self.group.clone()
    }

    fn set_group(&mut self, group: InputMethodGroup) {
        debug!(name = %group.name, methods = ?group.input_methods, "input method group replaced");
        self.group = group;
        if self.group.input_methods.contains(&self.current_im) {
            return;
        }
        let next = self
            .group
            .input_methods
            .iter()
            .find(|name| catalog::input_method_entry(name).is_some())
            .cloned();
        if let Some(next) = next {
            self.current_im = next;
            self.announce_input_method();
        }
    }

    fn input_method_entry(&self, name: &str) -> Option<InputMethodEntry> {
        catalog::input_method_entry(name).cloned()
    }

    fn input_method_entries(&self) -> Vec<InputMethodEntry> {
        catalog::INPUT_METHODS.clone()
    }

    fn set_current_input_method(&mut self, ic: InputContextId, name: &str) -> Result<(), EngineError> {
        let entry = catalog::input_method_entry(name)
            .ok_or_else(|| EngineError::UnknownInputMethod(name.to_string()))?;
        if !self.load_addon(&entry.addon, true) {
            return Err(EngineError::Other(anyhow!(
                "engine `{}` of input method `{name}` is unavailable",
                entry.addon
            )));
        }
        self.panel_mut(ic)?.clear();
        self.current_im = name.to_string();
        self.publish(ic);
        self.announce_input_method();
        Ok(())
    }

    fn input_method_status(&self, ic: InputContextId) -> Option<InputMethodStatus> {
        self.panel(ic).ok()?;
        self.status()
    }

    // ========== Configuration ==========

    fn configuration(&mut self, target: &ConfigTarget) -> Option<&mut dyn Configuration> {
        match self.slot(target)? {
            Slot::Global => Some(&mut self.global as &mut dyn Configuration),
            Slot::Addon(name) => self
                .addon_configs
                .get_mut(&name)
                .map(|set| set as &mut dyn Configuration),
            Slot::InputMethod(name) => self
                .im_configs
                .get_mut(&name)
                .map(|set| set as &mut dyn Configuration),
        }
    }

    fn save_configuration(&mut self, target: &ConfigTarget) -> Result<(), EngineError> {
        let slot = self
            .slot(target)
            .ok_or_else(|| anyhow!("no configuration for {target}"))?;
        self.save_slot(&slot)
    }

    fn save_input_methods(&mut self) -> Result<(), EngineError> {
        self.store.save_group(&self.group)?;
        self.probe.saved(storage::GROUP_KEY);
        Ok(())
    }

    fn save_all_addons(&mut self) -> Result<(), EngineError> {
        let addons: Vec<String> = self.addon_configs.keys().cloned().collect();
        for name in addons {
            self.save_slot(&Slot::Addon(name))?;
        }
        let input_methods: Vec<String> = self.im_configs.keys().cloned().collect();
        for name in input_methods {
            self.save_slot(&Slot::InputMethod(name))?;
        }
        Ok(())
    }

    fn reload_config(&mut self) {
        if let Err(err) = self.store.restore_config(storage::GLOBAL_KEY, &mut self.global) {
            warn!(error = %err, "reloading global config failed");
        }
        match self.store.restore_overrides() {
            Ok(Some(overrides)) => self.overrides = overrides,
            Ok(None) => {}
            Err(err) => warn!(error = %err, "reloading addon overrides failed"),
        }

        let overrides = &self.overrides;
        self.loaded.retain(|name| {
            catalog::addon_info(name)
                .is_some_and(|info| overrides.effective(name, info.default_enabled))
        });
        self.load_startup_addons();
        self.probe.0.lock().reloads += 1;
        info!(loaded = ?self.loaded, "configuration reloaded");
    }

    // ========== Companion modules ==========

    fn punctuation(&self) -> Option<Arc<dyn PunctuationLookup>> {
        if self.loaded.contains(PUNCTUATION) {
            Some(self.punctuation.clone() as Arc<dyn PunctuationLookup>)
        } else {
            None
        }
    }

    fn trigger_quick_phrase(&mut self, ic: InputContextId) -> Result<(), EngineError> {
        if !self.loaded.contains(QUICK_PHRASE) {
            debug!("quick phrase not loaded");
            return Ok(());
        }
        self.enter_mode(ic, PanelMode::QuickPhrase)
    }

    fn trigger_unicode(&mut self, ic: InputContextId) -> Result<(), EngineError> {
        if !self.loaded.contains(UNICODE) {
            debug!("unicode not loaded");
            return Ok(());
        }
        self.enter_mode(ic, PanelMode::Unicode)
    }

    // ========== Run loop ==========

    fn pump(&mut self) -> Result<LoopStep, EngineError> {
        match self.faults.take_if(|f| *f != Fault::KeyError) {
            Some(Fault::Quiet) => Err(EngineError::QuietQuit),
            Some(Fault::Crash(message)) => Err(EngineError::Other(anyhow!(message))),
            Some(Fault::Finish) => Ok(LoopStep::Exit),
            Some(Fault::KeyError) | None => Ok(LoopStep::Continue),
        }
    }

    fn exit(&mut self) {
        for panel in self.contexts.values_mut() {
            panel.clear();
        }
        self.probe.0.lock().exited = true;
        info!(clipboard_loaded = self.loaded.contains(CLIPBOARD), "memory engine exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imebridge_core::events::{self, EventReceiver};

    fn engine_with(builder: MemoryEngineBuilder) -> (MemoryEngine, EventReceiver, InputContextId) {
        let (emitter, receiver) = events::channel();
        let mut engine = builder.build(emitter).unwrap();
        assert!(engine.load_addon(FRONTEND, true));
        let ic = engine.create_input_context("test").unwrap();
        receiver.drain();
        (engine, receiver, ic)
    }

    fn engine() -> (MemoryEngine, EventReceiver, InputContextId) {
        engine_with(MemoryEngine::builder())
    }

    fn commits(events: &[EngineEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::StringCommitted(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn type_str(engine: &mut MemoryEngine, ic: InputContextId, keys: &str) {
        for ch in keys.chars() {
            engine.key_event(ic, &Key::from_char(ch)).unwrap();
        }
    }

    #[test]
    fn test_keyboard_commits_and_forwards() {
        let (mut engine, events, ic) = engine();
        assert_eq!(engine.current_input_method(), "keyboard-us");
        assert!(engine.key_event(ic, &Key::from_char('x')).unwrap());
        assert!(!engine.key_event(ic, &"Control+c".parse().unwrap()).unwrap());
        let seen = events.drain();
        assert_eq!(commits(&seen), vec!["x".to_string()]);
        assert!(matches!(
            seen.last(),
            Some(EngineEvent::RawKeyForwarded { symbol, .. }) if symbol == "Control+c"
        ));
    }

    #[test]
    fn test_pinyin_composes_and_selects() {
        let (mut engine, events, ic) = engine();
        engine.set_current_input_method(ic, "pinyin").unwrap();
        type_str(&mut engine, ic, "nihao");
        assert!(!engine.is_input_panel_empty(ic));
        assert!(events.drain().contains(&EngineEvent::CandidateListUpdated(vec!["你好".into()])));

        engine.key_event(ic, &Key::from_char(' ')).unwrap();
        assert!(engine.is_input_panel_empty(ic));
        assert_eq!(commits(&events.drain()), vec!["你好".to_string()]);
    }

    #[test]
    fn test_pinyin_punctuation_commits_pending_first() {
        let (mut engine, events, ic) = engine();
        engine.set_current_input_method(ic, "pinyin").unwrap();
        type_str(&mut engine, ic, "wo,");
        assert_eq!(commits(&events.drain()), vec!["我".to_string(), "，".to_string()]);
    }

    #[test]
    fn test_unicode_mode() {
        let (mut engine, events, ic) = engine();
        engine.trigger_unicode(ic).unwrap();
        type_str(&mut engine, ic, "4f60");
        engine.key_event(ic, &Key::from_char(' ')).unwrap();
        assert_eq!(commits(&events.drain()), vec!["你".to_string()]);
        assert!(engine.is_input_panel_empty(ic));
    }

    #[test]
    fn test_quick_phrase_mode() {
        let (mut engine, events, ic) = engine();
        engine.trigger_quick_phrase(ic).unwrap();
        type_str(&mut engine, ic, "arrow");
        engine.key_event(ic, &Key::from_char('2')).unwrap();
        assert_eq!(commits(&events.drain()), vec!["←".to_string()]);
    }

    #[test]
    fn test_disabled_addon_cannot_load() {
        let mut overrides = AddonOverrides::default();
        overrides.disabled.insert(PUNCTUATION.into());
        let (emitter, _events) = events::channel();
        let mut engine = MemoryEngine::builder().overrides(overrides).build(emitter).unwrap();
        assert!(!engine.load_addon(PUNCTUATION, true));
        assert!(engine.punctuation().is_none());
        assert!(!engine.load_addon(CLIPBOARD, true));
        assert!(!engine.load_addon("ghost", true));
    }

    #[test]
    fn test_on_demand_addon_loads_only_when_asked() {
        let mut overrides = AddonOverrides::default();
        overrides.enabled.insert(CLIPBOARD.into());
        let (emitter, _events) = events::channel();
        let mut engine = MemoryEngine::builder().overrides(overrides).build(emitter).unwrap();
        assert!(!engine.load_addon(CLIPBOARD, false));
        assert!(engine.load_addon(CLIPBOARD, true));
        assert!(engine.load_addon(CLIPBOARD, false));
    }

    #[test]
    fn test_pinyin_shares_addon_configuration() {
        let (mut engine, _events, _ic) = engine();
        let mut tree = imebridge_core::ConfigTree::new();
        tree.set_value_at("FullWidth", "True");
        engine
            .configuration(&ConfigTarget::InputMethod("pinyin".into()))
            .unwrap()
            .load(&tree, tree.root())
            .unwrap();
        assert!(engine.full_width());
        assert!(engine.configuration(&ConfigTarget::InputMethod("keyboard-us".into())).is_none());
        assert!(engine.configuration(&ConfigTarget::InputMethod("shuangpin".into())).is_some());
    }

    #[test]
    fn test_faults_fire_once() {
        let faults = FaultSwitch::new();
        let (mut engine, _events, ic) = engine_with(MemoryEngine::builder().faults(faults.clone()));
        faults.trip(Fault::KeyError);
        assert!(engine.pump().is_ok());
        assert!(engine.key_event(ic, &Key::from_char('a')).is_err());
        assert!(engine.key_event(ic, &Key::from_char('a')).is_ok());

        faults.trip(Fault::Quiet);
        assert!(engine.pump().unwrap_err().is_quiet_quit());
        assert_eq!(engine.pump().unwrap(), LoopStep::Continue);
    }

    #[test]
    fn test_fullwidth_helper() {
        assert_eq!(to_fullwidth('a'), 'ａ');
        assert_eq!(to_fullwidth(' '), '\u{3000}');
        assert_eq!(to_fullwidth('你'), '你');
    }
}
