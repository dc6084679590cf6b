//! Startup, the owner-thread loop, and teardown.
//!
//! `NotStarted -> Starting -> Running -> Exiting -> Stopped`, and back to
//! `Starting` on the next startup. The thread that calls
//! [`Bridge::startup`] owns the engine for the whole run and returns only
//! when the run is over.

use crate::addon::reconcile;
use crate::command::Command;
use crate::config_tree::{merge_config_desc, ConfigTree};
use crate::dispatcher::{self, CommandQueue, CommandSender, Flow};
use crate::engine::{ConfigTarget, Engine, EngineFactory, InputContextId, InputMethodGroup, LoopStep};
use crate::error::EngineError;
use crate::events::{self, CallbackRegistry, EngineEvent, EventReceiver};
use crate::facade::{Bridge, Companions, Live};
use crate::view::EngineView;
use anyhow::anyhow;
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    NotStarted,
    Starting,
    Running,
    Exiting,
    Stopped,
}

/// How a call to [`Bridge::startup`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Explicit exit, engine-initiated finish, or quiet quit.
    Clean,
    /// The run ended on an engine failure.
    Failed,
    /// Rejected: a run is already in progress. Nothing was changed.
    AlreadyRunning,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::Failed => 1,
            ExitStatus::AlreadyRunning => 2,
        }
    }
}

impl Bridge {
    /// Build the engine on the calling thread and run it until exit.
    pub fn startup<F: EngineFactory>(&self, factory: F, callbacks: CallbackRegistry) -> ExitStatus {
        // Bumped under the state lock, paired with `Bridge::wait_until_running`.
        let generation = {
            let mut state = self.state.lock();
            if matches!(
                *state,
                LifecycleState::Starting | LifecycleState::Running | LifecycleState::Exiting
            ) {
                warn!(state = ?*state, "startup rejected, bridge already running");
                return ExitStatus::AlreadyRunning;
            }
            *state = LifecycleState::Starting;
            self.state_changed.notify_all();
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        let _teardown = Teardown { bridge: self };
        info!(generation, "starting bridge");

        let (emitter, events) = events::channel();
        let engine = match factory.build(emitter) {
            Ok(engine) => engine,
            Err(err) => {
                error!(generation, error = %err, "engine construction failed");
                return ExitStatus::Failed;
            }
        };

        let (sender, queue) = dispatcher::channel();
        sender.enqueue(Command::Bootstrap);
        let mut owner = Owner {
            bridge: self,
            generation,
            engine,
            sender,
            events,
            callbacks,
            ic: None,
            live: None,
            halt: None,
        };
        let status = owner.run(&queue);
        info!(generation, code = status.code(), "bridge stopped");
        status
    }
}

/// Withdraws the shared state however the run ends.
struct Teardown<'a> {
    bridge: &'a Bridge,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.bridge.live.store(None);
        self.bridge.set_state(LifecycleState::Stopped);
    }
}

/// State that lives on the owner thread for one run.
struct Owner<'a> {
    bridge: &'a Bridge,
    generation: u64,
    engine: Box<dyn Engine>,
    sender: CommandSender<Command>,
    events: EventReceiver,
    callbacks: CallbackRegistry,
    ic: Option<InputContextId>,
    live: Option<Arc<Live>>,
    halt: Option<ExitStatus>,
}

impl Owner<'_> {
    fn run(&mut self, queue: &CommandQueue<Command>) -> ExitStatus {
        let idle = Duration::from_millis(self.bridge.settings.idle_wakeup_ms);
        let status = loop {
            let timeout = self.engine.next_wakeup().unwrap_or(idle).min(idle);
            queue.run_batch(timeout, |command| self.apply(command));
            if let Some(status) = self.halt.take() {
                break status;
            }

            match self.engine.pump() {
                Ok(LoopStep::Continue) => {}
                Ok(LoopStep::Exit) => {
                    info!(generation = self.generation, "engine finished its run");
                    break ExitStatus::Clean;
                }
                Err(err) if err.is_quiet_quit() => {
                    info!(generation = self.generation, "engine quit quietly");
                    break ExitStatus::Clean;
                }
                Err(err) => {
                    error!(generation = self.generation, error = %err, "engine run loop failed");
                    break ExitStatus::Failed;
                }
            }
            self.settle();
        };

        self.withdraw();
        let dropped = queue.discard();
        if dropped > 0 {
            debug!(dropped, "discarded commands queued behind exit");
        }
        self.deliver_events();
        status
    }

    fn apply(&mut self, command: Command) -> Flow {
        let name = command.name();
        debug!(command = name, "applying");
        match command {
            Command::Bootstrap => {
                if let Err(err) = self.bootstrap() {
                    error!(error = %err, "bootstrap failed");
                    self.halt = Some(ExitStatus::Failed);
                }
            }
            Command::Exit => {
                self.shutdown();
                self.halt = Some(ExitStatus::Clean);
            }
            other => match self.execute(other) {
                Ok(()) => {}
                Err(err) if err.is_quiet_quit() => {
                    info!(command = name, "engine quit quietly");
                    self.halt = Some(ExitStatus::Clean);
                }
                Err(err) => warn!(command = name, error = %err, "command failed"),
            },
        }
        if self.halt.is_some() {
            return Flow::Halt;
        }
        self.settle();
        Flow::Continue
    }

    /// Deliver pending events and republish the snapshot.
    fn settle(&mut self) {
        self.deliver_events();
        if let (Some(live), Some(ic)) = (&self.live, self.ic) {
            live.view.store(Arc::new(EngineView::capture(self.engine.as_ref(), ic)));
        }
    }

    fn deliver_events(&mut self) {
        for event in self.events.drain() {
            self.callbacks.dispatch(event);
        }
    }

    fn withdraw(&mut self) {
        self.live = None;
        self.bridge.live.store(None);
    }

    fn shutdown(&mut self) {
        // Nothing enqueued after this point may run.
        self.withdraw();
        self.bridge.set_state(LifecycleState::Exiting);
        info!(generation = self.generation, "exiting");
        self.engine.exit();
    }

    fn bootstrap(&mut self) -> Result<(), EngineError> {
        let bridge = self.bridge;
        let settings = &bridge.settings;
        if !self.engine.load_addon(&settings.frontend_addon, true) {
            return Err(EngineError::FrontendUnavailable(settings.frontend_addon.clone()));
        }
        let ic = self.engine.create_input_context(&settings.program_name)?;

        let quick_phrase = self.engine.load_addon(&settings.quick_phrase_addon, false);
        let punctuation = if self.engine.load_addon(&settings.punctuation_addon, true) {
            self.engine.punctuation()
        } else {
            None
        };
        let unicode = self.engine.load_addon(&settings.unicode_addon, false);
        let companions = Companions {
            quick_phrase,
            unicode,
            punctuation,
        };
        debug!(?companions, "companions resolved");

        let live = Arc::new(Live {
            generation: self.generation,
            owner: thread::current().id(),
            commands: self.sender.clone(),
            view: ArcSwap::from_pointee(EngineView::capture(self.engine.as_ref(), ic)),
            companions,
        });
        self.ic = Some(ic);
        self.live = Some(live.clone());
        bridge.live.store(Some(live));
        bridge.set_state(LifecycleState::Running);
        info!(generation = self.generation, %ic, "bridge running");

        self.callbacks.dispatch(EngineEvent::Ready);
        Ok(())
    }

    fn ic(&self) -> Result<InputContextId, EngineError> {
        self.ic
            .ok_or_else(|| EngineError::Other(anyhow!("no input context")))
    }

    fn execute(&mut self, command: Command) -> Result<(), EngineError> {
        let name = command.name();
        match command {
            Command::KeySend(key) => {
                let ic = self.ic()?;
                let consumed = self.engine.key_event(ic, &key)?;
                debug!(%key, consumed, "key delivered");
            }
            Command::CandidateSelect(index) => {
                let ic = self.ic()?;
                self.engine.select_candidate(ic, index)?;
            }
            Command::ResetPanel => {
                let ic = self.ic()?;
                self.engine.reset_input_panel(ic)?;
            }
            Command::RepositionCursor(position) => {
                let ic = self.ic()?;
                self.engine.reposition_cursor(ic, position)?;
            }
            Command::FocusChange(focus) => {
                let ic = self.ic()?;
                self.engine.focus_input_context(ic, focus)?;
            }
            Command::SetInputMethod(name) => {
                let ic = self.ic()?;
                self.engine.set_current_input_method(ic, &name)?;
            }
            Command::SetEnabledInputMethods(names) => {
                let current = self.engine.current_group();
                self.engine.set_group(InputMethodGroup {
                    name: current.name,
                    default_layout: self.bridge.settings.default_layout.clone(),
                    input_methods: names,
                });
                self.engine.save_input_methods()?;
            }
            Command::SetGlobalConfig(tree) => {
                if self.load_config(&ConfigTarget::Global, &tree)? {
                    self.engine.save_configuration(&ConfigTarget::Global)?;
                    self.engine.reload_config();
                }
            }
            Command::SetAddonConfig { addon, tree } => {
                let target = ConfigTarget::Addon(addon);
                if self.resolve(&target) && self.load_config(&target, &tree)? {
                    self.engine.save_configuration(&target)?;
                }
            }
            Command::SetInputMethodConfig { input_method, tree } => {
                let target = ConfigTarget::InputMethod(input_method);
                if self.resolve(&target) && self.load_config(&target, &tree)? {
                    self.engine.save_configuration(&target)?;
                }
            }
            Command::SetAddonState(desired) => self.set_addon_state(&desired)?,
            Command::TriggerQuickPhrase => {
                let ic = self.ic()?;
                self.engine.trigger_quick_phrase(ic)?;
            }
            Command::TriggerUnicode => {
                let ic = self.ic()?;
                self.engine.trigger_unicode(ic)?;
            }
            Command::SaveAll => {
                self.engine.save_configuration(&ConfigTarget::Global)?;
                self.engine.save_input_methods()?;
                self.engine.save_all_addons()?;
            }
            Command::FetchConfig { target, reply } => {
                let document = self.fetch_config(&target);
                if reply.send(document).is_err() {
                    debug!(%target, "config requester went away");
                }
            }
            Command::Sync(reply) => {
                // The snapshot is republished before the caller wakes.
                self.settle();
                if reply.send(()).is_err() {
                    debug!("sync requester went away");
                }
            }
            Command::Bootstrap | Command::Exit => {
                warn!(command = name, "lifecycle command outside its slot, ignoring");
            }
        }
        Ok(())
    }

    /// Check the preconditions for reading or writing a non-global
    /// configuration, loading the owning addon on demand.
    fn resolve(&mut self, target: &ConfigTarget) -> bool {
        let addon = match target {
            ConfigTarget::Global => return true,
            ConfigTarget::Addon(name) => match self.engine.addon_info(name) {
                Some(info) if info.configurable => name.clone(),
                Some(_) => {
                    debug!(%target, "addon is not configurable");
                    return false;
                }
                None => {
                    debug!(%target, "unknown addon");
                    return false;
                }
            },
            ConfigTarget::InputMethod(name) => match self.engine.input_method_entry(name) {
                Some(entry) if entry.configurable => entry.addon,
                Some(_) => {
                    debug!(%target, "input method is not configurable");
                    return false;
                }
                None => {
                    debug!(%target, "unknown input method");
                    return false;
                }
            },
        };
        if !self.engine.load_addon(&addon, true) {
            debug!(%target, addon, "owning addon unavailable");
            return false;
        }
        true
    }

    fn fetch_config(&mut self, target: &ConfigTarget) -> Option<ConfigTree> {
        if !self.resolve(target) {
            return None;
        }
        let conf = self.engine.configuration(target)?;
        Some(merge_config_desc(&*conf))
    }

    /// Returns whether the target exposed a configuration to load into.
    fn load_config(&mut self, target: &ConfigTarget, tree: &ConfigTree) -> Result<bool, EngineError> {
        match self.engine.configuration(target) {
            Some(conf) => {
                conf.load(tree, tree.root())?;
                Ok(true)
            }
            None => {
                debug!(%target, "no configuration exposed");
                Ok(false)
            }
        }
    }

    /// Unchanged override sets skip the save and the reload.
    fn set_addon_state(&mut self, desired: &BTreeMap<String, bool>) -> Result<(), EngineError> {
        let engine = self.engine.as_ref();
        let next = reconcile(
            desired,
            |name| engine.addon_info(name).map(|info| info.default_enabled),
            engine.addon_overrides(),
        );
        if &next == self.engine.addon_overrides() {
            debug!("addon overrides unchanged");
            return Ok(());
        }
        debug!(enabled = ?next.enabled, disabled = ?next.disabled, "swapping addon overrides");
        self.engine.set_addon_overrides(next);
        self.engine.save_configuration(&ConfigTarget::Global)?;
        self.engine.reload_config();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Clean.code(), 0);
        assert_eq!(ExitStatus::Failed.code(), 1);
        assert_eq!(ExitStatus::AlreadyRunning.code(), 2);
    }
}
