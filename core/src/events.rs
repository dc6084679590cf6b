//! Outbound engine events and the callback registry that delivers them.
//!
//! The engine pushes [`EngineEvent`]s into an [`EventEmitter`]; the owner
//! loop drains them after every command and every engine turn and hands them
//! to the [`CallbackRegistry`]. Callbacks therefore always run on the owner
//! thread; re-dispatching to other threads is the caller's business.
//!
//! The registry guarantees that `ready` is the first event any callback
//! sees: anything emitted before it is held back and delivered right after.

use crate::engine::InputMethodStatus;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Asynchronous event pushed from the engine to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    CandidateListUpdated(Vec<String>),
    StringCommitted(String),
    PreeditUpdated {
        preedit: String,
        client_preedit: String,
        cursor: i32,
    },
    AuxTextUpdated {
        aux_up: String,
        aux_down: String,
    },
    Ready,
    RawKeyForwarded {
        code: i32,
        symbol: String,
    },
    InputMethodChanged(Option<InputMethodStatus>),
}

impl EngineEvent {
    /// Numeric channel code used at the caller boundary.
    pub fn code(&self) -> i32 {
        match self {
            EngineEvent::CandidateListUpdated(_) => 0,
            EngineEvent::StringCommitted(_) => 1,
            EngineEvent::PreeditUpdated { .. } => 2,
            EngineEvent::AuxTextUpdated { .. } => 3,
            EngineEvent::Ready => 4,
            EngineEvent::RawKeyForwarded { .. } => 5,
            EngineEvent::InputMethodChanged(_) => 6,
        }
    }

    pub fn channel(&self) -> &'static str {
        match self {
            EngineEvent::CandidateListUpdated(_) => "candidateListUpdated",
            EngineEvent::StringCommitted(_) => "stringCommitted",
            EngineEvent::PreeditUpdated { .. } => "preeditUpdated",
            EngineEvent::AuxTextUpdated { .. } => "auxTextUpdated",
            EngineEvent::Ready => "ready",
            EngineEvent::RawKeyForwarded { .. } => "rawKeyForwarded",
            EngineEvent::InputMethodChanged(_) => "inputMethodChanged",
        }
    }
}

/// Engine-side handle for emitting events.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: Sender<EngineEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: EngineEvent) {
        // The receiver lives as long as the run; a send after teardown has
        // nobody to deliver to.
        if self.tx.send(event).is_err() {
            debug!("event dropped after teardown");
        }
    }
}

/// Receiving end of the event channel. The owner loop drains it; engine
/// tests can use it directly.
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<EngineEvent>,
}

impl EventReceiver {
    /// Everything emitted so far, in emission order.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.rx.try_iter().collect()
    }
}

pub fn channel() -> (EventEmitter, EventReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (EventEmitter { tx }, EventReceiver { rx })
}

type ReadyFn = Box<dyn FnMut() + Send>;
type CandidatesFn = Box<dyn FnMut(&[String]) + Send>;
type CommitFn = Box<dyn FnMut(&str) + Send>;
type PreeditFn = Box<dyn FnMut(&str, &str, i32) + Send>;
type AuxFn = Box<dyn FnMut(&str, &str) + Send>;
type RawKeyFn = Box<dyn FnMut(i32, &str) + Send>;
type ImChangedFn = Box<dyn FnMut(Option<&InputMethodStatus>) + Send>;

/// Registered outbound callbacks, one per named channel.
///
/// Each channel is registered once; a second registration on the same
/// channel is ignored. Channels without a callback drop their events.
#[derive(Default)]
pub struct CallbackRegistry {
    ready: Option<ReadyFn>,
    candidates: Option<CandidatesFn>,
    commit: Option<CommitFn>,
    preedit: Option<PreeditFn>,
    aux: Option<AuxFn>,
    raw_key: Option<RawKeyFn>,
    im_changed: Option<ImChangedFn>,
    ready_fired: bool,
    held: Vec<EngineEvent>,
}

fn register<T>(slot: &mut Option<T>, value: T, channel: &str) {
    if slot.is_some() {
        warn!(channel, "callback already registered, ignoring");
        return;
    }
    *slot = Some(value);
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ready(mut self, f: impl FnMut() + Send + 'static) -> Self {
        register(&mut self.ready, Box::new(f), "ready");
        self
    }

    pub fn on_candidate_list(mut self, f: impl FnMut(&[String]) + Send + 'static) -> Self {
        register(&mut self.candidates, Box::new(f), "candidateListUpdated");
        self
    }

    pub fn on_commit(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        register(&mut self.commit, Box::new(f), "stringCommitted");
        self
    }

    pub fn on_preedit(mut self, f: impl FnMut(&str, &str, i32) + Send + 'static) -> Self {
        register(&mut self.preedit, Box::new(f), "preeditUpdated");
        self
    }

    pub fn on_aux_text(mut self, f: impl FnMut(&str, &str) + Send + 'static) -> Self {
        register(&mut self.aux, Box::new(f), "auxTextUpdated");
        self
    }

    pub fn on_raw_key(mut self, f: impl FnMut(i32, &str) + Send + 'static) -> Self {
        register(&mut self.raw_key, Box::new(f), "rawKeyForwarded");
        self
    }

    pub fn on_input_method_changed(
        mut self,
        f: impl FnMut(Option<&InputMethodStatus>) + Send + 'static,
    ) -> Self {
        register(&mut self.im_changed, Box::new(f), "inputMethodChanged");
        self
    }

    /// Route every event to one closure. Registers all seven channels.
    pub fn forward_all(self, f: impl FnMut(EngineEvent) + Send + 'static) -> Self {
        let shared = Arc::new(Mutex::new(f));
        let s = shared.clone();
        let this = self.on_ready(move || (*s.lock())(EngineEvent::Ready));
        let s = shared.clone();
        let this = this.on_candidate_list(move |c| (*s.lock())(EngineEvent::CandidateListUpdated(c.to_vec())));
        let s = shared.clone();
        let this = this.on_commit(move |t| (*s.lock())(EngineEvent::StringCommitted(t.to_string())));
        let s = shared.clone();
        let this = this.on_preedit(move |p, c, cursor| {
            (*s.lock())(EngineEvent::PreeditUpdated {
                preedit: p.to_string(),
                client_preedit: c.to_string(),
                cursor,
            })
        });
        let s = shared.clone();
        let this = this.on_aux_text(move |up, down| {
            (*s.lock())(EngineEvent::AuxTextUpdated {
                aux_up: up.to_string(),
                aux_down: down.to_string(),
            })
        });
        let s = shared.clone();
        let this = this.on_raw_key(move |code, sym| {
            (*s.lock())(EngineEvent::RawKeyForwarded {
                code,
                symbol: sym.to_string(),
            })
        });
        this.on_input_method_changed(move |status| {
            (*shared.lock())(EngineEvent::InputMethodChanged(status.cloned()))
        })
    }

    pub fn ready_fired(&self) -> bool {
        self.ready_fired
    }

    /// Deliver one event. Events other than `Ready` are held until `Ready`
    /// has been delivered; a repeated `Ready` is dropped.
    pub fn dispatch(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Ready if self.ready_fired => {
                warn!("ready already delivered, dropping duplicate");
            }
            EngineEvent::Ready => {
                self.ready_fired = true;
                self.deliver(EngineEvent::Ready);
                for held in std::mem::take(&mut self.held) {
                    self.deliver(held);
                }
            }
            other if !self.ready_fired => self.held.push(other),
            other => self.deliver(other),
        }
    }

    fn deliver(&mut self, event: EngineEvent) {
        debug!(channel = event.channel(), code = event.code(), "delivering event");
        match event {
            EngineEvent::Ready => {
                if let Some(f) = self.ready.as_mut() {
                    f();
                }
            }
            EngineEvent::CandidateListUpdated(list) => {
                if let Some(f) = self.candidates.as_mut() {
                    f(&list);
                }
            }
            EngineEvent::StringCommitted(text) => {
                if let Some(f) = self.commit.as_mut() {
                    f(&text);
                }
            }
            EngineEvent::PreeditUpdated {
                preedit,
                client_preedit,
                cursor,
            } => {
                if let Some(f) = self.preedit.as_mut() {
                    f(&preedit, &client_preedit, cursor);
                }
            }
            EngineEvent::AuxTextUpdated { aux_up, aux_down } => {
                if let Some(f) = self.aux.as_mut() {
                    f(&aux_up, &aux_down);
                }
            }
            EngineEvent::RawKeyForwarded { code, symbol } => {
                if let Some(f) = self.raw_key.as_mut() {
                    f(code, &symbol);
                }
            }
            EngineEvent::InputMethodChanged(status) => {
                if let Some(f) = self.im_changed.as_mut() {
                    f(status.as_ref());
                }
            }
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("ready", &self.ready.is_some())
            .field("candidates", &self.candidates.is_some())
            .field("commit", &self.commit.is_some())
            .field("preedit", &self.preedit.is_some())
            .field("aux", &self.aux.is_some())
            .field("raw_key", &self.raw_key.is_some())
            .field("im_changed", &self.im_changed.is_some())
            .field("ready_fired", &self.ready_fired)
            .field("held", &self.held.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (CallbackRegistry, Arc<Mutex<Vec<EngineEvent>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let registry = CallbackRegistry::new().forward_all(move |e| sink.lock().push(e));
        (registry, log)
    }

    #[test]
    fn test_events_before_ready_are_held() {
        let (mut registry, log) = recording();
        registry.dispatch(EngineEvent::StringCommitted("early".into()));
        assert!(log.lock().is_empty());

        registry.dispatch(EngineEvent::Ready);
        registry.dispatch(EngineEvent::StringCommitted("late".into()));
        assert_eq!(
            *log.lock(),
            vec![
                EngineEvent::Ready,
                EngineEvent::StringCommitted("early".into()),
                EngineEvent::StringCommitted("late".into()),
            ]
        );
    }

    #[test]
    fn test_duplicate_ready_is_dropped() {
        let (mut registry, log) = recording();
        registry.dispatch(EngineEvent::Ready);
        registry.dispatch(EngineEvent::Ready);
        assert_eq!(log.lock().len(), 1);
        assert!(registry.ready_fired());
    }

    #[test]
    fn test_second_registration_is_ignored() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (hits.clone(), hits.clone());
        let mut registry = CallbackRegistry::new()
            .on_commit(move |t| a.lock().push(format!("first:{t}")))
            .on_commit(move |t| b.lock().push(format!("second:{t}")));
        registry.dispatch(EngineEvent::Ready);
        registry.dispatch(EngineEvent::StringCommitted("x".into()));
        assert_eq!(*hits.lock(), vec!["first:x".to_string()]);
    }

    #[test]
    fn test_unregistered_channels_drop_events() {
        let mut registry = CallbackRegistry::new();
        registry.dispatch(EngineEvent::Ready);
        registry.dispatch(EngineEvent::AuxTextUpdated {
            aux_up: "a".into(),
            aux_down: "b".into(),
        });
        assert!(registry.ready_fired());
    }

    #[test]
    fn test_channel_codes() {
        assert_eq!(EngineEvent::CandidateListUpdated(vec![]).code(), 0);
        assert_eq!(EngineEvent::Ready.code(), 4);
        assert_eq!(EngineEvent::InputMethodChanged(None).code(), 6);
    }

    #[test]
    fn test_emitter_feeds_receiver_in_order() {
        let (emitter, receiver) = channel();
        emitter.emit(EngineEvent::StringCommitted("a".into()));
        emitter.emit(EngineEvent::StringCommitted("b".into()));
        assert_eq!(
            receiver.drain(),
            vec![
                EngineEvent::StringCommitted("a".into()),
                EngineEvent::StringCommitted("b".into()),
            ]
        );
        assert!(receiver.drain().is_empty());
    }
}
