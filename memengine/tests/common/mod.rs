//! Shared harness: runs a bridge over the memory engine on its own owner
//! thread and records every delivered event.

#![allow(dead_code)]

use imebridge_core::{Bridge, BridgeSettings, CallbackRegistry, EngineEvent, ExitStatus};
use memengine::{MemoryEngine, MemoryEngineBuilder};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn settings() -> BridgeSettings {
    BridgeSettings {
        program_name: "harness".into(),
        idle_wakeup_ms: 10,
        ..BridgeSettings::default()
    }
}

pub struct Harness {
    pub bridge: Arc<Bridge>,
    pub events: Arc<Mutex<Vec<EngineEvent>>>,
    owner: Option<JoinHandle<ExitStatus>>,
}

impl Harness {
    /// Start and wait until running.
    pub fn start(builder: MemoryEngineBuilder) -> Self {
        let harness = Self::spawn(Arc::new(Bridge::new(settings())), builder);
        assert!(harness.bridge.wait_until_running(WAIT), "bridge did not start");
        harness
    }

    pub fn start_default() -> Self {
        Self::start(MemoryEngine::builder())
    }

    /// Run `startup` on a fresh owner thread without waiting for it.
    pub fn spawn(bridge: Arc<Bridge>, builder: MemoryEngineBuilder) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let owner = {
            let bridge = Arc::clone(&bridge);
            let sink = Arc::clone(&events);
            thread::spawn(move || {
                let callbacks = CallbackRegistry::new().forward_all(move |e| sink.lock().push(e));
                bridge.startup(builder.into_factory(), callbacks)
            })
        };
        Self {
            bridge,
            events,
            owner: Some(owner),
        }
    }

    /// Wait for the owner thread to return.
    pub fn join(&mut self) -> ExitStatus {
        self.owner
            .take()
            .expect("already joined")
            .join()
            .expect("owner thread panicked")
    }

    /// Request exit and wait for the run to end.
    pub fn stop(&mut self) -> ExitStatus {
        self.bridge.exit();
        self.join()
    }

    /// Settle the queue, then take everything delivered so far.
    pub fn take_events(&self) -> Vec<EngineEvent> {
        self.bridge.sync();
        std::mem::take(&mut *self.events.lock())
    }

    pub fn commits(&self) -> Vec<String> {
        self.take_events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::StringCommitted(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn type_str(&self, text: &str) {
        for ch in text.chars() {
            self.bridge.send_char(ch);
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            self.bridge.exit();
            let _ = owner.join();
        }
    }
}
