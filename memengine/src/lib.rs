//! imebridge-memengine
//!
//! In-memory reference engine for `imebridge-core`, plus the `imebridge`
//! interactive CLI.
//!
//! Public API:
//! - `MemoryEngine` / `MemoryEngineBuilder` - Engine implementation and its factory
//! - `FaultSwitch` / `Fault` - Inject run-loop failures in tests
//! - `EngineProbe` - Observe saves, reloads and exit from other threads
//! - `PunctuationTable` - Punctuation companion lookup
//! - `ConfigStore` - TOML persistence of option sets and records

pub mod catalog;

pub mod engine;
pub use engine::{EngineProbe, Fault, FaultSwitch, MemoryEngine, MemoryEngineBuilder, ProbeData};

pub mod panel;
pub use panel::{Panel, PanelMode};

pub mod punctuation;
pub use punctuation::PunctuationTable;

pub mod storage;
pub use storage::ConfigStore;
