//! Read-only snapshot of engine state served to caller threads.
//!
//! The owner thread captures a fresh [`EngineView`] after every applied
//! command and every engine turn and swaps it in atomically. Readers never
//! touch the engine; they may see state that an already-queued command is
//! about to change. That relaxed consistency is accepted for the panel,
//! listing and addon queries. Use `Bridge::sync` first for read-after-write.

use crate::addon::{AddonCategory, AddonOverrides, AddonState};
use crate::engine::{Engine, InputContextId, InputMethodEntry, InputMethodStatus};

#[derive(Debug, Clone)]
pub(crate) struct EngineView {
    pub(crate) panel_empty: bool,
    /// Entries of the current group, in group order.
    pub(crate) enabled: Vec<InputMethodEntry>,
    pub(crate) available: Vec<InputMethodEntry>,
    pub(crate) status: Option<InputMethodStatus>,
    pub(crate) addons: Vec<AddonState>,
    pub(crate) overrides: AddonOverrides,
}

impl EngineView {
    pub(crate) fn capture(engine: &dyn Engine, ic: InputContextId) -> Self {
        let overrides = engine.addon_overrides().clone();

        // Group entries whose input method is unknown are skipped.
        let enabled = engine
            .current_group()
            .input_methods
            .iter()
            .filter_map(|name| engine.input_method_entry(name))
            .collect();

        let mut addons = Vec::new();
        for category in AddonCategory::ALL {
            for name in engine.addon_names(category) {
                if let Some(info) = engine.addon_info(&name) {
                    let enabled = overrides.effective(&info.unique_name, info.default_enabled);
                    addons.push(AddonState { info, enabled });
                }
            }
        }

        Self {
            panel_empty: engine.is_input_panel_empty(ic),
            enabled,
            available: engine.input_method_entries(),
            status: engine.input_method_status(ic),
            addons,
            overrides,
        }
    }
}
