//! Addon metadata and enable/disable override reconciliation.
//!
//! The engine keeps two override sets on top of each addon's
//! `default_enabled` flag. [`reconcile`] is the only way those sets change:
//! it keeps them minimal (no entry that merely restates the default) and
//! mutually disjoint.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Addon category, in the order addons are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddonCategory {
    InputMethod,
    Frontend,
    Loader,
    Module,
    UI,
}

impl AddonCategory {
    /// Every category, in listing order.
    pub const ALL: [AddonCategory; 5] = [
        AddonCategory::InputMethod,
        AddonCategory::Frontend,
        AddonCategory::Loader,
        AddonCategory::Module,
        AddonCategory::UI,
    ];

    /// Numeric code used at the caller boundary.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Read-only description of an addon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonInfo {
    pub unique_name: String,
    pub display_name: String,
    pub comment: String,
    pub category: AddonCategory,
    pub configurable: bool,
    pub default_enabled: bool,
    pub on_demand: bool,
}

/// An addon together with its effective enabled state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonState {
    pub info: AddonInfo,
    pub enabled: bool,
}

/// Explicit enable/disable exceptions layered over default flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonOverrides {
    pub enabled: BTreeSet<String>,
    pub disabled: BTreeSet<String>,
}

impl AddonOverrides {
    /// Effective state of `name` given its default flag.
    ///
    /// Reconciliation never leaves a name in both sets. If that invariant is
    /// ever broken, the disabled entry wins.
    pub fn effective(&self, name: &str, default_enabled: bool) -> bool {
        if self.disabled.contains(name) {
            false
        } else if self.enabled.contains(name) {
            true
        } else {
            default_enabled
        }
    }

    pub fn is_disjoint(&self) -> bool {
        self.enabled.is_disjoint(&self.disabled)
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }
}

/// Compute new override sets from the desired per-addon state.
///
/// `default_enabled` returns `None` for names the engine does not know;
/// those entries are skipped.
pub fn reconcile<F>(
    desired: &BTreeMap<String, bool>,
    default_enabled: F,
    current: &AddonOverrides,
) -> AddonOverrides
where
    F: Fn(&str) -> Option<bool>,
{
    let mut next = current.clone();
    for (name, &want) in desired {
        let Some(default) = default_enabled(name) else {
            continue;
        };
        if want == default {
            next.enabled.remove(name);
            next.disabled.remove(name);
        } else if want {
            next.enabled.insert(name.clone());
            next.disabled.remove(name);
        } else {
            next.disabled.insert(name.clone());
            next.enabled.remove(name);
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn defaults(name: &str) -> Option<bool> {
        match name {
            "punctuation" | "quickphrase" | "unicode" => Some(true),
            "clipboard" | "spell" => Some(false),
            _ => None,
        }
    }

    fn desired(items: &[(&str, bool)]) -> BTreeMap<String, bool> {
        items.iter().map(|(n, b)| (n.to_string(), *b)).collect()
    }

    #[test]
    fn test_disable_then_reenable_default_addon() {
        let current = AddonOverrides::default();
        let after_disable = reconcile(&desired(&[("punctuation", false)]), defaults, &current);
        assert!(after_disable.disabled.contains("punctuation"));
        assert!(after_disable.enabled.is_empty());
        assert!(!after_disable.effective("punctuation", true));

        let after_enable = reconcile(&desired(&[("punctuation", true)]), defaults, &after_disable);
        assert!(after_enable.is_empty());
        assert!(after_enable.effective("punctuation", true));
    }

    #[test]
    fn test_enable_default_disabled_addon() {
        let next = reconcile(&desired(&[("clipboard", true)]), defaults, &AddonOverrides::default());
        assert_eq!(next.enabled.iter().collect::<Vec<_>>(), vec!["clipboard"]);
        assert!(next.effective("clipboard", false));
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let next = reconcile(&desired(&[("ghost", true)]), defaults, &AddonOverrides::default());
        assert!(next.is_empty());
    }

    #[test]
    fn test_disabled_wins_when_invariant_is_broken() {
        let mut broken = AddonOverrides::default();
        broken.enabled.insert("clipboard".into());
        broken.disabled.insert("clipboard".into());
        assert!(!broken.effective("clipboard", true));
        // Reconciling the name repairs the sets.
        let repaired = reconcile(&desired(&[("clipboard", true)]), defaults, &broken);
        assert!(repaired.is_disjoint());
        assert!(repaired.effective("clipboard", false));
    }

    #[test]
    fn test_category_codes_follow_listing_order() {
        let codes: Vec<i32> = AddonCategory::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4]);
    }

    const NAMES: [&str; 6] = ["punctuation", "quickphrase", "unicode", "clipboard", "spell", "ghost"];

    proptest! {
        #[test]
        fn prop_override_sets_stay_disjoint_and_minimal(
            calls in prop::collection::vec(
                prop::collection::btree_map(prop::sample::select(NAMES.to_vec()), any::<bool>(), 0..6),
                0..12,
            )
        ) {
            let mut sets = AddonOverrides::default();
            for call in calls {
                let call: BTreeMap<String, bool> =
                    call.into_iter().map(|(n, b)| (n.to_string(), b)).collect();
                sets = reconcile(&call, defaults, &sets);
                prop_assert!(sets.is_disjoint());
                for name in sets.enabled.iter() {
                    prop_assert_eq!(defaults(name), Some(false));
                }
                for name in sets.disabled.iter() {
                    prop_assert_eq!(defaults(name), Some(true));
                }
                for (name, want) in call.iter() {
                    if let Some(default) = defaults(name) {
                        prop_assert_eq!(sets.effective(name, default), *want);
                    }
                }
            }
        }

        #[test]
        fn prop_setting_default_clears_overrides(name in prop::sample::select(NAMES[..5].to_vec()), first in any::<bool>()) {
            let default = defaults(name).unwrap_or(true);
            let start = reconcile(&desired(&[(name, first)]), defaults, &AddonOverrides::default());
            let back = reconcile(&desired(&[(name, default)]), defaults, &start);
            prop_assert!(!back.enabled.contains(name));
            prop_assert!(!back.disabled.contains(name));
            prop_assert_eq!(back.effective(name, default), default);
        }
    }
}
