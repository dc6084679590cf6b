//! Configuration persistence for the reference engine.
//!
//! Every saved object is rendered to TOML. The text is always kept in memory
//! and, when a directory is configured, also written to `<key>.toml` there.
//! Restoring prefers the in-memory copy and falls back to the file, so an
//! engine built over an existing directory starts from the saved state.

use anyhow::Context;
use imebridge_core::{AddonOverrides, ConfigTree, Configuration, InputMethodGroup, NodeId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const GLOBAL_KEY: &str = "global";
pub const GROUP_KEY: &str = "inputmethods";
pub const OVERRIDES_KEY: &str = "addons";

pub fn addon_key(name: &str) -> String {
    format!("addon-{name}")
}

pub fn input_method_key(name: &str) -> String {
    format!("im-{name}")
}

#[derive(Debug, Default)]
pub struct ConfigStore {
    dir: Option<PathBuf>,
    saved: HashMap<String, String>,
}

impl ConfigStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at_dir<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
        info!(dir = %dir.display(), "using config directory");
        Ok(Self {
            dir: Some(dir),
            saved: HashMap::new(),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Keys saved during this session.
    pub fn saved_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.saved.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn write(&mut self, key: &str, text: String) -> anyhow::Result<()> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{key}.toml"));
            std::fs::write(&path, &text).with_context(|| format!("writing {}", path.display()))?;
        }
        debug!(key, bytes = text.len(), "saved");
        self.saved.insert(key.to_string(), text);
        Ok(())
    }

    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        if let Some(text) = self.saved.get(key) {
            return Ok(Some(text.clone()));
        }
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let path = dir.join(format!("{key}.toml"));
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(text))
    }

    // ========== Option sets ==========

    pub fn save_config(&mut self, key: &str, conf: &dyn Configuration) -> anyhow::Result<()> {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        conf.save(&mut tree, root);
        let text = toml::to_string_pretty(&tree_to_table(&tree, root))?;
        self.write(key, text)
    }

    /// Sparse-load a saved configuration. Returns whether anything was found.
    pub fn restore_config(&self, key: &str, conf: &mut dyn Configuration) -> anyhow::Result<bool> {
        let Some(text) = self.read(key)? else {
            return Ok(false);
        };
        let table: toml::Table = toml::from_str(&text).with_context(|| format!("parsing {key}"))?;
        let tree = table_to_tree(&table);
        conf.load(&tree, tree.root())?;
        Ok(true)
    }

    // ========== Plain records ==========

    fn save_record<T: Serialize>(&mut self, key: &str, record: &T) -> anyhow::Result<()> {
        let text = toml::to_string_pretty(record)?;
        self.write(key, text)
    }

    fn restore_record<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.read(key)? {
            Some(text) => Ok(Some(toml::from_str(&text).with_context(|| format!("parsing {key}"))?)),
            None => Ok(None),
        }
    }

    pub fn save_group(&mut self, group: &InputMethodGroup) -> anyhow::Result<()> {
        self.save_record(GROUP_KEY, group)
    }

    pub fn restore_group(&self) -> anyhow::Result<Option<InputMethodGroup>> {
        self.restore_record(GROUP_KEY)
    }

    pub fn save_overrides(&mut self, overrides: &AddonOverrides) -> anyhow::Result<()> {
        self.save_record(OVERRIDES_KEY, overrides)
    }

    pub fn restore_overrides(&self) -> anyhow::Result<Option<AddonOverrides>> {
        self.restore_record(OVERRIDES_KEY)
    }
}

/// Nested TOML tables mirroring the tree's groups, with string leaves.
fn tree_to_table(tree: &ConfigTree, at: NodeId) -> toml::Table {
    let mut top = toml::Table::new();
    'leaves: for (path, value) in tree.leaves(at) {
        let mut parts: Vec<&str> = path.split('/').collect();
        let Some(leaf) = parts.pop() else {
            continue;
        };
        let mut table = &mut top;
        for part in parts {
            let entry = table
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            match entry {
                toml::Value::Table(next) => table = next,
                _ => continue 'leaves,
            }
        }
        table.insert(leaf.to_string(), toml::Value::String(value));
    }
    top
}

fn table_to_tree(table: &toml::Table) -> ConfigTree {
    let mut tree = ConfigTree::new();
    let mut stack = vec![(table, tree.root())];
    while let Some((table, at)) = stack.pop() {
        for (key, value) in table {
            let node = tree.child_or_insert(at, key);
            match value {
                toml::Value::Table(inner) => stack.push((inner, node)),
                toml::Value::String(s) => tree.set_value(node, s.as_str()),
                other => tree.set_value(node, other.to_string()),
            }
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use imebridge_core::OptionSet;

    fn options() -> OptionSet {
        OptionSet::builder()
            .integer("Behavior/PageSize", "Page size", 5, Some(1), Some(10))
            .string("Hotkey/Trigger Keys", "Trigger", "Control+space")
            .build()
    }

    #[test]
    fn test_config_survives_new_store_over_same_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options();
        opts.set("Behavior/PageSize", "8").unwrap();
        opts.set("Hotkey/Trigger Keys", "Alt+space").unwrap();

        let mut store = ConfigStore::at_dir(dir.path()).unwrap();
        store.save_config(GLOBAL_KEY, &opts).unwrap();

        let reopened = ConfigStore::at_dir(dir.path()).unwrap();
        let mut fresh = options();
        assert!(reopened.restore_config(GLOBAL_KEY, &mut fresh).unwrap());
        assert_eq!(fresh.get_int("Behavior/PageSize"), Some(8));
        assert_eq!(fresh.get_str("Hotkey/Trigger Keys"), Some("Alt+space"));
    }

    #[test]
    fn test_missing_key_restores_nothing() {
        let store = ConfigStore::in_memory();
        let mut opts = options();
        assert!(!store.restore_config(GLOBAL_KEY, &mut opts).unwrap());
        assert_eq!(store.restore_group().unwrap(), None);
    }

    #[test]
    fn test_group_and_overrides_records() {
        let mut store = ConfigStore::in_memory();
        let group = InputMethodGroup {
            name: "Default".into(),
            default_layout: "us".into(),
            input_methods: vec!["pinyin".into()],
        };
        store.save_group(&group).unwrap();
        let mut overrides = AddonOverrides::default();
        overrides.disabled.insert("punctuation".into());
        store.save_overrides(&overrides).unwrap();

        assert_eq!(store.restore_group().unwrap(), Some(group));
        assert_eq!(store.restore_overrides().unwrap(), Some(overrides));
        assert_eq!(store.saved_keys(), vec![OVERRIDES_KEY.to_string(), GROUP_KEY.to_string()]);
    }
}
