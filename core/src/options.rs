//! Declarative, schema-backed configuration.
//!
//! An `OptionSet` declares typed options (booleans, bounded integers,
//! strings, enumerations) grouped into nested sections, and keeps their live
//! values. It implements [`Configuration`]: `save` writes the values tree,
//! `dump_description` writes a congruent description tree, and `load` applies
//! a sparse, all-or-nothing update.
//!
//! Declarations live in a flat arena just like [`ConfigTree`]; groups keep
//! the ordered indices of their members.
//!
//! # Example
//!
//! ```
//! use imebridge_core::{merge_config_desc, OptionSet};
//!
//! let opts = OptionSet::builder()
//!     .boolean("Behavior/ActiveByDefault", "Active By Default", false)
//!     .integer("Behavior/PageSize", "Page Size", 5, Some(1), Some(10))
//!     .build();
//! let doc = merge_config_desc(&opts);
//! assert_eq!(doc.value_at("cfg/Behavior/PageSize"), Some("5"));
//! assert_eq!(doc.value_at("desc/Behavior/PageSize/Type"), Some("Integer"));
//! ```

use crate::config_tree::{ConfigTree, Configuration, NodeId};
use crate::error::ConfigError;

/// Declared type of an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionKind {
    Group,
    Boolean,
    Integer { min: Option<i64>, max: Option<i64> },
    String,
    Enum(Vec<String>),
}

impl OptionKind {
    fn type_name(&self) -> &'static str {
        match self {
            OptionKind::Group => "Group",
            OptionKind::Boolean => "Boolean",
            OptionKind::Integer { .. } => "Integer",
            OptionKind::String => "String",
            OptionKind::Enum(_) => "Enum",
        }
    }
}

/// Live value of an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Group,
    Boolean(bool),
    Integer(i64),
    String(String),
    Enum(String),
}

impl OptionValue {
    /// Textual form stored in a config tree.
    pub fn render(&self) -> String {
        match self {
            OptionValue::Group => String::new(),
            OptionValue::Boolean(true) => "True".to_string(),
            OptionValue::Boolean(false) => "False".to_string(),
            OptionValue::Integer(v) => v.to_string(),
            OptionValue::String(s) | OptionValue::Enum(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct OptionDecl {
    name: String,
    description: String,
    kind: OptionKind,
    default: OptionValue,
    children: Vec<usize>,
}

/// Typed options with schema, defaults and live values.
#[derive(Debug, Clone, Default)]
pub struct OptionSet {
    decls: Vec<OptionDecl>,
    roots: Vec<usize>,
    values: Vec<OptionValue>,
}

impl OptionSet {
    pub fn builder() -> OptionSetBuilder {
        OptionSetBuilder::default()
    }

    fn lookup(&self, path: &str) -> Option<usize> {
        let mut level = &self.roots;
        let mut found = None;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let idx = *level.iter().find(|&&i| self.decls[i].name == part)?;
            found = Some(idx);
            level = &self.decls[idx].children;
        }
        found
    }

    /// Current value at `path`.
    pub fn get(&self, path: &str) -> Option<&OptionValue> {
        self.lookup(path).map(|i| &self.values[i])
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.get(path)? {
            OptionValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_int(&self, path: &str) -> Option<i64> {
        match self.get(path)? {
            OptionValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        match self.get(path)? {
            OptionValue::String(s) | OptionValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Set one option from its textual form, validating it.
    pub fn set(&mut self, path: &str, raw: &str) -> Result<(), ConfigError> {
        let idx = self
            .lookup(path)
            .ok_or_else(|| ConfigError::UnknownOption(path.to_string()))?;
        let value = parse_value(&self.decls[idx].kind, path, raw)?;
        self.values[idx] = value;
        Ok(())
    }

    /// Restore every option to its declared default.
    pub fn reset_to_defaults(&mut self) {
        self.values = self.decls.iter().map(|d| d.default.clone()).collect();
    }
}

impl Configuration for OptionSet {
    fn save(&self, tree: &mut ConfigTree, at: NodeId) {
        let mut stack: Vec<(usize, NodeId)> = self.roots.iter().rev().map(|&i| (i, at)).collect();
        while let Some((idx, parent)) = stack.pop() {
            let decl = &self.decls[idx];
            let node = tree.add_child(parent, decl.name.as_str());
            if matches!(decl.kind, OptionKind::Group) {
                stack.extend(decl.children.iter().rev().map(|&c| (c, node)));
            } else {
                tree.set_value(node, self.values[idx].render());
            }
        }
    }

    fn dump_description(&self, tree: &mut ConfigTree, at: NodeId) {
        let mut stack: Vec<(usize, NodeId)> = self.roots.iter().rev().map(|&i| (i, at)).collect();
        while let Some((idx, parent)) = stack.pop() {
            let decl = &self.decls[idx];
            let node = tree.add_child(parent, decl.name.as_str());
            tree.set_comment(node, decl.description.as_str());
            if matches!(decl.kind, OptionKind::Group) {
                stack.extend(decl.children.iter().rev().map(|&c| (c, node)));
                continue;
            }
            let ty = tree.add_child(node, "Type");
            tree.set_value(ty, decl.kind.type_name());
            let default = tree.add_child(node, "DefaultValue");
            tree.set_value(default, decl.default.render());
            match &decl.kind {
                OptionKind::Integer { min, max } => {
                    if let Some(min) = min {
                        let n = tree.add_child(node, "IntMin");
                        tree.set_value(n, min.to_string());
                    }
                    if let Some(max) = max {
                        let n = tree.add_child(node, "IntMax");
                        tree.set_value(n, max.to_string());
                    }
                }
                OptionKind::Enum(variants) => {
                    let list = tree.add_child(node, "Enum");
                    for (i, v) in variants.iter().enumerate() {
                        let n = tree.add_child(list, i.to_string());
                        tree.set_value(n, v.as_str());
                    }
                }
                _ => {}
            }
        }
    }

    fn load(&mut self, tree: &ConfigTree, at: NodeId) -> Result<(), ConfigError> {
        let mut staged = self.values.clone();
        let mut stack: Vec<(usize, NodeId)> = Vec::new();
        for &i in self.roots.iter().rev() {
            if let Some(node) = tree.child(at, &self.decls[i].name) {
                stack.push((i, node));
            }
        }
        while let Some((idx, node)) = stack.pop() {
            let decl = &self.decls[idx];
            if matches!(decl.kind, OptionKind::Group) {
                for &c in decl.children.iter().rev() {
                    if let Some(child) = tree.child(node, &self.decls[c].name) {
                        stack.push((c, child));
                    }
                }
                continue;
            }
            if !tree.is_leaf(node) {
                return Err(ConfigError::ExpectedValue {
                    path: tree.path_of(node),
                });
            }
            staged[idx] = parse_value(&decl.kind, &tree.path_of(node), tree.value(node))?;
        }
        self.values = staged;
        Ok(())
    }
}

fn parse_value(kind: &OptionKind, path: &str, raw: &str) -> Result<OptionValue, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        path: path.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    match kind {
        OptionKind::Group => Err(invalid("groups carry no value")),
        OptionKind::Boolean => match raw {
            "True" | "true" => Ok(OptionValue::Boolean(true)),
            "False" | "false" => Ok(OptionValue::Boolean(false)),
            _ => Err(invalid("expected True or False")),
        },
        OptionKind::Integer { min, max } => {
            let v: i64 = raw.trim().parse().map_err(|_| invalid("not an integer"))?;
            if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
                return Err(invalid("out of range"));
            }
            Ok(OptionValue::Integer(v))
        }
        OptionKind::String => Ok(OptionValue::String(raw.to_string())),
        OptionKind::Enum(variants) => {
            if variants.iter().any(|v| v == raw) {
                Ok(OptionValue::Enum(raw.to_string()))
            } else {
                Err(invalid("not one of the declared variants"))
            }
        }
    }
}

/// Builder for [`OptionSet`]. Paths are `/`-separated; missing parent groups
/// are declared implicitly with their name as description.
#[derive(Debug, Default)]
pub struct OptionSetBuilder {
    set: OptionSet,
}

impl OptionSetBuilder {
    fn declare(mut self, path: &str, description: &str, kind: OptionKind, default: OptionValue) -> Self {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let Some((leaf, groups)) = parts.split_last() else {
            return self;
        };
        let mut parent: Option<usize> = None;
        for group in groups {
            parent = Some(self.ensure(parent, group, group, OptionKind::Group, OptionValue::Group));
        }
        self.ensure(parent, leaf, description, kind, default);
        self
    }

    fn ensure(
        &mut self,
        parent: Option<usize>,
        name: &str,
        description: &str,
        kind: OptionKind,
        default: OptionValue,
    ) -> usize {
        let set = &mut self.set;
        let level = match parent {
            Some(p) => &set.decls[p].children,
            None => &set.roots,
        };
        let existing = level.iter().copied().find(|&i| set.decls[i].name == name);
        if let Some(existing) = existing {
            let decl = &mut set.decls[existing];
            decl.description = description.to_string();
            if !matches!(kind, OptionKind::Group) {
                decl.kind = kind;
                decl.default = default.clone();
                set.values[existing] = default;
            }
            return existing;
        }
        let idx = set.decls.len();
        set.decls.push(OptionDecl {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            default: default.clone(),
            children: Vec::new(),
        });
        set.values.push(default);
        match parent {
            Some(p) => set.decls[p].children.push(idx),
            None => set.roots.push(idx),
        }
        idx
    }

    /// Declare a group explicitly to give it a description.
    pub fn group(self, path: &str, description: &str) -> Self {
        self.declare(path, description, OptionKind::Group, OptionValue::Group)
    }

    pub fn boolean(self, path: &str, description: &str, default: bool) -> Self {
        self.declare(path, description, OptionKind::Boolean, OptionValue::Boolean(default))
    }

    pub fn integer(
        self,
        path: &str,
        description: &str,
        default: i64,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Self {
        self.declare(
            path,
            description,
            OptionKind::Integer { min, max },
            OptionValue::Integer(default),
        )
    }

    pub fn string(self, path: &str, description: &str, default: &str) -> Self {
        self.declare(
            path,
            description,
            OptionKind::String,
            OptionValue::String(default.to_string()),
        )
    }

    pub fn enumeration(self, path: &str, description: &str, variants: &[&str], default: &str) -> Self {
        self.declare(
            path,
            description,
            OptionKind::Enum(variants.iter().map(|v| v.to_string()).collect()),
            OptionValue::Enum(default.to_string()),
        )
    }

    pub fn build(self) -> OptionSet {
        self.set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_tree::{congruent, merge_config_desc};

    fn global() -> OptionSet {
        OptionSet::builder()
            .group("Hotkey", "Hotkey")
            .string("Hotkey/TriggerKeys", "Trigger Input Method", "Control+space")
            .group("Behavior", "Behavior")
            .boolean("Behavior/ActiveByDefault", "Active By Default", false)
            .enumeration(
                "Behavior/ShareInputState",
                "Share Input State",
                &["No", "All", "Program"],
                "No",
            )
            .integer("Behavior/DefaultPageSize", "Default page size", 5, Some(1), Some(10))
            .build()
    }

    #[test]
    fn test_save_writes_declared_order() {
        let opts = global();
        let mut tree = ConfigTree::new();
        let root = tree.root();
        opts.save(&mut tree, root);
        let leaves = tree.leaves(root);
        let paths: Vec<&str> = leaves.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "Hotkey/TriggerKeys",
                "Behavior/ActiveByDefault",
                "Behavior/ShareInputState",
                "Behavior/DefaultPageSize",
            ]
        );
        assert_eq!(tree.value_at("Behavior/ActiveByDefault"), Some("False"));
    }

    #[test]
    fn test_description_is_congruent() {
        let doc = merge_config_desc(&global());
        let cfg = doc.get("cfg").unwrap();
        let desc = doc.get("desc").unwrap();
        assert!(congruent(&doc, cfg, &doc, desc));
        assert_eq!(doc.value_at("desc/Behavior/DefaultPageSize/IntMax"), Some("10"));
        assert_eq!(doc.value_at("desc/Behavior/ShareInputState/Enum/2"), Some("Program"));
        let share = doc.get("desc/Behavior/ShareInputState").unwrap();
        assert_eq!(doc.comment(share), "Share Input State");
    }

    #[test]
    fn test_load_is_sparse() {
        let mut opts = global();
        let mut patch = ConfigTree::new();
        patch.set_value_at("Behavior/DefaultPageSize", "8");
        let root = patch.root();
        opts.load(&patch, root).unwrap();
        assert_eq!(opts.get_int("Behavior/DefaultPageSize"), Some(8));
        assert_eq!(opts.get_str("Hotkey/TriggerKeys"), Some("Control+space"));
        assert_eq!(opts.get_bool("Behavior/ActiveByDefault"), Some(false));
    }

    #[test]
    fn test_load_is_all_or_nothing() {
        let mut opts = global();
        let mut patch = ConfigTree::new();
        patch.set_value_at("Behavior/ActiveByDefault", "True");
        patch.set_value_at("Behavior/DefaultPageSize", "99");
        let root = patch.root();
        let err = opts.load(&patch, root).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref path, .. } if path == "Behavior/DefaultPageSize"));
        assert_eq!(opts.get_bool("Behavior/ActiveByDefault"), Some(false));
    }

    #[test]
    fn test_load_rejects_subtree_for_leaf() {
        let mut opts = global();
        let mut patch = ConfigTree::new();
        patch.set_value_at("Hotkey/TriggerKeys/Nested", "x");
        let root = patch.root();
        assert!(matches!(
            opts.load(&patch, root),
            Err(ConfigError::ExpectedValue { .. })
        ));
    }

    #[test]
    fn test_unknown_nodes_are_ignored() {
        let mut opts = global();
        let mut patch = ConfigTree::new();
        patch.set_value_at("Nowhere/Thing", "1");
        let root = patch.root();
        opts.load(&patch, root).unwrap();
        assert_eq!(opts.get_int("Behavior/DefaultPageSize"), Some(5));
    }

    #[test]
    fn test_set_and_reset() {
        let mut opts = global();
        opts.set("Behavior/ShareInputState", "All").unwrap();
        assert_eq!(opts.get_str("Behavior/ShareInputState"), Some("All"));
        assert!(opts.set("Behavior/ShareInputState", "Sometimes").is_err());
        assert!(matches!(opts.set("Nope", "1"), Err(ConfigError::UnknownOption(_))));
        opts.reset_to_defaults();
        assert_eq!(opts.get_str("Behavior/ShareInputState"), Some("No"));
    }

    mod sparse_merge {
        use super::*;
        use proptest::prelude::*;

        fn leaf_value(path: &'static str) -> BoxedStrategy<(&'static str, String)> {
            match path {
                "Hotkey/TriggerKeys" => "[A-Za-z+]{1,12}".prop_map(move |v| (path, v)).boxed(),
                "Behavior/ActiveByDefault" => any::<bool>()
                    .prop_map(move |b| (path, if b { "True" } else { "False" }.to_string()))
                    .boxed(),
                "Behavior/ShareInputState" => prop::sample::select(vec!["No", "All", "Program"])
                    .prop_map(move |v| (path, v.to_string()))
                    .boxed(),
                _ => (1i64..=10).prop_map(move |n| (path, n.to_string())).boxed(),
            }
        }

        fn patch() -> impl Strategy<Value = Vec<(&'static str, String)>> {
            prop::sample::subsequence(
                vec![
                    "Hotkey/TriggerKeys",
                    "Behavior/ActiveByDefault",
                    "Behavior/ShareInputState",
                    "Behavior/DefaultPageSize",
                ],
                0..=4,
            )
            .prop_flat_map(|paths| paths.into_iter().map(leaf_value).collect::<Vec<_>>())
        }

        proptest! {
            #[test]
            fn prop_subset_load_keeps_omitted_leaves(leaves in patch()) {
                let mut opts = global();
                let mut before = ConfigTree::new();
                let root = before.root();
                opts.save(&mut before, root);

                let mut patch = ConfigTree::new();
                for (path, value) in &leaves {
                    patch.set_value_at(path, value.clone());
                }
                let patch_root = patch.root();
                opts.load(&patch, patch_root).unwrap();

                let mut after = ConfigTree::new();
                let root = after.root();
                opts.save(&mut after, root);
                for (path, old) in before.leaves(before.root()) {
                    let supplied = leaves.iter().find(|(p, _)| *p == path);
                    let expected = supplied.map(|(_, v)| v.as_str()).unwrap_or(old.as_str());
                    prop_assert_eq!(after.value_at(&path), Some(expected));
                }
            }
        }
    }
}
