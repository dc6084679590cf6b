//! Arena-backed configuration tree.
//!
//! A `ConfigTree` is an ordered, labeled tree stored in a flat arena: every
//! node lives in one `Vec` and a parent holds the ordered list of its
//! children's indices. Walks over the tree (copying, merging, comparing,
//! converting) use explicit work stacks instead of recursion, so arbitrarily
//! deep documents neither overflow the stack nor drop recursively.
//!
//! The same structure carries both live values and their schema. A merged
//! document built by [`merge_config_desc`] has exactly two children under a
//! synthetic root: `cfg` (values) and `desc` (description), which are
//! positionally congruent so a renderer can zip them.
//!
//! [`ConfigNode`] is the nested shape that crosses the caller boundary
//! (serializable with serde); convert with [`ConfigTree::from_node`] and
//! [`ConfigTree::to_node`].

use crate::error::ConfigError;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Name of the value section of a merged document.
pub const CFG_SECTION: &str = "cfg";
/// Name of the description section of a merged document.
pub const DESC_SECTION: &str = "desc";

/// Index of a node inside one `ConfigTree`.
///
/// Ids are only meaningful for the tree that handed them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
struct Slot {
    name: String,
    comment: String,
    value: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Ordered name/comment/value tree stored in a flat arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "ConfigNode", try_from = "ConfigNode")]
pub struct ConfigTree {
    slots: Vec<Slot>,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTree {
    /// Create a tree holding only an unnamed root.
    pub fn new() -> Self {
        Self::with_root_name("")
    }

    /// Create a tree whose root carries `name`.
    pub fn with_root_name(name: impl Into<String>) -> Self {
        Self {
            slots: vec![Slot {
                name: name.into(),
                ..Slot::default()
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id.0]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        &mut self.slots[id.0]
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.slot(id).name
    }

    pub fn comment(&self, id: NodeId) -> &str {
        &self.slot(id).comment
    }

    pub fn value(&self, id: NodeId) -> &str {
        &self.slot(id).value
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.slot(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.slot(id).children.is_empty()
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        self.slot_mut(id).value = value.into();
    }

    pub fn set_comment(&mut self, id: NodeId, comment: impl Into<String>) {
        self.slot_mut(id).comment = comment.into();
    }

    /// First child of `parent` named `name`.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.slot(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.slot(c).name == name)
    }

    /// Append a new child, even if a sibling with the same name exists.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            name: name.into(),
            parent: Some(parent),
            ..Slot::default()
        });
        self.slot_mut(parent).children.push(id);
        id
    }

    /// Return the child named `name`, appending it if missing.
    pub fn child_or_insert(&mut self, parent: NodeId, name: &str) -> NodeId {
        match self.child(parent, name) {
            Some(id) => id,
            None => self.add_child(parent, name),
        }
    }

    /// Resolve a `/`-separated path relative to `from`.
    ///
    /// An empty path resolves to `from` itself.
    pub fn find(&self, from: NodeId, path: &str) -> Option<NodeId> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(from, |node, part| self.child(node, part))
    }

    /// Resolve a path relative to `from`, creating missing nodes.
    pub fn find_or_insert(&mut self, from: NodeId, path: &str) -> NodeId {
        path.split('/')
            .filter(|s| !s.is_empty())
            .fold(from, |node, part| self.child_or_insert(node, part))
    }

    /// Resolve a path relative to the root.
    pub fn get(&self, path: &str) -> Option<NodeId> {
        self.find(self.root(), path)
    }

    /// Value of the node at `path`, if the node exists.
    pub fn value_at(&self, path: &str) -> Option<&str> {
        self.get(path).map(|id| self.value(id))
    }

    /// Set the value at `path`, creating intermediate nodes.
    pub fn set_value_at(&mut self, path: &str, value: impl Into<String>) -> NodeId {
        let id = self.find_or_insert(self.root(), path);
        self.set_value(id, value);
        id
    }

    /// Path of `id` below the root, `/`-separated. The root's path is empty.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = id;
        while let Some(parent) = self.parent(cursor) {
            parts.push(self.name(cursor));
            cursor = parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Pre-order list of `from` and everything below it.
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Leaf paths (relative to `from`) and values, in document order.
    pub fn leaves(&self, from: NodeId) -> Vec<(String, String)> {
        let base = self.path_of(from);
        self.descendants(from)
            .into_iter()
            .filter(|&id| id != from && self.is_leaf(id))
            .map(|id| {
                let full = self.path_of(id);
                let rel = full
                    .strip_prefix(base.as_str())
                    .map(|p| p.trim_start_matches('/'))
                    .unwrap_or(full.as_str())
                    .to_string();
                (rel, self.value(id).to_string())
            })
            .collect()
    }

    /// Copy the subtree at `id` into a standalone tree.
    pub fn subtree(&self, id: NodeId) -> ConfigTree {
        let mut out = ConfigTree::with_root_name(self.name(id));
        let root = out.root();
        out.set_comment(root, self.comment(id));
        out.set_value(root, self.value(id));
        let mut stack: Vec<(NodeId, NodeId)> = self
            .children(id)
            .iter()
            .rev()
            .map(|&c| (c, root))
            .collect();
        while let Some((src, dst_parent)) = stack.pop() {
            let dst = out.add_child(dst_parent, self.name(src));
            out.set_comment(dst, self.comment(src));
            out.set_value(dst, self.value(src));
            stack.extend(self.children(src).iter().rev().map(|&c| (c, dst)));
        }
        out
    }

    /// Section of a merged document (`cfg` or `desc`) as a standalone tree.
    pub fn section(&self, name: &str) -> Option<ConfigTree> {
        self.child(self.root(), name).map(|id| self.subtree(id))
    }

    /// Append a copy of `other`'s node `from` (and its subtree) under `parent`.
    pub fn graft(&mut self, parent: NodeId, other: &ConfigTree, from: NodeId) -> NodeId {
        let top = self.add_child(parent, other.name(from));
        self.set_comment(top, other.comment(from));
        self.set_value(top, other.value(from));
        let mut stack: Vec<(NodeId, NodeId)> = other
            .children(from)
            .iter()
            .rev()
            .map(|&c| (c, top))
            .collect();
        while let Some((src, dst_parent)) = stack.pop() {
            let dst = self.add_child(dst_parent, other.name(src));
            self.set_comment(dst, other.comment(src));
            self.set_value(dst, other.value(src));
            stack.extend(other.children(src).iter().rev().map(|&c| (c, dst)));
        }
        top
    }

    /// Sparse overlay of `other` (starting at `from`) onto this tree at `at`.
    ///
    /// Children are matched by name and created when missing; leaf values in
    /// `other` replace values here. Nodes present here but absent from
    /// `other` are left untouched.
    pub fn overlay(&mut self, at: NodeId, other: &ConfigTree, from: NodeId) {
        let mut stack = vec![(from, at)];
        while let Some((src, dst)) = stack.pop() {
            if other.is_leaf(src) {
                self.set_value(dst, other.value(src));
                continue;
            }
            for &c in other.children(src).iter().rev() {
                let d = self.child_or_insert(dst, other.name(c));
                if !other.comment(c).is_empty() {
                    self.set_comment(d, other.comment(c));
                }
                stack.push((c, d));
            }
        }
    }

    /// Convert the subtree at `id` to the nested boundary shape.
    pub fn to_node(&self, id: NodeId) -> ConfigNode {
        let order = self.descendants(id);
        let mut built: AHashMap<NodeId, ConfigNode> = AHashMap::with_capacity(order.len());
        // Reverse pre-order visits every child before its parent.
        for &nid in order.iter().rev() {
            let children = self
                .children(nid)
                .iter()
                .filter_map(|c| built.remove(c))
                .collect::<Vec<_>>();
            let value = if children.is_empty() {
                self.value(nid).to_string()
            } else {
                String::new()
            };
            built.insert(
                nid,
                ConfigNode {
                    name: self.name(nid).to_string(),
                    comment: self.comment(nid).to_string(),
                    value,
                    children,
                },
            );
        }
        built.remove(&id).unwrap_or_default()
    }

    /// Build a tree from the nested boundary shape, validating it.
    ///
    /// Sibling nodes with the same name are merged into one node, matching
    /// how paths are resolved. Merging a leaf with a group is rejected.
    pub fn from_node(node: &ConfigNode) -> Result<ConfigTree, ConfigError> {
        let mut tree = ConfigTree::with_root_name(node.name.clone());
        let root = tree.root();
        let mut leaf_kind: AHashMap<NodeId, bool> = AHashMap::new();
        let mut stack = vec![(node, root)];
        while let Some((src, dst)) = stack.pop() {
            if !src.value.is_empty() && !src.children.is_empty() {
                return Err(ConfigError::MixedNode {
                    path: tree.path_of(dst),
                });
            }
            tree.set_comment(dst, src.comment.clone());
            if src.children.is_empty() {
                tree.set_value(dst, src.value.clone());
                continue;
            }
            for child in src.children.iter() {
                if child.name.is_empty() {
                    return Err(ConfigError::EmptyName {
                        parent: tree.path_of(dst),
                    });
                }
                let d = tree.child_or_insert(dst, &child.name);
                let is_leaf = child.is_leaf();
                if *leaf_kind.entry(d).or_insert(is_leaf) != is_leaf {
                    return Err(ConfigError::MixedNode {
                        path: tree.path_of(d),
                    });
                }
                stack.push((child, d));
            }
        }
        Ok(tree)
    }
}

impl PartialEq for ConfigTree {
    fn eq(&self, other: &Self) -> bool {
        same_subtree(self, self.root(), other, other.root())
    }
}

impl Eq for ConfigTree {}

impl From<ConfigTree> for ConfigNode {
    fn from(tree: ConfigTree) -> Self {
        tree.to_node(tree.root())
    }
}

impl TryFrom<ConfigNode> for ConfigTree {
    type Error = ConfigError;

    fn try_from(node: ConfigNode) -> Result<Self, Self::Error> {
        ConfigTree::from_node(&node)
    }
}

/// Structural equality of two subtrees (names, comments, values, order).
pub fn same_subtree(a: &ConfigTree, a_id: NodeId, b: &ConfigTree, b_id: NodeId) -> bool {
    let mut stack = vec![(a_id, b_id)];
    while let Some((x, y)) = stack.pop() {
        if a.name(x) != b.name(y) || a.comment(x) != b.comment(y) || a.value(x) != b.value(y) {
            return false;
        }
        let (xs, ys) = (a.children(x), b.children(y));
        if xs.len() != ys.len() {
            return false;
        }
        stack.extend(xs.iter().copied().zip(ys.iter().copied()));
    }
    true
}

/// Whether a description subtree lines up with a value subtree.
///
/// Every interior value node must have a description counterpart whose
/// leading children carry the same names in the same order. Description
/// nodes may carry extra trailing metadata children.
pub fn congruent(cfg: &ConfigTree, cfg_id: NodeId, desc: &ConfigTree, desc_id: NodeId) -> bool {
    let mut stack = vec![(cfg_id, desc_id)];
    while let Some((c, d)) = stack.pop() {
        let (cs, ds) = (cfg.children(c), desc.children(d));
        if cs.len() > ds.len() {
            return false;
        }
        for (&cc, &dc) in cs.iter().zip(ds.iter()) {
            if cfg.name(cc) != desc.name(dc) {
                return false;
            }
            stack.push((cc, dc));
        }
    }
    true
}

/// Nested name/comment/value/children record used at the caller boundary.
///
/// A leaf carries a value and no children; an interior node carries children
/// and an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigNode {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn interior(name: impl Into<String>, children: Vec<ConfigNode>) -> Self {
        Self {
            name: name.into(),
            children,
            ..Self::default()
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A configuration object whose values and schema can be dumped into a tree
/// and whose values can be loaded back from one.
pub trait Configuration {
    /// Write live values as children of `at`.
    fn save(&self, tree: &mut ConfigTree, at: NodeId);

    /// Write the schema as children of `at`, congruent with [`save`](Self::save).
    fn dump_description(&self, tree: &mut ConfigTree, at: NodeId);

    /// Sparse-load values found under `at`. Fields missing from the tree keep
    /// their current value. On error nothing is changed.
    fn load(&mut self, tree: &ConfigTree, at: NodeId) -> Result<(), ConfigError>;
}

/// Build the `{cfg, desc}` document for one configuration object.
pub fn merge_config_desc(conf: &dyn Configuration) -> ConfigTree {
    let mut top = ConfigTree::new();
    let root = top.root();
    let cfg = top.add_child(root, CFG_SECTION);
    conf.save(&mut top, cfg);
    let desc = top.add_child(root, DESC_SECTION);
    conf.dump_description(&mut top, desc);
    debug_assert!(congruent(&top, cfg, &top, desc));
    top
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigTree {
        let mut t = ConfigTree::new();
        t.set_value_at("Behavior/ActiveByDefault", "False");
        t.set_value_at("Behavior/PageSize", "5");
        t.set_value_at("Hotkey/TriggerKeys", "Control+space");
        t
    }

    #[test]
    fn test_paths_preserve_declaration_order() {
        let t = sample();
        let root = t.root();
        let names: Vec<&str> = t.children(root).iter().map(|&c| t.name(c)).collect();
        assert_eq!(names, vec!["Behavior", "Hotkey"]);
        assert_eq!(t.value_at("Behavior/PageSize"), Some("5"));
        assert_eq!(t.value_at("Behavior/Missing"), None);
        let page = t.get("Behavior/PageSize").unwrap();
        assert_eq!(t.path_of(page), "Behavior/PageSize");
    }

    #[test]
    fn test_leaves_in_document_order() {
        let t = sample();
        let leaves = t.leaves(t.root());
        assert_eq!(
            leaves,
            vec![
                ("Behavior/ActiveByDefault".to_string(), "False".to_string()),
                ("Behavior/PageSize".to_string(), "5".to_string()),
                ("Hotkey/TriggerKeys".to_string(), "Control+space".to_string()),
            ]
        );
        let behavior = t.get("Behavior").unwrap();
        assert_eq!(t.leaves(behavior)[0].0, "ActiveByDefault");
    }

    #[test]
    fn test_node_conversion_is_lossless() {
        let t = sample();
        let node = t.to_node(t.root());
        assert_eq!(node.children.len(), 2);
        assert!(node.children[0].value.is_empty());
        let back = ConfigTree::from_node(&node).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_from_node_rejects_mixed_node() {
        let mut bad = ConfigNode::interior("Behavior", vec![ConfigNode::leaf("A", "1")]);
        bad.value = "oops".to_string();
        let root = ConfigNode::interior("", vec![bad]);
        let err = ConfigTree::from_node(&root).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MixedNode {
                path: "Behavior".to_string()
            }
        );
    }

    #[test]
    fn test_from_node_rejects_leaf_merged_with_group() {
        let root = ConfigNode::interior(
            "",
            vec![
                ConfigNode::leaf("Behavior", "1"),
                ConfigNode::interior("Behavior", vec![ConfigNode::leaf("A", "1")]),
            ],
        );
        assert_eq!(
            ConfigTree::from_node(&root).unwrap_err(),
            ConfigError::MixedNode {
                path: "Behavior".to_string()
            }
        );

        // Same clash one level down, under two merged groups.
        let root = ConfigNode::interior(
            "",
            vec![
                ConfigNode::interior("G", vec![ConfigNode::leaf("x", "")]),
                ConfigNode::interior("G", vec![ConfigNode::interior("x", vec![ConfigNode::leaf("y", "2")])]),
            ],
        );
        assert_eq!(
            ConfigTree::from_node(&root).unwrap_err(),
            ConfigError::MixedNode {
                path: "G/x".to_string()
            }
        );

        // Duplicates of the same kind still merge.
        let root = ConfigNode::interior(
            "",
            vec![
                ConfigNode::interior("G", vec![ConfigNode::leaf("a", "1")]),
                ConfigNode::interior("G", vec![ConfigNode::leaf("b", "2")]),
            ],
        );
        let tree = ConfigTree::from_node(&root).unwrap();
        assert_eq!(tree.value_at("G/a"), Some("1"));
        assert_eq!(tree.value_at("G/b"), Some("2"));
    }

    #[test]
    fn test_from_node_rejects_empty_name() {
        let root = ConfigNode::interior(
            "",
            vec![ConfigNode::interior("Group", vec![ConfigNode::leaf("", "1")])],
        );
        let err = ConfigTree::from_node(&root).unwrap_err();
        assert_eq!(
            err,
            ConfigError::EmptyName {
                parent: "Group".to_string()
            }
        );
    }

    #[test]
    fn test_overlay_is_sparse() {
        let mut live = sample();
        let mut patch = ConfigTree::new();
        patch.set_value_at("Behavior/PageSize", "7");
        let root = live.root();
        live.overlay(root, &patch, patch.root());
        assert_eq!(live.value_at("Behavior/PageSize"), Some("7"));
        assert_eq!(live.value_at("Behavior/ActiveByDefault"), Some("False"));
        assert_eq!(live.value_at("Hotkey/TriggerKeys"), Some("Control+space"));
    }

    #[test]
    fn test_subtree_and_graft() {
        let t = sample();
        let behavior = t.subtree(t.get("Behavior").unwrap());
        assert_eq!(behavior.name(behavior.root()), "Behavior");
        assert_eq!(behavior.value_at("PageSize"), Some("5"));

        let mut doc = ConfigTree::new();
        let root = doc.root();
        doc.graft(root, &t, t.get("Hotkey").unwrap());
        assert_eq!(doc.value_at("Hotkey/TriggerKeys"), Some("Control+space"));
    }

    #[test]
    fn test_congruence() {
        let cfg = sample();
        let mut desc = sample();
        // Trailing metadata under a described leaf is allowed.
        desc.set_value_at("Behavior/PageSize/Type", "Integer");
        assert!(congruent(&cfg, cfg.root(), &desc, desc.root()));

        let mut reordered = ConfigTree::new();
        reordered.set_value_at("Hotkey/TriggerKeys", "x");
        reordered.set_value_at("Behavior/ActiveByDefault", "x");
        reordered.set_value_at("Behavior/PageSize", "x");
        assert!(!congruent(&cfg, cfg.root(), &reordered, reordered.root()));
    }

    #[test]
    fn test_deep_tree_walks_iteratively() {
        let depth = 5000;
        let path = vec!["n"; depth].join("/");
        let mut t = ConfigTree::new();
        t.set_value_at(&path, "bottom");
        let copy = t.subtree(t.root());
        assert_eq!(copy, t);
        assert_eq!(copy.value_at(&path), Some("bottom"));
        assert_eq!(t.leaves(t.root()).len(), 1);
    }

    #[test]
    fn test_serde_goes_through_boundary_shape() {
        let t = sample();
        let json = serde_json::to_string(&t).unwrap();
        let node: ConfigNode = serde_json::from_str(&json).unwrap();
        assert_eq!(node.children[1].children[0].value, "Control+space");
        let back: ConfigTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
