//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use bitflags::bitflags;
use canopy_yang::{SnodeId, StatementKind, YangSpec};

bitflags! {
    /// Per-node flag bitset used by the diff and validator passes.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct NodeFlags: u8 {
        const ADD = 0x01;
        const DEL = 0x02;
        const CHANGE = 0x04;
        const MARK = 0x08;
    }
}

/// Handle of a node within a [`ConfigTree`] arena.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(pub u32);

#[derive(Clone, Debug)]
pub enum NodeKind {
    Element {
        name: String,
        // Owning module name; inherited from the parent when not set
        // explicitly at parse time.
        namespace: Option<String>,
        snode: Option<SnodeId>,
    },
    Attribute {
        name: String,
        value: String,
    },
    Body {
        text: String,
    },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub flags: NodeFlags,
}

/// The canonical configuration representation: a rooted, ordered tree of
/// typed nodes, arena-allocated and indexed by integer handles.
///
/// Node slots are never reused within a tree's lifetime; detached subtrees
/// simply become unreachable. Trees are short-lived (one per datastore
/// load or transaction), so the arena is dropped wholesale.
#[derive(Clone, Debug)]
pub struct ConfigTree {
    nodes: Vec<Node>,
    root: NodeId,
}

// ===== impl ConfigTree =====

impl ConfigTree {
    pub fn new() -> ConfigTree {
        let root = Node {
            kind: NodeKind::Element {
                name: "config".to_owned(),
                namespace: None,
                snode: None,
            },
            parent: None,
            children: vec![],
            flags: NodeFlags::empty(),
        };
        ConfigTree {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.elements(self.root).next().is_none()
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    // ===== construction =====

    pub fn add_element(
        &mut self,
        parent: NodeId,
        namespace: Option<&str>,
        name: &str,
    ) -> NodeId {
        // Namespaces are inherited from the parent element when omitted.
        let namespace = namespace
            .map(str::to_owned)
            .or_else(|| self.namespace(parent).map(str::to_owned));
        self.push_node(
            parent,
            NodeKind::Element {
                name: name.to_owned(),
                namespace,
                snode: None,
            },
        )
    }

    pub fn add_attribute(
        &mut self,
        parent: NodeId,
        name: &str,
        value: &str,
    ) -> NodeId {
        self.push_node(
            parent,
            NodeKind::Attribute {
                name: name.to_owned(),
                value: value.to_owned(),
            },
        )
    }

    /// Sets the body (leaf text) of an element, replacing any existing one.
    pub fn set_body(&mut self, element: NodeId, text: &str) {
        if let Some(body) = self.body_node(element) {
            if let NodeKind::Body { text: old } = &mut self.node_mut(body).kind
            {
                *old = text.to_owned();
            }
            return;
        }
        self.push_node(
            element,
            NodeKind::Body {
                text: text.to_owned(),
            },
        );
    }

    /// Convenience for building leaves: element + body in one call.
    pub fn add_leaf(
        &mut self,
        parent: NodeId,
        namespace: Option<&str>,
        name: &str,
        value: &str,
    ) -> NodeId {
        let element = self.add_element(parent, namespace, name);
        self.set_body(element, value);
        element
    }

    fn push_node(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: vec![],
            flags: NodeFlags::empty(),
        });
        self.node_mut(parent).children.push(id);
        id
    }

    /// Detaches a subtree from its parent. The nodes stay in the arena but
    /// become unreachable.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|&child| child != id);
        }
        self.node_mut(id).parent = None;
    }

    /// Reattaches a previously detached subtree under a new parent.
    pub fn reattach(&mut self, id: NodeId, parent: NodeId) {
        self.remove(id);
        self.node_mut(id).parent = Some(parent);
        self.node_mut(parent).children.push(id);
    }

    pub fn rename(&mut self, id: NodeId, new_name: &str) {
        if let NodeKind::Element { name, .. } = &mut self.node_mut(id).kind {
            *name = new_name.to_owned();
        }
    }

    // ===== accessors =====

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn name(&self, id: NodeId) -> &str {
        match &self.node(id).kind {
            NodeKind::Element { name, .. }
            | NodeKind::Attribute { name, .. } => name,
            NodeKind::Body { .. } => "",
        }
    }

    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { namespace, .. } => namespace.as_deref(),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element { .. })
    }

    pub fn snode(&self, id: NodeId) -> Option<SnodeId> {
        match &self.node(id).kind {
            NodeKind::Element { snode, .. } => *snode,
            _ => None,
        }
    }

    pub fn set_snode(&mut self, id: NodeId, snode: Option<SnodeId>) {
        if let NodeKind::Element { snode: slot, .. } = &mut self.node_mut(id).kind
        {
            *slot = snode;
        }
    }

    fn body_node(&self, element: NodeId) -> Option<NodeId> {
        self.node(element)
            .children
            .iter()
            .copied()
            .find(|&child| {
                matches!(self.node(child).kind, NodeKind::Body { .. })
            })
    }

    /// Leaf text of an element, if any.
    pub fn body(&self, element: NodeId) -> Option<&str> {
        self.body_node(element).map(|body| {
            match &self.node(body).kind {
                NodeKind::Body { text } => text.as_str(),
                _ => unreachable!(),
            }
        })
    }

    pub fn attribute(&self, element: NodeId, name: &str) -> Option<&str> {
        self.node(element).children.iter().find_map(|&child| {
            match &self.node(child).kind {
                NodeKind::Attribute { name: aname, value }
                    if aname == name =>
                {
                    Some(value.as_str())
                }
                _ => None,
            }
        })
    }

    pub fn attributes(
        &self,
        element: NodeId,
    ) -> impl Iterator<Item = (&str, &str)> {
        self.node(element).children.iter().filter_map(|&child| {
            match &self.node(child).kind {
                NodeKind::Attribute { name, value } => {
                    Some((name.as_str(), value.as_str()))
                }
                _ => None,
            }
        })
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id).children.iter().copied()
    }

    /// Child element nodes only (attributes and bodies filtered out).
    pub fn elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).filter(|&child| self.is_element(child))
    }

    /// Pre-order traversal of the element subtree rooted at `id`,
    /// inclusive.
    pub fn traverse(&self, id: NodeId) -> Vec<NodeId> {
        let mut output = vec![];
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            output.push(node);
            let children = self
                .elements(node)
                .collect::<Vec<_>>();
            stack.extend(children.into_iter().rev());
        }
        output
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.elements(parent).find(|&child| self.name(child) == name)
    }

    pub fn find_children<'a>(
        &'a self,
        parent: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.elements(parent)
            .filter(move |&child| self.name(child) == name)
    }

    // ===== flags =====

    pub fn flags(&self, id: NodeId) -> NodeFlags {
        self.node(id).flags
    }

    pub fn set_flags(&mut self, id: NodeId, flags: NodeFlags) {
        self.node_mut(id).flags.insert(flags);
    }

    pub fn set_flags_recursive(&mut self, id: NodeId, flags: NodeFlags) {
        for node in self.traverse(id) {
            self.set_flags(node, flags);
        }
    }

    /// Sets flags on every ancestor element of `id`, excluding the root.
    pub fn set_flags_ancestors(&mut self, id: NodeId, flags: NodeFlags) {
        let mut cursor = self.parent(id);
        while let Some(node) = cursor {
            if node == self.root {
                break;
            }
            self.set_flags(node, flags);
            cursor = self.parent(node);
        }
    }

    pub fn clear_flags(&mut self) {
        for node in &mut self.nodes {
            node.flags = NodeFlags::empty();
        }
    }

    // ===== identity and ordering =====

    /// Matching identity of an element: list entries match by key tuple,
    /// leaf-lists by body value, everything else by (namespace, name).
    pub fn match_key(&self, spec: &YangSpec, id: NodeId) -> MatchKey {
        let name = self.name(id).to_owned();
        let namespace = self.namespace(id).map(str::to_owned);
        let discriminator = match self.snode(id).map(|snode| spec.stmt(snode))
        {
            Some(stmt) if stmt.is_list() => Some(
                stmt.keys()
                    .iter()
                    .map(|key| {
                        self.find_child(id, key)
                            .and_then(|child| self.body(child))
                            .unwrap_or("")
                            .to_owned()
                    })
                    .collect::<Vec<_>>()
                    .join("\x1f"),
            ),
            Some(stmt) if stmt.is_leaf_list() => {
                Some(self.body(id).unwrap_or("").to_owned())
            }
            _ => None,
        };
        MatchKey {
            name,
            namespace,
            discriminator,
        }
    }

    /// Sorts every element's children canonically: schema order first,
    /// then key tuple (lists) or body (leaf-lists). `ordered-by user`
    /// statements keep their document order.
    pub fn sort(&mut self, spec: &YangSpec) {
        let nodes = self.traverse(self.root);
        for node in nodes {
            self.sort_children(spec, node);
        }
    }

    fn sort_children(&mut self, spec: &YangSpec, parent: NodeId) {
        let mut children = self.node(parent).children.clone();
        children.sort_by_cached_key(|&child| {
            match &self.node(child).kind {
                // Attributes first, then the body, then elements.
                NodeKind::Attribute { name, .. } => {
                    (0u8, name.clone(), String::new())
                }
                NodeKind::Body { .. } => (1, String::new(), String::new()),
                NodeKind::Element { .. } => {
                    let key = self.match_key(spec, child);
                    let user_ordered = self
                        .snode(child)
                        .map(|snode| match &spec.stmt(snode).kind {
                            StatementKind::List { user_ordered, .. }
                            | StatementKind::LeafList {
                                user_ordered, ..
                            } => *user_ordered,
                            _ => false,
                        })
                        .unwrap_or(false);
                    let discriminator = if user_ordered {
                        // Document order is preserved by the stable sort.
                        String::new()
                    } else {
                        key.discriminator.unwrap_or_default()
                    };
                    let qualified = format!(
                        "{}:{}",
                        key.namespace.unwrap_or_default(),
                        key.name
                    );
                    (2, qualified, discriminator)
                }
            }
        });
        self.node_mut(parent).children = children;
    }

    // ===== spec binding =====

    /// Resolves the schema statement of every element. With `strict`
    /// binding, elements with no matching statement produce an error;
    /// otherwise they are left unbound (pre-upgrade loads).
    pub fn bind(
        &mut self,
        spec: &YangSpec,
        strict: bool,
    ) -> Result<(), String> {
        let root = self.root;
        self.bind_children(spec, root, None, strict)
    }

    fn bind_children(
        &mut self,
        spec: &YangSpec,
        parent: NodeId,
        parent_snode: Option<SnodeId>,
        strict: bool,
    ) -> Result<(), String> {
        let children = self.elements(parent).collect::<Vec<_>>();
        for child in children {
            let name = self.name(child).to_owned();
            let namespace = self.namespace(child).map(str::to_owned);
            let snode = spec.find_child(
                parent_snode,
                namespace.as_deref(),
                &name,
            );
            match snode {
                Some(snode) => {
                    self.set_snode(child, Some(snode));
                    // Fill in the namespace from the resolved statement.
                    if namespace.is_none() {
                        let module =
                            spec.module(spec.stmt(snode).module).name.clone();
                        if let NodeKind::Element { namespace, .. } =
                            &mut self.node_mut(child).kind
                        {
                            *namespace = Some(module);
                        }
                    }
                    self.bind_children(spec, child, Some(snode), strict)?;
                }
                None if strict => {
                    return Err(format!(
                        "unknown element \"{}\"",
                        self.instance_path(spec, child)
                    ));
                }
                None => {
                    self.set_snode(child, None);
                }
            }
        }
        Ok(())
    }

    /// Instance path of a node, e.g. `/sys:system/user[name='bob']/uid`.
    /// List predicates require spec binding; unbound elements render
    /// without predicates.
    pub fn instance_path(&self, spec: &YangSpec, id: NodeId) -> String {
        let mut segments = vec![];
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            if node == self.root {
                break;
            }
            let mut segment = match (self.namespace(node), self.parent(node))
            {
                // Qualify the segment when the namespace differs from the
                // parent's.
                (Some(namespace), Some(parent))
                    if self.namespace(parent) != Some(namespace) =>
                {
                    format!("{}:{}", namespace, self.name(node))
                }
                _ => self.name(node).to_owned(),
            };
            if let Some(snode) = self.snode(node) {
                for key in spec.stmt(snode).keys() {
                    let value = self
                        .find_child(node, key)
                        .and_then(|child| self.body(child))
                        .unwrap_or("");
                    segment.push_str(&format!("[{key}='{value}']"));
                }
            }
            segments.push(segment);
            cursor = self.parent(node);
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    // ===== copying and merging =====

    /// Deep-copies the subtree rooted at `src_node` (in `src`) under
    /// `dst_parent`, returning the new subtree root.
    pub fn copy_subtree(
        &mut self,
        src: &ConfigTree,
        src_node: NodeId,
        dst_parent: NodeId,
    ) -> NodeId {
        let kind = src.node(src_node).kind.clone();
        let id = self.push_node(dst_parent, kind);
        for child in src.children(src_node).collect::<Vec<_>>() {
            self.copy_subtree(src, child, id);
        }
        id
    }

    /// Structural deep copy of the whole tree, dropping unreachable arena
    /// slots and flags.
    pub fn deep_copy(&self) -> ConfigTree {
        let mut copy = ConfigTree::new();
        let root = self.root;
        let copy_root = copy.root;
        for child in self.children(root).collect::<Vec<_>>() {
            copy.copy_subtree(self, child, copy_root);
        }
        copy
    }

    /// Merges another tree into this one: matching elements merge
    /// recursively (bodies overwritten), unmatched subtrees are copied.
    pub fn merge(&mut self, spec: &YangSpec, other: &ConfigTree) {
        self.merge_children(spec, self.root, other, other.root());
    }

    fn merge_children(
        &mut self,
        spec: &YangSpec,
        parent: NodeId,
        other: &ConfigTree,
        other_parent: NodeId,
    ) {
        for other_child in other.elements(other_parent).collect::<Vec<_>>() {
            let key = other.match_key(spec, other_child);
            let existing = self
                .elements(parent)
                .find(|&child| self.match_key(spec, child) == key);
            match existing {
                Some(child) => {
                    if let Some(body) = other.body(other_child) {
                        self.set_body(child, body);
                    }
                    self.merge_children(spec, child, other, other_child);
                }
                None => {
                    self.copy_subtree(other, other_child, parent);
                }
            }
        }
    }

    /// Structural equality of configuration data, ignoring flags and
    /// arena layout.
    pub fn data_eq(&self, other: &ConfigTree) -> bool {
        self.subtree_eq(self.root, other, other.root())
    }

    fn subtree_eq(
        &self,
        id: NodeId,
        other: &ConfigTree,
        other_id: NodeId,
    ) -> bool {
        if self.name(id) != other.name(other_id)
            || self.namespace(id) != other.namespace(other_id)
            || self.body(id) != other.body(other_id)
        {
            return false;
        }
        let attrs = self.attributes(id).collect::<Vec<_>>();
        let other_attrs = other.attributes(other_id).collect::<Vec<_>>();
        if attrs != other_attrs {
            return false;
        }
        let children = self.elements(id).collect::<Vec<_>>();
        let other_children = other.elements(other_id).collect::<Vec<_>>();
        children.len() == other_children.len()
            && children
                .into_iter()
                .zip(other_children)
                .all(|(a, b)| self.subtree_eq(a, other, b))
    }
}

impl Default for ConfigTree {
    fn default() -> ConfigTree {
        ConfigTree::new()
    }
}

/// Sibling-matching identity of an element.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MatchKey {
    pub name: String,
    pub namespace: Option<String>,
    pub discriminator: Option<String>,
}
