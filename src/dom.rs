//! Entity tree – an arena of text and element nodes.
//!
//! Nodes are addressed by [`NodeId`]. Each node owns an ordered list of child
//! ids and keeps a non-owning parent id for upward navigation. The style map
//! is empty until the cascade runs.

use std::collections::HashMap;
use std::fmt;

/// Property name → value, as produced by the cascade.
pub type StyleMap = HashMap<String, String>;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// Index of a node inside a [`Dom`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// What a node is.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// Decoded character content.
    Text(String),
    Element(ElementData),
}

/// Tag name and attributes of an element, both lowercase-keyed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementData {
    pub tag: String,
    pub attributes: HashMap<String, String>,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: HashMap::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attr("style")
    }
}

/// A node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub style: StyleMap,
}

impl Node {
    pub fn tag(&self) -> Option<&str> {
        match &self.data {
            NodeData::Element(e) => Some(e.tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            NodeData::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(t) => Some(t.as_str()),
            NodeData::Element(_) => None,
        }
    }
}

/// The document tree. `root` is set once the first node is created.
#[derive(Debug, Clone, Default)]
pub struct Dom {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a detached node whose parent link already points at `parent`.
    /// The first node allocated without a parent becomes the root.
    pub fn alloc(&mut self, data: NodeData, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent,
            children: Vec::new(),
            style: StyleMap::new(),
        });
        if parent.is_none() && self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    /// Append `child` as the last child of `parent`.
    ///
    /// Text nodes never take children; such an append is dropped.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if matches!(self.nodes[parent.0].data, NodeData::Text(_)) {
            log::debug!("refusing to append a child to a text node");
            return;
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Root node id.
    ///
    /// # Panics
    /// Panics on an empty arena. [`crate::html::parse_html`] never returns one.
    pub fn root(&self) -> NodeId {
        self.root.expect("document has no root node")
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].tag()
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.nodes[id.0].element()
    }

    pub fn style(&self, id: NodeId) -> &StyleMap {
        &self.nodes[id.0].style
    }

    /// Look up a resolved style property.
    pub fn style_value(&self, id: NodeId, property: &str) -> Option<&str> {
        self.nodes[id.0].style.get(property).map(|s| s.as_str())
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            dom: self,
            next: self.parent(id),
        }
    }

    /// All nodes reachable from `id` in document (pre-)order, `id` included.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.node(n).text())
            .collect()
    }

    /// Every element under `id` with the given tag, in document order.
    pub fn elements_by_tag(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.tag(n) == Some(tag))
            .collect()
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, indent: usize) -> fmt::Result {
        match &self.node(id).data {
            NodeData::Text(t) => writeln!(f, "{:indent$}{:?}", "", t, indent = indent)?,
            NodeData::Element(e) => {
                let mut attrs: Vec<_> = e.attributes.iter().collect();
                attrs.sort();
                write!(f, "{:indent$}<{}", "", e.tag, indent = indent)?;
                for (k, v) in attrs {
                    write!(f, " {k}=\"{v}\"")?;
                }
                writeln!(f, ">")?;
            }
        }
        for &child in self.children(id) {
            self.fmt_node(f, child, indent + 2)?;
        }
        Ok(())
    }
}

impl fmt::Display for Dom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => self.fmt_node(f, root, 0),
            None => Ok(()),
        }
    }
}

/// Iterator over a node's ancestors.
pub struct Ancestors<'a> {
    dom: &'a Dom,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.dom.parent(current);
        Some(current)
    }
}
