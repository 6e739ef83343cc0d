//! Mutable text tree the highlighter renders into.
//!
//! Nodes live in a slab arena and refer to each other by [`NodeId`]. The
//! depth-first sequence of text leaves under a root defines the character
//! coordinate space every other module works in.
//!
//! All offsets are in Unicode scalar values (chars), not bytes or UTF-16.

use std::fmt::Write;

use slab::Slab;
use smol_str::SmolStr;

use crate::error::TreeError;

/// Arena key of a node.
pub type NodeId = usize;

/// Payload of a tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// Container node (paragraphs, inline formatting, highlight markers).
    Element(ElementData),
    /// Text-bearing leaf.
    Text(String),
}

/// Tag, classes, attributes and inline style of an element.
///
/// Attributes and style declarations keep insertion order so markup output
/// is stable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementData {
    pub tag: SmolStr,
    pub classes: Vec<SmolStr>,
    pub attrs: Vec<(SmolStr, SmolStr)>,
    pub style: Vec<(SmolStr, SmolStr)>,
}

impl ElementData {
    pub fn new(tag: impl Into<SmolStr>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Add every whitespace-separated token in `classes`, skipping duplicates.
    pub fn add_class(&mut self, classes: &str) {
        for token in classes.split_whitespace() {
            if !self.has_class(token) {
                self.classes.push(SmolStr::new(token));
            }
        }
    }

    /// Remove a class token. Returns whether it was present.
    pub fn remove_class(&mut self, class: &str) -> bool {
        let before = self.classes.len();
        self.classes.retain(|c| c != class);
        before != self.classes.len()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<SmolStr>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((SmolStr::new(name), value)),
        }
    }

    pub fn style_value(&self, property: &str) -> Option<&str> {
        self.style
            .iter()
            .find(|(key, _)| key == property)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_style(&mut self, property: &str, value: impl Into<SmolStr>) {
        let value = value.into();
        match self.style.iter_mut().find(|(key, _)| key == property) {
            Some((_, existing)) => *existing = value,
            None => self.style.push((SmolStr::new(property), value)),
        }
    }

    pub fn remove_style(&mut self, property: &str) {
        self.style.retain(|(key, _)| key != property);
    }

    /// Parse `prop: value; prop: value` declarations and merge them into the style.
    pub fn append_style_text(&mut self, css: &str) {
        for declaration in css.split(';') {
            let Some((property, value)) = declaration.split_once(':') else {
                continue;
            };
            let property = property.trim();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                continue;
            }
            self.set_style(property, value);
        }
    }

    /// Serialize the style declarations back to CSS text.
    pub fn style_text(&self) -> String {
        let mut out = String::new();
        for (i, (property, value)) in self.style.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{property}: {value};");
        }
        out
    }
}

/// A node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub data: NodeData,
}

impl Node {
    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    pub fn text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(text) => Some(text),
            NodeData::Element(_) => None,
        }
    }

    pub fn element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }
}

/// Slab-backed tree of elements and text leaves.
#[derive(Debug, Clone)]
pub struct TextTree {
    nodes: Slab<Node>,
    root: NodeId,
}

impl Default for TextTree {
    fn default() -> Self {
        Self::new("div")
    }
}

impl TextTree {
    /// Create a tree containing only a root element.
    pub fn new(root_tag: impl Into<SmolStr>) -> Self {
        let mut nodes = Slab::new();
        let entry = nodes.vacant_entry();
        let root = entry.key();
        entry.insert(Node {
            id: root,
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(ElementData::new(root_tag)),
        });
        Self { nodes, root }
    }

    /// Create a `div` root with one text leaf per fragment.
    pub fn from_fragments(fragments: &[&str]) -> Self {
        let mut tree = Self::default();
        let root = tree.root;
        for fragment in fragments {
            let leaf = tree.create_text(fragment);
            tree.attach_last(root, leaf);
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Number of live nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(id).ok_or(TreeError::MissingNode(id))
    }

    fn create_node(&mut self, data: NodeData) -> NodeId {
        let entry = self.nodes.vacant_entry();
        let id = entry.key();
        entry.insert(Node {
            id,
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: impl Into<SmolStr>) -> NodeId {
        self.create_node(NodeData::Element(ElementData::new(tag)))
    }

    /// Create a detached element from prepared data.
    pub fn create_element_with(&mut self, element: ElementData) -> NodeId {
        self.create_node(NodeData::Element(element))
    }

    /// Create a detached text leaf.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.create_node(NodeData::Text(text.to_string()))
    }

    fn attach_last(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if !self.node(parent)?.is_element() {
            return Err(TreeError::NotElement(parent));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(TreeError::Cycle(child));
        }
        self.detach(child)?;
        self.attach_last(parent, child);
        Ok(())
    }

    /// Create an element and append it to `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: impl Into<SmolStr>,
    ) -> Result<NodeId, TreeError> {
        let id = self.create_element(tag);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Create a text leaf and append it to `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId, TreeError> {
        let id = self.create_text(text);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Insert `new` immediately before `anchor` in the anchor's parent.
    pub fn insert_before(&mut self, anchor: NodeId, new: NodeId) -> Result<(), TreeError> {
        let parent = self.node(anchor)?.parent.ok_or(TreeError::Detached(anchor))?;
        self.node(new)?;
        if new == anchor || self.is_ancestor(new, anchor) {
            return Err(TreeError::Cycle(new));
        }
        self.detach(new)?;
        let index = self
            .index_in_parent(anchor)
            .ok_or(TreeError::Detached(anchor))?;
        self.nodes[parent].children.insert(index, new);
        self.nodes[new].parent = Some(parent);
        Ok(())
    }

    /// Remove `id` from its parent's child list. Detached nodes are left as is.
    pub fn detach(&mut self, id: NodeId) -> Result<(), TreeError> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.nodes[parent].children.retain(|child| *child != id);
        self.nodes[id].parent = None;
        Ok(())
    }

    /// Detach `id` and drop it together with its whole subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        if id == self.root {
            return Err(TreeError::RootRemoval);
        }
        self.detach(id)?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.nodes.remove(current);
            stack.extend(node.children);
        }
        Ok(())
    }

    /// Splice the children of `id` into its place and drop `id`.
    ///
    /// Returns the former parent.
    pub fn replace_with_children(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        let parent = self.node(id)?.parent.ok_or(TreeError::Detached(id))?;
        let index = self.index_in_parent(id).ok_or(TreeError::Detached(id))?;
        let children = std::mem::take(&mut self.nodes[id].children);
        for child in &children {
            self.nodes[*child].parent = Some(parent);
        }
        self.nodes[parent].children.splice(index..=index, children);
        self.nodes.remove(id);
        Ok(parent)
    }

    /// Split a text leaf at a char offset.
    ///
    /// The leaf keeps `[0, offset)`; a new following sibling receives the rest
    /// and its id is returned.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, TreeError> {
        let node = self.node(id)?;
        let Some(text) = node.text() else {
            return Err(TreeError::NotText(id));
        };
        let len = text.chars().count();
        if offset > len {
            return Err(TreeError::OffsetBeyondText {
                node: id,
                offset,
                len,
            });
        }
        let parent = node.parent.ok_or(TreeError::Detached(id))?;
        let byte = char_to_byte(text, offset);
        let tail = text[byte..].to_string();

        if let NodeData::Text(text) = &mut self.nodes[id].data {
            text.truncate(byte);
        }

        let new = self.create_node(NodeData::Text(tail));
        let index = self.index_in_parent(id).ok_or(TreeError::Detached(id))?;
        self.nodes[parent].children.insert(index + 1, new);
        self.nodes[new].parent = Some(parent);
        Ok(new)
    }

    /// Merge adjacent text leaves and drop empty ones throughout the subtree of `id`.
    pub fn normalize(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            let children = node.children.clone();
            let mut kept = Vec::with_capacity(children.len());
            let mut last_text: Option<NodeId> = None;

            for child in children {
                let empty_text = self.nodes[child].text().map(str::is_empty);
                match empty_text {
                    Some(true) => {
                        self.nodes.remove(child);
                    }
                    Some(false) => match last_text {
                        Some(previous) => {
                            let merged = self.nodes.remove(child);
                            if let (NodeData::Text(tail), NodeData::Text(head)) =
                                (merged.data, &mut self.nodes[previous].data)
                            {
                                head.push_str(&tail);
                            }
                        }
                        None => {
                            last_text = Some(child);
                            kept.push(child);
                        }
                    },
                    None => {
                        last_text = None;
                        stack.push(child);
                        kept.push(child);
                    }
                }
            }

            self.nodes[current].children = kept;
        }
    }

    /// Depth-first iterator over the text leaves under `root`.
    pub fn leaves(&self, root: NodeId) -> Leaves<'_> {
        let stack = if self.nodes.contains(root) {
            vec![root]
        } else {
            Vec::new()
        };
        Leaves { tree: self, stack }
    }

    /// Pre-order list of the nodes under `id`, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(node) = self.nodes.get(id) else {
            return out;
        };
        let mut stack: Vec<NodeId> = node.children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current].children.iter().rev().copied());
        }
        out
    }

    /// Iterator over the ancestors of `id`, parent first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes.get(id).and_then(|node| node.parent),
        }
    }

    /// Whether `ancestor` strictly contains `node`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors(node).any(|a| a == ancestor)
    }

    /// Whether `node` is `root` or lies under it.
    pub fn is_inclusive_descendant(&self, root: NodeId, node: NodeId) -> bool {
        self.nodes.contains(node) && (node == root || self.is_ancestor(root, node))
    }

    /// Number of ancestors above `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.nodes[parent].children.iter().position(|c| *c == id)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).and_then(Node::text)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.nodes.get(id).and_then(Node::element)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.nodes.get_mut(id).and_then(Node::element_mut)
    }

    /// Length in chars of a text leaf, 0 for anything else.
    pub fn char_len(&self, id: NodeId) -> usize {
        self.text(id).map(|t| t.chars().count()).unwrap_or(0)
    }

    /// Concatenated text of every leaf under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        self.leaves(id)
            .filter_map(|leaf| self.text(leaf))
            .collect()
    }

    /// Serialize the subtree at `id` as HTML.
    pub fn to_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(&html_escape::encode_text(text)),
            NodeData::Element(element) => {
                let _ = write!(out, "<{}", element.tag);
                if !element.classes.is_empty() {
                    let _ = write!(
                        out,
                        " class=\"{}\"",
                        html_escape::encode_double_quoted_attribute(&element.classes.join(" "))
                    );
                }
                for (name, value) in &element.attrs {
                    let _ = write!(
                        out,
                        " {}=\"{}\"",
                        name,
                        html_escape::encode_double_quoted_attribute(value)
                    );
                }
                if !element.style.is_empty() {
                    let _ = write!(
                        out,
                        " style=\"{}\"",
                        html_escape::encode_double_quoted_attribute(&element.style_text())
                    );
                }
                out.push('>');
                for child in &node.children {
                    self.write_markup(*child, out);
                }
                let _ = write!(out, "</{}>", element.tag);
            }
        }
    }
}

/// Depth-first iterator over text leaves.
pub struct Leaves<'a> {
    tree: &'a TextTree,
    stack: Vec<NodeId>,
}

impl Iterator for Leaves<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some(id) = self.stack.pop() {
            let node = &self.tree.nodes[id];
            match node.data {
                NodeData::Text(_) => return Some(id),
                NodeData::Element(_) => self.stack.extend(node.children.iter().rev().copied()),
            }
        }
        None
    }
}

/// Iterator walking from a node's parent up to the tree root.
pub struct Ancestors<'a> {
    tree: &'a TextTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.nodes.get(current).and_then(|node| node.parent);
        Some(current)
    }
}

/// Convert a char offset into a byte index, clamping to the string end.
pub(crate) fn char_to_byte(text: &str, offset: usize) -> usize {
    text.char_indices()
        .nth(offset)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaves_depth_first() {
        let mut tree = TextTree::default();
        let root = tree.root();
        let p = tree.append_element(root, "p").unwrap();
        let a = tree.append_text(p, "Hello ").unwrap();
        let em = tree.append_element(p, "em").unwrap();
        let b = tree.append_text(em, "big").unwrap();
        let c = tree.append_text(root, " world").unwrap();

        let leaves: Vec<_> = tree.leaves(root).collect();
        assert_eq!(leaves, vec![a, b, c]);
        assert_eq!(tree.text_content(root), "Hello big world");
    }

    #[test]
    fn test_split_text_keeps_head() {
        let mut tree = TextTree::from_fragments(&["Hello world"]);
        let leaf = tree.leaves(tree.root()).next().unwrap();

        let tail = tree.split_text(leaf, 5).unwrap();
        assert_eq!(tree.text(leaf), Some("Hello"));
        assert_eq!(tree.text(tail), Some(" world"));
        assert_eq!(tree.children(tree.root()), &[leaf, tail]);
    }

    #[test]
    fn test_split_text_counts_chars() {
        let mut tree = TextTree::from_fragments(&["日本語テキスト"]);
        let leaf = tree.leaves(tree.root()).next().unwrap();

        let tail = tree.split_text(leaf, 3).unwrap();
        assert_eq!(tree.text(leaf), Some("日本語"));
        assert_eq!(tree.text(tail), Some("テキスト"));
    }

    #[test]
    fn test_split_text_rejects_bad_offset() {
        let mut tree = TextTree::from_fragments(&["abc"]);
        let leaf = tree.leaves(tree.root()).next().unwrap();

        assert_eq!(
            tree.split_text(leaf, 4),
            Err(TreeError::OffsetBeyondText {
                node: leaf,
                offset: 4,
                len: 3
            })
        );
        assert_eq!(tree.split_text(tree.root(), 0), Err(TreeError::NotText(tree.root())));
    }

    #[test]
    fn test_normalize_merges_and_drops_empty() {
        let mut tree = TextTree::from_fragments(&["Hel", "", "lo", " ", "world"]);
        let root = tree.root();
        let em = tree.append_element(root, "em").unwrap();
        tree.append_text(em, "a").unwrap();
        tree.append_text(em, "b").unwrap();

        tree.normalize(root);

        let leaves: Vec<_> = tree.leaves(root).collect();
        assert_eq!(leaves.len(), 2);
        assert_eq!(tree.text(leaves[0]), Some("Hello world"));
        assert_eq!(tree.text(leaves[1]), Some("ab"));
    }

    #[test]
    fn test_replace_with_children() {
        let mut tree = TextTree::default();
        let root = tree.root();
        tree.append_text(root, "a").unwrap();
        let span = tree.append_element(root, "span").unwrap();
        let inner = tree.append_text(span, "b").unwrap();
        tree.append_text(root, "c").unwrap();

        let parent = tree.replace_with_children(span).unwrap();
        assert_eq!(parent, root);
        assert!(!tree.contains_node(span));
        assert_eq!(tree.parent(inner), Some(root));
        assert_eq!(tree.text_content(root), "abc");
    }

    #[test]
    fn test_append_child_rejects_cycle() {
        let mut tree = TextTree::default();
        let root = tree.root();
        let outer = tree.append_element(root, "span").unwrap();
        let inner = tree.append_element(outer, "span").unwrap();

        assert_eq!(tree.append_child(inner, outer), Err(TreeError::Cycle(outer)));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut tree = TextTree::default();
        let root = tree.root();
        let span = tree.append_element(root, "span").unwrap();
        tree.append_text(span, "gone").unwrap();

        tree.remove(span).unwrap();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.remove(root), Err(TreeError::RootRemoval));
    }

    #[test]
    fn test_markup_escapes() {
        let mut tree = TextTree::default();
        let root = tree.root();
        let span = tree.append_element(root, "span").unwrap();
        tree.append_text(span, "a < b").unwrap();
        let element = tree.element_mut(span).unwrap();
        element.add_class("annotation hover");
        element.set_attr("data-id", "x\"y");
        element.append_style_text("background-color: red; ; color:blue");

        insta::assert_snapshot!(
            tree.to_markup(root),
            @r#"<div><span class="annotation hover" data-id="x&quot;y" style="background-color: red; color: blue;">a &lt; b</span></div>"#
        );
    }

    #[test]
    fn test_class_tokens_deduplicate() {
        let mut element = ElementData::new("span");
        element.add_class("a b");
        element.add_class("b c");
        assert_eq!(element.classes, vec!["a", "b", "c"]);
        assert!(element.remove_class("b"));
        assert!(!element.remove_class("b"));
    }
}
