//! An arena-backed document tree.
//!
//! The tree lives behind a shared handle: [`Document`] owns the arena, and
//! [`Element`] is a cheap clone-able handle (document + node id) mirroring how
//! browser element references behave. All mutation goes through `Element`
//! methods; borrows of the underlying arena never escape a method call, so
//! handles can be stored freely inside controllers and closures.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::{Error, Result};

mod lexer;
pub(crate) mod parser;
pub mod selector;

pub use selector::Selector;

use parser::{HtmlNode, encode_attr, encode_text, is_void, parse_nodes};

/// Index of a node in its document's arena. Nodes are never freed while the
/// document is alive; a detached subtree simply has no parent link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attrs: IndexMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    data: NodeData,
}

#[derive(Debug)]
struct DomTree {
    nodes: Vec<Node>,
    root: NodeId,
    active: Option<NodeId>,
}

impl DomTree {
    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: None,
            children: SmallVec::new(),
            data,
        });
        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|child| *child != id);
            self.node_mut(id).parent = None;
        }
    }

    fn append(&mut self, parent: NodeId, child: NodeId) {
        debug_assert_ne!(parent, child);
        self.detach(child);
        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);
    }

    /// Pre-order walk of descendant element ids, excluding `id` itself.
    fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut pending: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(current) = pending.pop() {
            if matches!(self.node(current).data, NodeData::Element { .. }) {
                found.push(current);
            }
            pending.extend(self.node(current).children.iter().rev().copied());
        }
        found
    }

    fn attach_parsed(&mut self, parent: Option<NodeId>, nodes: Vec<HtmlNode>) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = match node {
                HtmlNode::Text(text) => self.alloc(NodeData::Text(text)),
                HtmlNode::Element {
                    tag,
                    attrs,
                    children,
                } => {
                    let id = self.alloc(NodeData::Element {
                        tag,
                        attrs: attrs.into_iter().collect(),
                    });
                    let child_ids = self.attach_parsed(Some(id), children);
                    let element = self.node_mut(id);
                    element.children = child_ids.into_iter().collect();
                    id
                }
            };
            if let Some(parent) = parent {
                self.node_mut(id).parent = Some(parent);
                // The caller wires `children`; roots of the batch are
                // appended below.
            }
            ids.push(id);
        }
        ids
    }

    fn serialize(&self, id: NodeId, out: &mut String) {
        match &self.node(id).data {
            NodeData::Text(text) => encode_text(text, out),
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        encode_attr(value, out);
                        out.push('"');
                    }
                }
                out.push('>');
                if is_void(tag) {
                    return;
                }
                for child in self.node(id).children.clone() {
                    self.serialize(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

/// Shared handle to a document tree.
#[derive(Clone)]
pub struct Document {
    tree: Rc<RefCell<DomTree>>,
}

impl Document {
    /// An empty document: a lone `<body>` root.
    pub fn new() -> Self {
        let mut tree = DomTree {
            nodes: Vec::new(),
            root: NodeId(0),
            active: None,
        };
        let root = tree.alloc(NodeData::Element {
            tag: "body".to_string(),
            attrs: IndexMap::new(),
        });
        tree.root = root;
        Self {
            tree: Rc::new(RefCell::new(tree)),
        }
    }

    /// Parse markup into a fresh document; the fragment becomes the children
    /// of the `<body>` root.
    pub fn parse(html: &str) -> Result<Self> {
        let document = Self::new();
        let nodes = parse_nodes(html)?;
        {
            let mut tree = document.tree.borrow_mut();
            let root = tree.root;
            let ids = tree.attach_parsed(Some(root), nodes);
            for id in &ids {
                tree.node_mut(root).children.push(*id);
            }
        }
        Ok(document)
    }

    pub fn body(&self) -> Element {
        let root = self.tree.borrow().root;
        Element {
            document: self.clone(),
            id: root,
        }
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> Element {
        let id = self.tree.borrow_mut().alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: IndexMap::new(),
        });
        Element {
            document: self.clone(),
            id,
        }
    }

    /// Parse markup into detached top-level elements. Whitespace-only text
    /// between the top-level elements is dropped; nested text is kept.
    pub fn parse_fragment(&self, html: &str) -> Result<Vec<Element>> {
        let nodes = parse_nodes(html)?
            .into_iter()
            .filter(|node| match node {
                HtmlNode::Text(text) => !text.trim().is_empty(),
                HtmlNode::Element { .. } => true,
            })
            .collect::<Vec<_>>();
        let ids = self.tree.borrow_mut().attach_parsed(None, nodes);
        Ok(ids
            .into_iter()
            .map(|id| Element {
                document: self.clone(),
                id,
            })
            .filter(Element::is_element)
            .collect())
    }

    /// First element (document order) whose `id` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<Element> {
        let body = self.body();
        if body.attr("id").as_deref() == Some(id) {
            return Some(body);
        }
        body.descendants()
            .into_iter()
            .find(|element| element.attr("id").as_deref() == Some(id))
    }

    pub fn active_element(&self) -> Option<Element> {
        let active = self.tree.borrow().active?;
        Some(Element {
            document: self.clone(),
            id: active,
        })
    }

    pub(crate) fn element(&self, id: NodeId) -> Element {
        Element {
            document: self.clone(),
            id,
        }
    }

    pub fn same_document(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Document({} nodes)", self.tree.borrow().nodes.len())
    }
}

/// Handle to one element node.
#[derive(Clone)]
pub struct Element {
    document: Document,
    id: NodeId,
}

impl Element {
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn is_element(&self) -> bool {
        matches!(
            self.document.tree.borrow().node(self.id).data,
            NodeData::Element { .. }
        )
    }

    pub fn tag(&self) -> String {
        match &self.document.tree.borrow().node(self.id).data {
            NodeData::Element { tag, .. } => tag.clone(),
            NodeData::Text(_) => String::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        match &self.document.tree.borrow().node(self.id).data {
            NodeData::Element { attrs, .. } => attrs.get(name).cloned(),
            NodeData::Text(_) => None,
        }
    }

    pub fn has_attr(&self, name: &str) -> bool {
        match &self.document.tree.borrow().node(self.id).data {
            NodeData::Element { attrs, .. } => attrs.contains_key(name),
            NodeData::Text(_) => false,
        }
    }

    pub fn set_attr(&self, name: &str, value: &str) {
        let mut tree = self.document.tree.borrow_mut();
        if let NodeData::Element { attrs, .. } = &mut tree.node_mut(self.id).data {
            attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&self, name: &str) {
        let mut tree = self.document.tree.borrow_mut();
        if let NodeData::Element { attrs, .. } = &mut tree.node_mut(self.id).data {
            attrs.shift_remove(name);
        }
    }

    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|value| value.split_whitespace().any(|entry| entry == class))
    }

    pub fn add_class(&self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let mut classes = self.attr("class").unwrap_or_default();
        if !classes.is_empty() {
            classes.push(' ');
        }
        classes.push_str(class);
        self.set_attr("class", &classes);
    }

    pub fn remove_class(&self, class: &str) {
        let Some(value) = self.attr("class") else {
            return;
        };
        let remaining = value
            .split_whitespace()
            .filter(|entry| *entry != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr("class", &remaining);
    }

    pub fn toggle_class(&self, class: &str, on: bool) {
        if on {
            self.add_class(class);
        } else {
            self.remove_class(class);
        }
    }

    pub fn parent(&self) -> Option<Element> {
        let parent = self.document.tree.borrow().node(self.id).parent?;
        Some(self.document.element(parent))
    }

    /// Element children, in order.
    pub fn children(&self) -> Vec<Element> {
        let tree = self.document.tree.borrow();
        tree.node(self.id)
            .children
            .iter()
            .filter(|child| matches!(tree.node(**child).data, NodeData::Element { .. }))
            .map(|child| self.document.element(*child))
            .collect()
    }

    /// Every descendant element in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<Element> {
        let ids = self.document.tree.borrow().descendant_elements(self.id);
        ids.into_iter()
            .map(|id| self.document.element(id))
            .collect()
    }

    /// Inclusive ancestor check, like the browser's `Node.contains`.
    pub fn contains(&self, other: &Element) -> bool {
        if !self.document.same_document(other.document()) {
            return false;
        }
        let tree = self.document.tree.borrow();
        let mut cursor = Some(other.id);
        while let Some(id) = cursor {
            if id == self.id {
                return true;
            }
            cursor = tree.node(id).parent;
        }
        false
    }

    pub fn append_child(&self, child: &Element) {
        self.document.tree.borrow_mut().append(self.id, child.id);
    }

    /// Insert `new_sibling` directly after `self` under the same parent.
    pub fn insert_after(&self, new_sibling: &Element) -> Result<()> {
        let mut tree = self.document.tree.borrow_mut();
        let Some(parent) = tree.node(self.id).parent else {
            return Err(Error::DetachedElement);
        };
        tree.detach(new_sibling.id);
        let siblings = &mut tree.node_mut(parent).children;
        let position = siblings
            .iter()
            .position(|sibling| *sibling == self.id)
            .map(|position| position + 1)
            .unwrap_or(siblings.len());
        siblings.insert(position, new_sibling.id);
        tree.node_mut(new_sibling.id).parent = Some(parent);
        Ok(())
    }

    pub fn detach(&self) {
        self.document.tree.borrow_mut().detach(self.id);
    }

    /// Swap `new` into this element's position. `self` ends up detached.
    pub fn replace_with(&self, new: &Element) -> Result<()> {
        let mut tree = self.document.tree.borrow_mut();
        let Some(parent) = tree.node(self.id).parent else {
            return Err(Error::DetachedElement);
        };
        tree.detach(new.id);
        let siblings = &mut tree.node_mut(parent).children;
        let Some(position) = siblings.iter().position(|sibling| *sibling == self.id) else {
            return Err(Error::DetachedElement);
        };
        siblings[position] = new.id;
        tree.node_mut(new.id).parent = Some(parent);
        tree.node_mut(self.id).parent = None;
        Ok(())
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let tree = self.document.tree.borrow();
        let mut out = String::new();
        let mut pending: Vec<NodeId> = tree.node(self.id).children.iter().rev().copied().collect();
        while let Some(current) = pending.pop() {
            match &tree.node(current).data {
                NodeData::Text(text) => out.push_str(text),
                NodeData::Element { .. } => {
                    pending.extend(tree.node(current).children.iter().rev().copied());
                }
            }
        }
        out
    }

    /// Replace all children with a single text node.
    pub fn set_text(&self, text: &str) {
        let mut tree = self.document.tree.borrow_mut();
        let children = tree.node(self.id).children.clone();
        for child in children {
            tree.node_mut(child).parent = None;
        }
        tree.node_mut(self.id).children.clear();
        let text_id = tree.alloc(NodeData::Text(text.to_string()));
        tree.node_mut(text_id).parent = Some(self.id);
        tree.node_mut(self.id).children.push(text_id);
    }

    /// Replace all children with parsed markup.
    pub fn set_inner_html(&self, html: &str) -> Result<()> {
        let nodes = parse_nodes(html)?;
        let mut tree = self.document.tree.borrow_mut();
        let children = tree.node(self.id).children.clone();
        for child in children {
            tree.node_mut(child).parent = None;
        }
        tree.node_mut(self.id).children.clear();
        let ids = tree.attach_parsed(Some(self.id), nodes);
        for id in &ids {
            tree.node_mut(self.id).children.push(*id);
        }
        Ok(())
    }

    pub fn inner_html(&self) -> String {
        let tree = self.document.tree.borrow();
        let mut out = String::new();
        for child in tree.node(self.id).children.clone() {
            tree.serialize(child, &mut out);
        }
        out
    }

    pub fn outer_html(&self) -> String {
        let tree = self.document.tree.borrow();
        let mut out = String::new();
        tree.serialize(self.id, &mut out);
        out
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        selector.matches(self)
    }

    /// Descendants matching `selector`, in document order.
    pub fn select_all(&self, selector: &Selector) -> Vec<Element> {
        self.descendants()
            .into_iter()
            .filter(|element| selector.matches(element))
            .collect()
    }

    pub fn select(&self, selector: &Selector) -> Option<Element> {
        self.descendants()
            .into_iter()
            .find(|element| selector.matches(element))
    }

    /// Make this the document's active element.
    pub fn focus(&self) {
        self.document.tree.borrow_mut().active = Some(self.id);
    }

    pub fn is_focused(&self) -> bool {
        self.document.tree.borrow().active == Some(self.id)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.document.same_document(&other.document)
    }
}

impl Eq for Element {}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tree = self.document.tree.borrow();
        match &tree.node(self.id).data {
            NodeData::Text(text) => write!(f, "#text({text:?})"),
            NodeData::Element { tag, attrs } => {
                write!(f, "<{tag}")?;
                for (name, value) in attrs {
                    write!(f, " {name}=\"{value}\"")?;
                }
                write!(f, ">")
            }
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Element({} {})", self.id.0, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_round_trip() {
        let html = r#"<div class="card"><span>a &amp; b</span><br></div>"#;
        let doc = Document::parse(html).unwrap();
        assert_eq!(doc.body().inner_html(), html);
    }

    #[test]
    fn attributes_and_classes() {
        let doc = Document::parse(r#"<div class="a b"></div>"#).unwrap();
        let div = doc.body().children()[0].clone();
        assert!(div.has_class("a"));
        assert!(!div.has_class("ab"));
        div.add_class("c");
        div.remove_class("a");
        assert_eq!(div.attr("class").as_deref(), Some("b c"));
        div.toggle_class("c", false);
        div.set_attr("data-x", "1");
        assert!(div.has_attr("data-x"));
        div.remove_attr("data-x");
        assert!(!div.has_attr("data-x"));
    }

    #[test]
    fn descendants_are_document_order() {
        let doc = Document::parse("<a><b><c></c></b><d></d></a><e></e>").unwrap();
        let tags: Vec<_> = doc
            .body()
            .descendants()
            .iter()
            .map(Element::tag)
            .collect();
        assert_eq!(tags, ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn replace_with_swaps_position() {
        let doc = Document::parse("<ul><li>one</li><li>two</li></ul>").unwrap();
        let list = doc.body().children()[0].clone();
        let first = list.children()[0].clone();
        let replacement = doc.parse_fragment("<li>three</li>").unwrap().remove(0);
        first.replace_with(&replacement).unwrap();
        assert_eq!(list.inner_html(), "<li>three</li><li>two</li>");
        assert!(first.parent().is_none());
        assert_eq!(replacement.parent(), Some(list));
    }

    #[test]
    fn replace_detached_element_fails() {
        let doc = Document::new();
        let detached = doc.create_element("div");
        let other = doc.create_element("span");
        assert!(matches!(
            detached.replace_with(&other),
            Err(Error::DetachedElement),
        ));
    }

    #[test]
    fn insert_after_moves_the_sibling() {
        let doc = Document::parse("<p><a></a><b></b></p><aside></aside>").unwrap();
        let p = doc.body().children()[0].clone();
        let a = p.children()[0].clone();
        let aside = doc.body().children()[1].clone();
        a.insert_after(&aside).unwrap();
        assert_eq!(p.inner_html(), "<a></a><aside></aside><b></b>");
    }

    #[test]
    fn element_by_id_and_focus() {
        let doc = Document::parse(r#"<form><input id="age"></form>"#).unwrap();
        let input = doc.element_by_id("age").unwrap();
        assert_eq!(input.tag(), "input");
        assert!(doc.active_element().is_none());
        input.focus();
        assert!(input.is_focused());
        assert_eq!(doc.active_element(), Some(input));
    }

    #[test]
    fn text_extraction_and_set_text() {
        let doc = Document::parse("<p>one <b>two</b></p>").unwrap();
        let p = doc.body().children()[0].clone();
        assert_eq!(p.text(), "one two");
        p.set_text("a < b");
        assert_eq!(p.outer_html(), "<p>a &lt; b</p>");
    }

    #[test]
    fn parse_fragment_yields_detached_elements() {
        let doc = Document::new();
        let fragment = doc.parse_fragment("<div></div> <span></span>").unwrap();
        assert_eq!(fragment.len(), 2);
        assert!(fragment.iter().all(|element| element.parent().is_none()));
    }

    #[test]
    fn contains_is_inclusive() {
        let doc = Document::parse("<a><b></b></a><c></c>").unwrap();
        let a = doc.body().children()[0].clone();
        let b = a.children()[0].clone();
        let c = doc.body().children()[1].clone();
        assert!(a.contains(&a));
        assert!(a.contains(&b));
        assert!(!a.contains(&c));
    }
}
