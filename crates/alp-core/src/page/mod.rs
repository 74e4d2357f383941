//! # Page
//!
//! A minimal element tree standing in for the document components mount into.
//!
//! Elements live in an arena keyed by [`ElementId`]. The tree has one root;
//! an element is *connected* when its parent chain reaches that root.
//! Component templates are described with [`Markup`] and materialized as
//! children of the component's host element.

mod selector;

pub use selector::Selector;

use crate::AlpError;
use std::collections::BTreeMap;
use std::fmt;

/// Identity of one element in a [`Page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// MARKUP
// =============================================================================

/// Declarative element tree, as produced by a component template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markup {
    /// Element tag.
    pub tag: String,
    /// Attributes in declaration order.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<Markup>,
    /// Text content, if any.
    pub text: Option<String>,
}

impl Markup {
    /// Start an element.
    #[must_use]
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Append a child element.
    #[must_use]
    pub fn child(mut self, child: Markup) -> Self {
        self.children.push(child);
        self
    }

    /// Set the text content.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

// =============================================================================
// PAGE
// =============================================================================

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: Option<String>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

/// Arena-backed element tree.
#[derive(Debug, Clone)]
pub struct Page {
    nodes: BTreeMap<ElementId, Node>,
    root: ElementId,
    next_id: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    /// A page holding only its root element.
    #[must_use]
    pub fn new() -> Self {
        let root = ElementId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            Node {
                tag: "body".to_string(),
                attributes: BTreeMap::new(),
                text: None,
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
        }
    }

    /// The root element.
    #[must_use]
    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Create a detached element.
    pub fn create<I, K, V>(&mut self, tag: &str, attributes: I) -> ElementId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                tag: tag.to_ascii_lowercase(),
                attributes: attributes
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
                text: None,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    /// Append `child` as the last child of `parent`, moving it if attached elsewhere.
    pub fn append(&mut self, parent: ElementId, child: ElementId) -> Result<(), AlpError> {
        self.node(parent)?;
        self.node(child)?;
        if child == self.root || self.is_ancestor(child, parent) {
            return Err(AlpError::InvalidMove {
                parent: parent.0,
                child: child.0,
            });
        }
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        Ok(())
    }

    /// Build `markup` under `host`, returning the created ids in document order.
    pub fn materialize(&mut self, host: ElementId, markup: &Markup) -> Result<Vec<ElementId>, AlpError> {
        let mut created = Vec::new();
        self.materialize_into(host, markup, &mut created)?;
        Ok(created)
    }

    fn materialize_into(
        &mut self,
        parent: ElementId,
        markup: &Markup,
        created: &mut Vec<ElementId>,
    ) -> Result<(), AlpError> {
        let id = self.create(&markup.tag, markup.attributes.iter().cloned());
        if let Some(node) = self.nodes.get_mut(&id) {
            node.text.clone_from(&markup.text);
        }
        self.append(parent, id)?;
        created.push(id);
        for child in &markup.children {
            self.materialize_into(id, child, created)?;
        }
        Ok(())
    }

    /// Remove `id` and its subtree, returning the removed ids in document order.
    pub fn remove(&mut self, id: ElementId) -> Result<Vec<ElementId>, AlpError> {
        if id == self.root {
            return Err(AlpError::ElementNotFound(id.0));
        }
        let removed = self.subtree(id)?;
        self.detach(id);
        for gone in &removed {
            self.nodes.remove(gone);
        }
        Ok(removed)
    }

    /// Whether the element exists (connected or not).
    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Whether the element's parent chain reaches the root.
    #[must_use]
    pub fn is_connected(&self, id: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(at) = current {
            if at == self.root {
                return true;
            }
            current = self.nodes.get(&at).and_then(|n| n.parent);
        }
        false
    }

    /// Element tag, lowercase.
    pub fn tag(&self, id: ElementId) -> Result<&str, AlpError> {
        Ok(&self.node(id)?.tag)
    }

    /// One attribute value.
    #[must_use]
    pub fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
        self.nodes
            .get(&id)
            .and_then(|n| n.attributes.get(name))
            .map(String::as_str)
    }

    /// All attributes, ordered by name.
    pub fn attributes(&self, id: ElementId) -> Result<&BTreeMap<String, String>, AlpError> {
        Ok(&self.node(id)?.attributes)
    }

    /// Set an attribute.
    pub fn set_attribute(&mut self, id: ElementId, name: &str, value: &str) -> Result<(), AlpError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(AlpError::ElementNotFound(id.0))?;
        node.attributes.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Text content.
    #[must_use]
    pub fn text(&self, id: ElementId) -> Option<&str> {
        self.nodes.get(&id).and_then(|n| n.text.as_deref())
    }

    /// Parent element.
    #[must_use]
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Children in document order.
    pub fn children(&self, id: ElementId) -> Result<Vec<ElementId>, AlpError> {
        Ok(self.node(id)?.children.clone())
    }

    /// `id` and all its descendants in document order.
    pub fn subtree(&self, id: ElementId) -> Result<Vec<ElementId>, AlpError> {
        self.node(id)?;
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(at) = stack.pop() {
            out.push(at);
            if let Some(node) = self.nodes.get(&at) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        Ok(out)
    }

    /// First descendant of `scope` (excluding `scope`) matching `selector`.
    pub fn query(&self, scope: ElementId, selector: &Selector) -> Result<Option<ElementId>, AlpError> {
        Ok(self
            .subtree(scope)?
            .into_iter()
            .skip(1)
            .find(|id| self.nodes.get(id).is_some_and(|n| selector.matches(&n.tag, &n.attributes))))
    }

    fn node(&self, id: ElementId) -> Result<&Node, AlpError> {
        self.nodes.get(&id).ok_or(AlpError::ElementNotFound(id.0))
    }

    fn is_ancestor(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(at) = current {
            if at == ancestor {
                return true;
            }
            current = self.nodes.get(&at).and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, id: ElementId) {
        let parent = self.nodes.get_mut(&id).and_then(|n| n.parent.take());
        if let Some(node) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            node.children.retain(|c| *c != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_attrs() -> [(&'static str, &'static str); 0] {
        []
    }

    #[test]
    fn created_elements_start_detached() {
        let mut page = Page::new();
        let el = page.create("DIV", no_attrs());
        assert!(page.contains(el));
        assert!(!page.is_connected(el));
        assert_eq!(page.tag(el).expect("tag"), "div");

        page.append(page.root(), el).expect("append");
        assert!(page.is_connected(el));

        page.set_attribute(el, "path", "notes").expect("set");
        assert_eq!(page.attribute(el, "path"), Some("notes"));
        assert!(page.set_attribute(ElementId(999), "path", "x").is_err());
    }

    #[test]
    fn materialize_builds_in_document_order() {
        let mut page = Page::new();
        let host = page.create("alp-x", no_attrs());
        let markup = Markup::element("div")
            .child(Markup::element("span").text("a"))
            .child(Markup::element("button").attr("@click", "del()"));
        let created = page.materialize(host, &markup).expect("materialize");

        assert_eq!(created.len(), 3);
        assert_eq!(page.tag(created[1]).expect("tag"), "span");
        assert_eq!(page.text(created[1]), Some("a"));
        assert_eq!(page.attribute(created[2], "@click"), Some("del()"));
        assert_eq!(page.parent(created[0]), Some(host));
    }

    #[test]
    fn remove_drops_whole_subtree() {
        let mut page = Page::new();
        let root = page.root();
        let outer = page.create("div", no_attrs());
        let inner = page.create("span", no_attrs());
        page.append(root, outer).expect("append");
        page.append(outer, inner).expect("append");

        let removed = page.remove(outer).expect("remove");
        assert_eq!(removed, vec![outer, inner]);
        assert!(!page.contains(inner));
        assert!(page.children(root).expect("children").is_empty());
    }

    #[test]
    fn cannot_append_into_own_subtree() {
        let mut page = Page::new();
        let outer = page.create("div", no_attrs());
        let inner = page.create("div", no_attrs());
        page.append(outer, inner).expect("append");
        let err = page.append(inner, outer).expect_err("cycle");
        assert!(matches!(err, AlpError::InvalidMove { parent, child } if parent == inner.0 && child == outer.0));
        let root = page.root();
        assert!(matches!(page.append(outer, root), Err(AlpError::InvalidMove { .. })));
        assert!(page.remove(root).is_err());
    }

    #[test]
    fn query_finds_first_match_below_scope() {
        let mut page = Page::new();
        let root = page.root();
        let a = page.create("alp-text", [("path", "one")]);
        let b = page.create("alp-text", [("path", "two")]);
        page.append(root, a).expect("append");
        page.append(root, b).expect("append");

        let any = Selector::parse("alp-text").expect("selector");
        assert_eq!(page.query(root, &any).expect("query"), Some(a));

        let second = Selector::parse("alp-text[path=\"two\"]").expect("selector");
        assert_eq!(page.query(root, &second).expect("query"), Some(b));
        assert_eq!(page.query(a, &any).expect("query"), None);
    }
}
