//! Headless document model built on `scraper`.
//!
//! [`Document`] stands in for the browser's live document. Lookups are
//! public; the mutations (title assignment, container swap) are only
//! reachable from the content replacer.

use scraper::node::{Node, Text};
use scraper::{ElementRef, Html, Selector};

use crate::types::DocumentSide;

/// A parsed HTML document.
#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
}

impl Document {
    /// Parse a full HTML document.
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// Document title with whitespace collapsed, empty if there is none.
    pub fn title(&self) -> String {
        self.title_element()
            .map(|title| title.text().collect::<String>())
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
    }

    /// First element matching `selector`. Invalid selectors match nothing.
    pub fn query(&self, selector: &str) -> Option<ElementRef<'_>> {
        let selector = parse_selector(selector)?;
        self.html.select(&selector).next()
    }

    /// All elements matching `selector`, in document order.
    pub fn query_all(&self, selector: &str) -> Vec<ElementRef<'_>> {
        match parse_selector(selector) {
            Some(selector) => self.html.select(&selector).collect(),
            None => Vec::new(),
        }
    }

    /// Serialized markup of the whole document.
    pub fn html(&self) -> String {
        self.html.html()
    }

    pub fn root_element(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    fn title_element(&self) -> Option<ElementRef<'_>> {
        self.query("title")
    }

    /// Replace the title text, creating a `<title>` in `<head>` if needed.
    pub(crate) fn set_title(&mut self, title: &str) {
        let existing = self.title_element().map(|element| element.id());
        let title_id = match existing {
            Some(id) => id,
            None => {
                let Some(head_id) = self.query("head").map(|head| head.id()) else {
                    tracing::warn!("document has no <head>, title not set");
                    return;
                };
                let template = Html::parse_document("<title></title>");
                let Some(value) = parse_selector("title").and_then(|selector| {
                    template
                        .select(&selector)
                        .next()
                        .map(|element| element.value().clone())
                }) else {
                    return;
                };
                match self.html.tree.get_mut(head_id) {
                    Some(mut head) => head.append(Node::Element(value)).id(),
                    None => return,
                }
            }
        };

        let children: Vec<_> = self
            .html
            .tree
            .get(title_id)
            .map(|node| node.children().map(|child| child.id()).collect::<Vec<_>>())
            .unwrap_or_default();
        for child in children {
            if let Some(mut node) = self.html.tree.get_mut(child) {
                node.detach();
            }
        }

        if let Some(mut node) = self.html.tree.get_mut(title_id) {
            node.append(Node::Text(Text { text: title.into() }));
        }
    }

    /// Replace the first match of `selector` with the first match in
    /// `incoming`. The incoming subtree moves: it is grafted here and
    /// detached from `incoming`.
    pub(crate) fn swap_container(
        &mut self,
        incoming: &mut Document,
        selector: &Selector,
    ) -> Result<(), DocumentSide> {
        let Some(current_id) = self.html.select(selector).next().map(|el| el.id()) else {
            return Err(DocumentSide::Current);
        };
        let Some(incoming_id) = incoming.html.select(selector).next().map(|el| el.id()) else {
            return Err(DocumentSide::Incoming);
        };

        let Some(value) = incoming.html.tree.get(incoming_id).map(|node| node.value().clone())
        else {
            return Err(DocumentSide::Incoming);
        };
        let Some(root_id) = self
            .html
            .tree
            .get_mut(current_id)
            .map(|mut current| current.insert_before(value).id())
        else {
            return Err(DocumentSide::Current);
        };

        let mut pending = vec![(root_id, incoming_id)];
        while let Some((target, source)) = pending.pop() {
            let children = incoming
                .html
                .tree
                .get(source)
                .map(|node| {
                    node.children()
                        .map(|child| (child.id(), child.value().clone()))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            for (source_child, value) in children {
                if let Some(mut parent) = self.html.tree.get_mut(target) {
                    pending.push((parent.append(value).id(), source_child));
                }
            }
        }

        if let Some(mut current) = self.html.tree.get_mut(current_id) {
            current.detach();
        }
        if let Some(mut moved) = incoming.html.tree.get_mut(incoming_id) {
            moved.detach();
        }
        Ok(())
    }

    /// Rebuild the tree from its own markup. Detached nodes stay in the
    /// arena until this runs.
    pub(crate) fn compact(&mut self) {
        self.html = Html::parse_document(&self.html.html());
    }

    #[cfg(test)]
    pub(crate) fn arena_len(&self) -> usize {
        self.html.tree.nodes().count()
    }
}

/// Value of `name` on `element` or its closest ancestor carrying it.
///
/// A bare attribute (`<div data-x>`) yields `Some("")`.
pub fn contextual_attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find_map(|el| el.value().attr(name))
}

pub(crate) fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!("invalid selector {selector:?}: {e}");
            None
        }
    }
}
