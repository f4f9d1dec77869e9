//! Restricted rich-text markup: sanitizing parser, arena node tree, and the
//! DOM-style primitives the offset engine mutates.
//!
//! Only inline formatting and paragraph tags survive parsing, with every
//! attribute stripped. Each run of characters between two tags becomes its own
//! text node and nothing is ever merged, so the same markup always produces the
//! same text-node boundaries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::ops::Range;
use std::sync::LazyLock;

use pulldown_cmark_escape::{escape_html, escape_html_body_text};
use regex::Regex;

use crate::types::NodeId;

/// Elements whose content is dropped along with the tag.
const DROPPED_TAGS: &[&str] = &["iframe", "noscript", "object", "script", "style", "template"];

/// Elements kept in the tree. Anything else is unwrapped.
const KEPT_TAGS: &[&str] = &["b", "br", "em", "i", "p", "span", "strong", "u"];

/// Longest entity body considered for decoding, e.g. `#x10FFFF`.
const MAX_ENTITY_LEN: usize = 10;

/// Kept elements that never have children.
const VOID_TAGS: &[&str] = &["br"];

/// Comments, doctypes, processing instructions, and start/end tags.
/// Attribute values may contain `>` when quoted.
#[allow(clippy::expect_used, reason = "literal pattern, compile-time invariant")]
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(
        r#"(?s)<!--.*?(?:-->|\z)|<![^>]*>|<\?[^>]*>|<(/?)([A-Za-z][A-Za-z0-9-]*)(?:[^>"']|"[^"]*"|'[^']*')*>"#,
    )
    .expect("valid regex");
});

/// Markup tree held in an arena. Slot 0 is the root container, which has no tag
/// and is never serialized itself.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Every node ever allocated; nodes are never freed.
    nodes: Vec<Node>,
}

/// One arena slot.
#[derive(Debug, Clone)]
struct Node {
    /// Child nodes in document order. Always empty for text nodes.
    children: Vec<NodeId>,
    /// Element or text payload.
    kind: NodeKind,
    /// Owning element; `None` only for the root.
    parent: Option<NodeId>,
}

/// Payload of a node.
#[derive(Debug, Clone)]
enum NodeKind {
    /// An element. Parsed elements carry no attributes; wrappers may.
    Element {
        /// Attribute name/value pairs in output order.
        attrs: Vec<(String, String)>,
        /// Lowercase tag name; empty for the root.
        tag: String,
    },
    /// Decoded character data.
    Text(String),
}

/// A request to wrap a char range of one text node in a new element.
#[derive(Debug, Clone)]
pub struct NodeSpan {
    /// Text node to wrap part of.
    pub node: NodeId,
    /// Char range inside the node's text.
    pub range: Range<usize>,
    /// Element to wrap the range in.
    pub wrapper: Wrapper,
}

/// Element template used when wrapping text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapper {
    /// Attribute name/value pairs in output order.
    pub attrs: Vec<(String, String)>,
    /// Tag name.
    pub tag: String,
}

impl Wrapper {
    /// A wrapper with no attributes.
    pub fn plain(tag: &str) -> Self {
        return Self {
            attrs: Vec::new(),
            tag: tag.to_string(),
        };
    }

    /// Append an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        return self;
    }
}

impl Fragment {
    /// Allocate a node and return its id.
    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        return id;
    }

    /// Append an empty element as the last child of `parent`.
    /// Returns `None` if `parent` is not an element.
    pub fn append_element(&mut self, parent: NodeId, wrapper: Wrapper) -> Option<NodeId> {
        if self.text(parent).is_some() {
            return None;
        }
        self.nodes.get(parent.0)?;
        let id = self.alloc(Node {
            children: Vec::new(),
            kind: NodeKind::Element {
                attrs: wrapper.attrs,
                tag: wrapper.tag,
            },
            parent: Some(parent),
        });
        self.nodes.get_mut(parent.0)?.children.push(id);
        return Some(id);
    }

    /// Append a text node as the last child of `parent`.
    /// Empty text creates nothing and returns `None`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Option<NodeId> {
        if text.is_empty() || self.text(parent).is_some() {
            return None;
        }
        self.nodes.get(parent.0)?;
        let id = self.alloc(Node {
            children: Vec::new(),
            kind: NodeKind::Text(text.to_string()),
            parent: Some(parent),
        });
        self.nodes.get_mut(parent.0)?.children.push(id);
        return Some(id);
    }

    /// Child ids of a node in document order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        return self.nodes.get(id.0).map_or(&[], |n| return n.children.as_slice());
    }

    /// An empty tree holding only the root container.
    pub fn empty() -> Self {
        return Self {
            nodes: vec![Node {
                children: Vec::new(),
                kind: NodeKind::Element {
                    attrs: Vec::new(),
                    tag: String::new(),
                },
                parent: None,
            }],
        };
    }

    /// The last element with this tag in document order.
    pub fn last_element(&self, tag: &str) -> Option<NodeId> {
        let mut found = None;
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if self.tag(id) == Some(tag) {
                found = Some(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        return found;
    }

    /// Owning element of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        return self.nodes.get(id.0)?.parent;
    }

    /// Parse and sanitize markup. Never fails: unknown tags are unwrapped,
    /// active content is dropped, and unbalanced closing tags are ignored.
    pub fn parse(markup: &str) -> Self {
        let mut fragment = Self::empty();
        let mut open: Vec<(String, NodeId)> = Vec::new();
        let mut skipping: Option<String> = None;
        let mut cursor = 0_usize;

        for caps in TAG_PATTERN.captures_iter(markup) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if skipping.is_none() {
                let text = markup.get(cursor..whole.start()).unwrap_or("");
                fragment.push_decoded_text(current_parent(&open), text);
            }
            cursor = whole.end();

            // Comments, doctypes, and processing instructions have no name.
            let Some(name) = caps.get(2) else {
                continue;
            };
            let tag = name.as_str().to_ascii_lowercase();
            let closing = caps.get(1).is_some_and(|m| return !m.as_str().is_empty());

            if let Some(dropped) = &skipping {
                if closing && tag == *dropped {
                    skipping = None;
                }
                continue;
            }
            if DROPPED_TAGS.contains(&tag.as_str()) {
                if !closing {
                    skipping = Some(tag);
                }
                continue;
            }
            if !KEPT_TAGS.contains(&tag.as_str()) {
                continue;
            }
            if closing {
                close_open_element(&mut open, &tag);
                continue;
            }
            if tag == "p" {
                close_open_element(&mut open, "p");
            }
            let parent = current_parent(&open);
            let Some(id) = fragment.append_element(parent, Wrapper::plain(&tag)) else {
                continue;
            };
            if !VOID_TAGS.contains(&tag.as_str()) {
                open.push((tag, id));
            }
        }

        if skipping.is_none() {
            let text = markup.get(cursor..).unwrap_or("");
            fragment.push_decoded_text(current_parent(&open), text);
        }
        return fragment;
    }

    /// Decode entities in raw character data and append it as a text node.
    fn push_decoded_text(&mut self, parent: NodeId, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let _ = self.append_text(parent, &decode_entities(raw));
        return;
    }

    /// Replace the character data of a text node. Returns `false` for elements.
    pub fn replace_text(&mut self, id: NodeId, text: String) -> bool {
        let Some(node) = self.nodes.get_mut(id.0) else {
            return false;
        };
        let NodeKind::Text(current) = &mut node.kind else {
            return false;
        };
        *current = text;
        return true;
    }

    /// The root container.
    pub const fn root(&self) -> NodeId {
        return NodeId(0);
    }

    /// Split a text node at a char offset, like the DOM's `Text.splitText`:
    /// the node keeps the prefix and a new sibling inserted right after it gets
    /// the rest. Returns the new node, or `None` if the offset is past the end
    /// or the node is not an attached text node.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Option<NodeId> {
        let text = self.text(id)?;
        let byte = byte_offset(text, offset)?;
        let head = text.get(..byte)?.to_string();
        let tail = text.get(byte..)?.to_string();
        let parent = self.parent(id)?;
        let index = self.children(parent).iter().position(|&c| return c == id)?;

        let new_id = self.alloc(Node {
            children: Vec::new(),
            kind: NodeKind::Text(tail),
            parent: Some(parent),
        });
        self.replace_text(id, head);
        self.nodes
            .get_mut(parent.0)?
            .children
            .insert(index.saturating_add(1), new_id);
        return Some(new_id);
    }

    /// Tag name of an element; `None` for text nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        return match &self.nodes.get(id.0)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            NodeKind::Text(_) => None,
        };
    }

    /// Character data of a text node; `None` for elements.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        return match &self.nodes.get(id.0)?.kind {
            NodeKind::Element { .. } => None,
            NodeKind::Text(text) => Some(text.as_str()),
        };
    }

    /// Every text node under the root, in document order.
    pub fn text_nodes(&self) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if self.text(id).is_some() {
                found.push(id);
                continue;
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        return found;
    }

    /// Serialize the root's content back to markup.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for &child in self.children(self.root()) {
            self.write_node(child, &mut out);
        }
        return out;
    }

    /// Replace a node in its parent with a new element that contains it.
    /// Returns the wrapper element's id.
    pub fn wrap(&mut self, id: NodeId, wrapper: Wrapper) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.children(parent).iter().position(|&c| return c == id)?;
        let wrapper_id = self.alloc(Node {
            children: vec![id],
            kind: NodeKind::Element {
                attrs: wrapper.attrs,
                tag: wrapper.tag,
            },
            parent: Some(parent),
        });
        let slot = self.nodes.get_mut(parent.0)?.children.get_mut(index)?;
        *slot = wrapper_id;
        self.nodes.get_mut(id.0)?.parent = Some(wrapper_id);
        return Some(wrapper_id);
    }

    /// Wrap every requested span in a single pass and return how many wrapper
    /// elements were created.
    ///
    /// Each affected text node is split once at every span boundary inside it,
    /// cutting from the highest offset down so the node ids of lower pieces stay
    /// valid. Every piece is then wrapped by each span covering it; spans earlier
    /// in `spans` end up outermost. Spans must refer to the text nodes as they
    /// were before this call.
    pub fn wrap_spans(&mut self, spans: &[NodeSpan]) -> usize {
        let mut by_node: BTreeMap<NodeId, Vec<&NodeSpan>> = BTreeMap::new();
        for span in spans.iter().filter(|s| return s.range.start < s.range.end) {
            by_node.entry(span.node).or_default().push(span);
        }

        let mut created = 0_usize;
        for (node, node_spans) in by_node {
            let Some(len) = self.text(node).map(|t| return t.chars().count()) else {
                continue;
            };
            let cuts: BTreeSet<usize> = node_spans
                .iter()
                .flat_map(|s| return [s.range.start, s.range.end])
                .filter(|&c| return c > 0 && c < len)
                .collect();

            let mut pieces: Vec<(usize, NodeId)> = Vec::new();
            for &cut in cuts.iter().rev() {
                if let Some(piece) = self.split_text(node, cut) {
                    pieces.push((cut, piece));
                }
            }
            pieces.push((0, node));
            pieces.reverse();

            for (index, &(start, piece)) in pieces.iter().enumerate() {
                let end = pieces
                    .get(index.saturating_add(1))
                    .map_or(len, |&(next, _)| return next);
                let mut current = piece;
                for span in node_spans
                    .iter()
                    .rev()
                    .filter(|s| return s.range.start <= start && end <= s.range.end)
                {
                    if let Some(wrapper) = self.wrap(current, span.wrapper.clone()) {
                        current = wrapper;
                        created = created.saturating_add(1);
                    }
                }
            }
        }
        return created;
    }

    /// Serialize one node and its subtree.
    fn write_node(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => {
                let _ = escape_html_body_text(&mut *out, text);
            },
            NodeKind::Element { attrs, tag } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"");
                    let _ = escape_html(&mut *out, value);
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for &child in &node.children {
                    self.write_node(child, out);
                }
                let _ = write!(out, "</{tag}>");
            },
        }
        return;
    }
}

/// Char offset to byte offset, allowing the one-past-the-end position.
pub fn byte_offset(text: &str, chars: usize) -> Option<usize> {
    return text
        .char_indices()
        .map(|(byte, _)| return byte)
        .chain(std::iter::once(text.len()))
        .nth(chars);
}

/// Close the innermost open element with this tag and everything opened inside
/// it. Does nothing if no such element is open.
fn close_open_element(open: &mut Vec<(String, NodeId)>, tag: &str) {
    if let Some(index) = open.iter().rposition(|(t, _)| return t == tag) {
        open.truncate(index);
    }
    return;
}

/// Parent for the next node: the innermost open element, or the root.
fn current_parent(open: &[(String, NodeId)]) -> NodeId {
    return open.last().map_or(NodeId(0), |&(_, id)| return id);
}

/// Decode a single entity body (the part between `&` and `;`).
fn decode_entity(name: &str) -> Option<char> {
    return match name {
        "amp" => Some('&'),
        "apos" => Some('\''),
        "gt" => Some('>'),
        "lt" => Some('<'),
        "nbsp" => Some('\u{a0}'),
        "quot" => Some('"'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        },
    };
}

/// Decode named and numeric entities; unknown entities stay literal.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(rest.get(..amp).unwrap_or(""));
        let from_amp = rest.get(amp..).unwrap_or("");
        let decoded = from_amp
            .find(';')
            .filter(|&semi| return semi <= MAX_ENTITY_LEN)
            .and_then(|semi| {
                let ch = decode_entity(from_amp.get(1..semi)?)?;
                return Some((ch, semi));
            });
        if let Some((ch, semi)) = decoded {
            out.push(ch);
            rest = from_amp.get(semi.saturating_add(1)..).unwrap_or("");
        } else {
            out.push('&');
            rest = from_amp.get(1..).unwrap_or("");
        }
    }
    out.push_str(rest);
    return out;
}

#[cfg(test)]
impl Fragment {
    /// Attribute value on an element.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        let NodeKind::Element { attrs, .. } = &self.nodes.get(id.0)?.kind else {
            return None;
        };
        return attrs
            .iter()
            .find(|(n, _)| return n == name)
            .map(|(_, v)| return v.as_str());
    }

    /// Every element with this tag in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if self.tag(id) == Some(tag) {
                found.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        return found;
    }

    /// Concatenated text of a subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        return self
            .children(id)
            .iter()
            .map(|&c| return self.text_content(c))
            .collect();
    }
}
