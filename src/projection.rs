//! Plain-text projection of a markup tree and the offset walker over it.
//!
//! The projection is built once per render from the text nodes in document
//! order and never changes afterwards, so resolving any number of offsets in
//! any order is safe even while the tree itself is being mutated.

use std::ops::Range;

use crate::error::Error;
use crate::markup::{Fragment, byte_offset};
use crate::types::{Confidence, LiveSelection, NodeId, NodePosition, ResolvedSelection};

/// Which side of a range an offset anchors. Decides the owning node when the
/// offset falls exactly on the boundary between two text nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Range end: the boundary belongs to the node that ends there.
    End,
    /// Range start: the boundary belongs to the node that starts there.
    Start,
}

/// Text-only view of a tree with back-pointers from offsets to text nodes.
#[derive(Debug, Clone)]
pub struct Projection {
    /// Length in chars.
    len: usize,
    /// One entry per non-empty text node, in document order.
    segments: Vec<Segment>,
    /// Concatenated text of every text node.
    text: String,
}

/// Provenance of one text node inside the projection.
#[derive(Debug, Clone, Copy)]
struct Segment {
    /// Length in chars.
    len: usize,
    /// Text node this segment came from.
    node: NodeId,
    /// Global char offset of the node's first char.
    start: usize,
}

impl Segment {
    /// Global char offset one past the node's last char.
    const fn end(&self) -> usize {
        return self.start.saturating_add(self.len);
    }
}

impl Projection {
    /// Walk the tree's text nodes once and record where each one lands.
    pub fn build(fragment: &Fragment) -> Self {
        let mut text = String::new();
        let mut segments = Vec::new();
        let mut len = 0_usize;

        for node in fragment.text_nodes() {
            let content = fragment.text(node).unwrap_or("");
            let chars = content.chars().count();
            if chars == 0 {
                continue;
            }
            segments.push(Segment {
                len: chars,
                node,
                start: len,
            });
            text.push_str(content);
            len = len.saturating_add(chars);
        }

        return Self { len, segments, text };
    }

    /// Validate a range against the projection.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRange` unless `start < end <= len`.
    pub fn checked_range(&self, range: Range<usize>) -> Result<Range<usize>, Error> {
        if range.start >= range.end || range.end > self.len {
            return Err(Error::InvalidRange {
                end: range.end,
                len: self.len,
                start: range.start,
            });
        }
        return Ok(range);
    }

    /// Whether the tree holds no text at all.
    pub const fn is_empty(&self) -> bool {
        return self.len == 0;
    }

    /// Length in chars.
    pub const fn len(&self) -> usize {
        return self.len;
    }

    /// Char offsets of every occurrence of `needle`, overlapping ones included.
    pub fn occurrences(&self, needle: &str) -> Vec<usize> {
        let mut hits = Vec::new();
        if needle.is_empty() {
            return hits;
        }
        let mut from = 0_usize;
        while let Some(relative) = self.text.get(from..).and_then(|rest| return rest.find(needle)) {
            let byte = from.saturating_add(relative);
            hits.push(self.text.get(..byte).map_or(0, |prefix| return prefix.chars().count()));
            let step = self
                .text
                .get(byte..)
                .and_then(|rest| return rest.chars().next())
                .map_or(1, char::len_utf8);
            from = byte.saturating_add(step);
        }
        return hits;
    }

    /// Global offset of a point inside a text node, matched by node identity.
    /// `None` if the node is not one of this projection's text nodes or the
    /// offset is past the node's end.
    pub fn position_of(&self, point: NodePosition) -> Option<usize> {
        let segment = self.segments.iter().find(|s| return s.node == point.node)?;
        if point.offset > segment.len {
            return None;
        }
        return Some(segment.start.saturating_add(point.offset));
    }

    /// Map a global offset to the text node holding it and the offset inside
    /// that node.
    ///
    /// A start anchor picks the first node whose end lies strictly after the
    /// offset; an end anchor picks the first node whose end is at or after it.
    /// An offset equal to the total length resolves to the end of the last
    /// text node. Returns `None` for an empty tree or an offset past the end.
    pub fn resolve_offset_to_node(&self, offset: usize, anchor: Anchor) -> Option<NodePosition> {
        if offset > self.len {
            return None;
        }
        if offset == self.len {
            let last = self.segments.last()?;
            return Some(NodePosition {
                node: last.node,
                offset: last.len,
            });
        }
        let index = match anchor {
            Anchor::End => self.segments.partition_point(|s| return s.end() < offset),
            Anchor::Start => self.segments.partition_point(|s| return s.end() <= offset),
        };
        let segment = self.segments.get(index)?;
        return Some(NodePosition {
            node: segment.node,
            offset: offset.checked_sub(segment.start)?,
        });
    }

    /// Convert a live selection into global offsets.
    ///
    /// When both points sit in text nodes of this projection the offsets are
    /// exact. Otherwise the selected text is searched for in the projection and
    /// accepted only if it occurs exactly once; that result is flagged
    /// `Confidence::Degraded`. Backwards selections are normalized.
    ///
    /// # Errors
    ///
    /// Returns `Error::SelectionNotFound` when the text does not occur (or is
    /// empty), and `Error::SelectionAmbiguous` when it occurs more than once.
    pub fn resolve_selection_to_offsets(&self, selection: &LiveSelection) -> Result<ResolvedSelection, Error> {
        let exact = self
            .position_of(selection.start)
            .zip(self.position_of(selection.end));
        if let Some((a, b)) = exact
            && a != b
        {
            return Ok(ResolvedSelection {
                confidence: Confidence::Exact,
                range: a.min(b)..a.max(b),
            });
        }

        let needle = selection.text.as_str();
        let hits = self.occurrences(needle);
        return match hits.as_slice() {
            [] => Err(Error::SelectionNotFound { text: needle.to_string() }),
            [only] => {
                tracing::debug!(offset = only, "selection located by text search");
                Ok(ResolvedSelection {
                    confidence: Confidence::Degraded,
                    range: *only..only.saturating_add(needle.chars().count()),
                })
            },
            many => Err(Error::SelectionAmbiguous {
                count: many.len(),
                text: needle.to_string(),
            }),
        };
    }

    /// Per-node pieces a global range covers: each text node it touches with
    /// the char range inside that node.
    pub fn segments_in(&self, range: Range<usize>) -> Vec<(NodeId, Range<usize>)> {
        if range.start >= range.end {
            return Vec::new();
        }
        let bounds = self
            .resolve_offset_to_node(range.start, Anchor::Start)
            .zip(self.resolve_offset_to_node(range.end, Anchor::End));
        let Some((first, last)) = bounds else {
            return Vec::new();
        };
        let index_of = |node: NodeId| return self.segments.iter().position(|s| return s.node == node);
        let (Some(from), Some(to)) = (index_of(first.node), index_of(last.node)) else {
            return Vec::new();
        };
        return self
            .segments
            .get(from..=to)
            .unwrap_or_default()
            .iter()
            .filter_map(|s| {
                let lo = range.start.max(s.start);
                let hi = range.end.min(s.end());
                if lo >= hi {
                    return None;
                }
                return Some((s.node, lo.saturating_sub(s.start)..hi.saturating_sub(s.start)));
            })
            .collect();
    }

    /// Text in a char range, or `None` if the range is reversed or out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Option<&str> {
        if range.start > range.end {
            return None;
        }
        let start = byte_offset(&self.text, range.start)?;
        let end = byte_offset(&self.text, range.end)?;
        return self.text.get(start..end);
    }

    /// The full plain text.
    pub fn text(&self) -> &str {
        return &self.text;
    }
}
