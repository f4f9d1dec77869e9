//! Highlight rendering: replays stored annotations as `<mark>` wrappers over
//! freshly parsed markup.
//!
//! Rendering never starts from a previously highlighted tree. Every annotation
//! is placed against one immutable projection first, and all wrappers are then
//! applied in a single pass, so the order annotations arrive in has no effect
//! on the result and one unplaceable annotation never affects the others.

use std::fmt;
use std::ops::Range;

use crate::annotation::Annotation;
use crate::markup::{Fragment, NodeSpan, Wrapper};
use crate::projection::Projection;
use crate::types::AnnotationId;

/// Class put on highlight wrappers unless configured otherwise.
pub const DEFAULT_CLASS: &str = "annotation-highlight";

/// Element used for highlight wrappers.
const WRAPPER_TAG: &str = "mark";

/// Presentation settings for highlight wrappers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightStyle {
    /// CSS class on every wrapper.
    pub class: String,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        return Self {
            class: DEFAULT_CLASS.to_string(),
        };
    }
}

/// Where an annotation ends up in the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Stored offsets are valid and cover the stored text.
    Exact(Range<usize>),
    /// Stored offsets no longer match, but the stored text occurs exactly once.
    Relocated {
        /// Stored range.
        from: Range<usize>,
        /// Range of the unique occurrence.
        to: Range<usize>,
    },
    /// The annotation cannot be drawn.
    Unplaced(SkipReason),
}

/// Result of one render: the markup plus what happened to each annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Annotations drawn, exact or relocated, in wrapping order.
    pub applied: Vec<AnnotationId>,
    /// Annotations drawn somewhere other than their stored offsets.
    pub relocated: Vec<(AnnotationId, Range<usize>)>,
    /// Annotations left out, with the reason.
    pub skipped: Vec<(AnnotationId, SkipReason)>,
    /// Number of wrapper elements created.
    pub wrappers: usize,
}

/// Highlighted markup and its report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedView {
    /// Serialized markup with highlight wrappers.
    pub html: String,
    /// Per-annotation outcome.
    pub report: RenderReport,
}

/// Why an annotation could not be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `startOffset >= endOffset`.
    EmptyRange,
    /// The range runs past the end of the document and its text is not found elsewhere.
    OutOfBounds {
        /// Stored end offset.
        end: usize,
        /// Current document length.
        len: usize,
    },
    /// The text at the stored offsets differs and cannot be found uniquely elsewhere.
    TextMismatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Self::EmptyRange => f.write_str("empty range"),
            Self::OutOfBounds { end, len } => write!(f, "ends at {end}, past the document end at {len}"),
            Self::TextMismatch => f.write_str("highlighted text no longer matches"),
        };
    }
}

/// Apply every placeable annotation to a parsed tree.
pub fn highlight(fragment: &mut Fragment, annotations: &[Annotation], style: &HighlightStyle) -> RenderReport {
    let projection = Projection::build(fragment);
    let mut report = RenderReport::default();
    let mut placed: Vec<(Range<usize>, &Annotation)> = Vec::new();

    for annotation in annotations {
        match place(annotation, &projection) {
            Placement::Exact(range) => placed.push((range, annotation)),
            Placement::Relocated { from, to } => {
                tracing::warn!(
                    annotation = %annotation.id,
                    from = ?from,
                    to = ?to,
                    "annotation relocated by text search"
                );
                report.relocated.push((annotation.id.clone(), to.clone()));
                placed.push((to, annotation));
            },
            Placement::Unplaced(reason) => {
                tracing::warn!(annotation = %annotation.id, %reason, "annotation skipped");
                report.skipped.push((annotation.id.clone(), reason));
            },
        }
    }

    // Earliest start outermost, then the longer range.
    placed.sort_by(|(ra, a), (rb, b)| {
        return ra
            .start
            .cmp(&rb.start)
            .then_with(|| return rb.end.cmp(&ra.end))
            .then_with(|| return a.id.cmp(&b.id));
    });

    let mut spans = Vec::new();
    for (range, annotation) in &placed {
        let wrapper = wrapper_for(annotation, style);
        for (node, piece) in projection.segments_in(range.clone()) {
            spans.push(NodeSpan {
                node,
                range: piece,
                wrapper: wrapper.clone(),
            });
        }
        report.applied.push(annotation.id.clone());
    }
    report.wrappers = fragment.wrap_spans(&spans);
    return report;
}

/// Decide where an annotation goes in the current projection.
///
/// Stored offsets win when they are in bounds and cover the stored text (an
/// empty stored text is trusted as-is). Otherwise the stored text is searched
/// for and used only if it occurs exactly once.
pub fn place(annotation: &Annotation, projection: &Projection) -> Placement {
    let stored = annotation.range();
    if stored.start >= stored.end {
        return Placement::Unplaced(SkipReason::EmptyRange);
    }

    let expected = annotation.highlighted_text.as_str();
    if stored.end <= projection.len() && (expected.is_empty() || projection.slice(stored.clone()) == Some(expected)) {
        return Placement::Exact(stored);
    }

    if let [only] = projection.occurrences(expected).as_slice() {
        let to = *only..only.saturating_add(expected.chars().count());
        return Placement::Relocated { from: stored, to };
    }

    if stored.end > projection.len() {
        return Placement::Unplaced(SkipReason::OutOfBounds {
            end: stored.end,
            len: projection.len(),
        });
    }
    return Placement::Unplaced(SkipReason::TextMismatch);
}

/// Parse stored markup and render it with highlights.
pub fn render(markup: &str, annotations: &[Annotation], style: &HighlightStyle) -> RenderedView {
    let mut fragment = Fragment::parse(markup);
    let report = highlight(&mut fragment, annotations, style);
    tracing::debug!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        wrappers = report.wrappers,
        "rendered highlights"
    );
    return RenderedView {
        html: fragment.to_html(),
        report,
    };
}

/// Wrapper element for one annotation.
fn wrapper_for(annotation: &Annotation, style: &HighlightStyle) -> Wrapper {
    return Wrapper::plain(WRAPPER_TAG)
        .with_attr("class", &style.class)
        .with_attr("data-annotation-id", annotation.id.as_str())
        .with_attr("data-author", &annotation.author_name)
        .with_attr("title", &annotation.tooltip());
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;
    use crate::types::NodeId;

    const FOX: &str = "<p>The quick brown fox</p>";

    fn note(id: &str, range: Range<usize>, text: &str) -> Annotation {
        Annotation {
            author_name: "Ada".to_string(),
            comment_text: "word choice".to_string(),
            content_hash: None,
            created_at: None,
            end_offset: range.end,
            highlighted_text: text.to_string(),
            id: AnnotationId::parse(id).unwrap(),
            start_offset: range.start,
        }
    }

    /// Concatenated text of every wrapper carrying this annotation id.
    fn highlighted(fragment: &Fragment, id: &str) -> String {
        fragment
            .elements_by_tag("mark")
            .into_iter()
            .filter(|&m| fragment.attr(m, "data-annotation-id") == Some(id))
            .map(|m| fragment.text_content(m))
            .collect()
    }

    /// Split one text node around a range and wrap the middle, the way a
    /// browser range surround works on a live tree.
    fn surround(fragment: &mut Fragment, node: NodeId, range: Range<usize>) -> Option<NodeId> {
        fragment.split_text(node, range.end)?;
        let middle = fragment.split_text(node, range.start)?;
        fragment.wrap(middle, Wrapper::plain("mark"))
    }

    #[test]
    fn highlights_single_word() {
        let view = render(FOX, &[note("a1", 4..9, "quick")], &HighlightStyle::default());
        assert_eq!(
            view.html,
            "<p>The <mark class=\"annotation-highlight\" data-annotation-id=\"a1\" data-author=\"Ada\" \
             title=\"Ada: word choice\">quick</mark> brown fox</p>"
        );
        assert_eq!(view.report.applied, vec![AnnotationId::parse("a1").unwrap()]);
    }

    #[test]
    fn input_order_does_not_matter() {
        let the = note("the", 0..3, "The");
        let fox = note("fox", 16..19, "fox");
        let style = HighlightStyle::default();
        let forward = render(FOX, &[the.clone(), fox.clone()], &style);
        let backward = render(FOX, &[fox, the], &style);
        assert_eq!(forward.html, backward.html);
        assert_eq!(forward.report.wrappers, 2);

        let mut fragment = Fragment::parse(&forward.html);
        let report = highlight(&mut fragment, &[note("the", 0..3, "The")], &style);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn live_tree_surround_needs_descending_order() {
        let fragment = Fragment::parse(FOX);
        let node = fragment.text_nodes()[0];

        let mut ascending = fragment.clone();
        assert!(surround(&mut ascending, node, 0..3).is_some());
        assert!(surround(&mut ascending, node, 16..19).is_none());

        let mut descending = fragment;
        assert!(surround(&mut descending, node, 16..19).is_some());
        assert!(surround(&mut descending, node, 0..3).is_some());
        assert_eq!(descending.to_html(), "<p><mark>The</mark> quick brown <mark>fox</mark></p>");
    }

    #[test]
    fn round_trips_every_range() {
        let markup = "<p>The quick <b>brown</b> fox</p><p>jumps <i>over</i></p>";
        let projection = Projection::build(&Fragment::parse(markup));
        let style = HighlightStyle::default();
        for start in 0..projection.len() {
            for end in start + 1..=projection.len() {
                let expected = projection.slice(start..end).unwrap();
                let mut fragment = Fragment::parse(markup);
                let report = highlight(&mut fragment, &[note("r", start..end, expected)], &style);
                assert!(report.skipped.is_empty(), "{start}..{end} skipped");
                assert!(report.relocated.is_empty(), "{start}..{end} relocated");
                assert_eq!(highlighted(&fragment, "r"), expected, "{start}..{end}");
                assert_eq!(Projection::build(&fragment).text(), projection.text());
            }
        }
    }

    #[test]
    fn rendering_is_idempotent() {
        let markup = "<p>The quick <b>brown</b> fox</p>";
        let notes = [note("a", 4..15, "quick brown"), note("b", 10..19, "brown fox")];
        let style = HighlightStyle::default();
        let first = render(markup, &notes, &style);
        assert_eq!(render(markup, &notes, &style), first);
        assert_eq!(render(&first.html, &notes, &style).html, first.html);
    }

    #[test]
    fn range_ending_at_document_end() {
        let mut fragment = Fragment::parse(FOX);
        let report = highlight(&mut fragment, &[note("end", 16..19, "fox")], &HighlightStyle::default());
        assert_eq!(report.applied.len(), 1);
        assert_eq!(highlighted(&fragment, "end"), "fox");
    }

    #[test]
    fn bad_annotations_are_skipped_not_fatal() {
        let notes = [
            note("good", 4..9, "quick"),
            note("moved", 0..5, "brown"),
            note("gone", 4..9, "slow"),
            note("past", 50..60, "zebra"),
            note("empty", 5..5, ""),
        ];
        let mut fragment = Fragment::parse(FOX);
        let report = highlight(&mut fragment, &notes, &HighlightStyle::default());

        assert_eq!(highlighted(&fragment, "good"), "quick");
        assert_eq!(highlighted(&fragment, "moved"), "brown");
        assert_eq!(report.relocated, vec![(AnnotationId::parse("moved").unwrap(), 10..15)]);
        assert_eq!(
            report.skipped,
            vec![
                (AnnotationId::parse("gone").unwrap(), SkipReason::TextMismatch),
                (AnnotationId::parse("past").unwrap(), SkipReason::OutOfBounds { end: 60, len: 19 }),
                (AnnotationId::parse("empty").unwrap(), SkipReason::EmptyRange),
            ]
        );
        assert_eq!(Projection::build(&fragment).text(), "The quick brown fox");
    }

    #[test]
    fn selection_across_bold_gets_one_wrapper_per_piece() {
        let markup = "<p>The quick <b>brown</b> fox</p>";
        let mut fragment = Fragment::parse(markup);
        let report = highlight(&mut fragment, &[note("x", 10..19, "brown fox")], &HighlightStyle::default());
        assert_eq!(report.wrappers, 2);
        assert_eq!(highlighted(&fragment, "x"), "brown fox");
        let bold = fragment.elements_by_tag("b")[0];
        assert_eq!(fragment.text_content(bold), "brown");
    }

    #[test]
    fn overlapping_annotations_nest() {
        let notes = [note("b", 10..19, "brown fox"), note("a", 4..15, "quick brown")];
        let mut fragment = Fragment::parse(FOX);
        let report = highlight(&mut fragment, &notes, &HighlightStyle::default());
        assert_eq!(report.applied, vec![AnnotationId::parse("a").unwrap(), AnnotationId::parse("b").unwrap()]);
        assert_eq!(highlighted(&fragment, "a"), "quick brown");
        assert_eq!(highlighted(&fragment, "b"), "brown fox");

        let outer = fragment.elements_by_tag("mark")[1];
        assert_eq!(fragment.attr(outer, "data-annotation-id"), Some("a"));
        let inner = fragment.children(outer)[0];
        assert_eq!(fragment.attr(inner, "data-annotation-id"), Some("b"));
    }

    #[test]
    fn custom_class_is_applied() {
        let style = HighlightStyle {
            class: "hl".to_string(),
        };
        let view = render(FOX, &[note("a1", 4..9, "quick")], &style);
        assert!(view.html.contains("<mark class=\"hl\""));
    }
}
