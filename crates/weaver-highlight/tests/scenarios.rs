// End-to-end behaviour of the highlighter over small documents.

use std::cell::RefCell;
use std::rc::Rc;

use weaver_highlight::{
    Annotation, AnnotationKind, Formatted, HighlightError, Highlighter, NodeId, RawSelection,
    SelectionOutcome, TextTree, TickOutcome, TreePoint, map_offsets, offset_of,
};

fn markup(h: &Highlighter) -> String {
    h.tree().to_markup(h.root())
}

/// Char span `[start, end)` covered by a marker.
fn marker_span(tree: &TextTree, root: NodeId, marker: NodeId) -> (usize, usize) {
    let start = offset_of(tree, root, marker, 0).unwrap();
    (start, start + tree.text_content(marker).chars().count())
}

fn all_markers(h: &Highlighter) -> Vec<NodeId> {
    h.tree()
        .descendants(h.root())
        .into_iter()
        .filter(|&node| h.annotation_for_marker(node).is_some())
        .collect()
}

fn leaf_snapshot(tree: &TextTree, offsets: &[usize]) -> Vec<(String, usize)> {
    map_offsets(tree, tree.root(), offsets)
        .unwrap()
        .into_iter()
        .map(|p| (tree.text(p.leaf).unwrap().to_string(), p.offset))
        .collect()
}

#[test]
fn test_single_leaf_annotation() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello world"]));
    let _handle = h.render([Annotation::new("a1", 0, 5)]);
    h.run_to_completion();

    let markers = h.find_markers("a1");
    assert_eq!(markers.len(), 1);
    assert_eq!(h.tree().text_content(markers[0]), "Hello");
    insta::assert_snapshot!(
        markup(&h),
        @r#"<div><span class="annotation" data-id="a1">Hello</span> world</div>"#
    );
}

#[test]
fn test_annotation_across_two_leaves() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello ", "world"]));
    let _handle = h.render([Annotation::new("a1", 3, 8)]);
    h.run_to_completion();

    let markers = h.find_markers("a1");
    let texts: Vec<_> = markers.iter().map(|&m| h.tree().text_content(m)).collect();
    assert_eq!(texts, vec!["lo ", "wo"]);
    for marker in markers {
        assert_eq!(
            h.tree().element(marker).unwrap().attr("data-id"),
            Some("a1")
        );
    }
}

#[test]
fn test_nested_annotations_and_hover() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello world"]));
    let _handle = h.render([Annotation::new("outer", 0, 11), Annotation::new("inner", 0, 5)]);
    h.run_to_completion();

    insta::assert_snapshot!(
        markup(&h),
        @r#"<div><span class="annotation" data-id="outer"><span class="annotation" data-id="inner">Hello</span> world</span></div>"#
    );

    let outer = h.find_markers("outer")[0];
    let inner = h.find_markers("inner")[0];
    assert!(h.tree().is_ancestor(outer, inner));

    // Pointer events arrive outermost first.
    h.pointer_enter(outer);
    h.pointer_enter(inner);
    assert!(h.tree().element(inner).unwrap().has_class("hover"));
    assert!(!h.tree().element(outer).unwrap().has_class("hover"));

    let ids: Vec<_> = h.annotations_at(inner).into_iter().map(|a| a.id).collect();
    assert_eq!(ids, vec!["inner", "outer"]);
}

#[test]
fn test_selection_reuses_existing_annotation() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello world"]));
    h.add_or_update(Annotation::new("a1", 0, 5), None).unwrap();
    let before = markup(&h);

    let leaf = h.tree().leaves(h.root()).next().unwrap();
    let outcome = h
        .select(RawSelection::new(TreePoint::new(leaf, 0), TreePoint::new(leaf, 5)))
        .unwrap();

    match outcome {
        SelectionOutcome::Reuse(annotation) => assert_eq!(annotation.id, "a1"),
        other => panic!("expected reuse, got {other:?}"),
    }
    assert!(h.selection_markers().is_empty());
    assert_eq!(markup(&h), before);
}

#[test]
fn test_selection_after_existing_span_reuses() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello world"]));
    h.add_or_update(Annotation::new("w", 6, 11), None).unwrap();

    // Select "world" through the leaf inside the marker.
    let inner_leaf = h.tree().leaves(h.root()).last().unwrap();
    let outcome = h
        .select(RawSelection::new(
            TreePoint::new(inner_leaf, 5),
            TreePoint::new(inner_leaf, 0),
        ))
        .unwrap();
    assert!(matches!(outcome, SelectionOutcome::Reuse(a) if a.id == "w"));
}

#[test]
fn test_shadow_annotation_removes_markers() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello world"]));
    h.add_or_update(Annotation::new("a1", 0, 5), None).unwrap();

    let shadow = Annotation::new("a1", 0, 5).with_kind(AnnotationKind::Shadow);
    let _handle = h.render([shadow]);
    let report = h.run_to_completion();

    assert_eq!(report.rendered, 0);
    assert!(h.find_markers("a1").is_empty());
    assert_eq!(markup(&h), "<div>Hello world</div>");
}

#[test]
fn test_round_trip_restores_coordinates() {
    let mut tree = TextTree::default();
    let root = tree.root();
    let p = tree.append_element(root, "p").unwrap();
    tree.append_text(p, "Hello ").unwrap();
    let em = tree.append_element(p, "em").unwrap();
    tree.append_text(em, "big").unwrap();
    tree.append_text(root, " world").unwrap();

    let offsets: Vec<usize> = (0..=15).collect();
    let before_markup = tree.to_markup(root);
    let before = leaf_snapshot(&tree, &offsets);

    let mut h = Highlighter::from_tree(tree);
    h.add_or_update(Annotation::new("a1", 3, 12), None).unwrap();
    h.add_or_update(Annotation::new("a2", 7, 8), None).unwrap();
    assert_eq!(h.find_markers("a1").len(), 3);

    h.remove("a2").unwrap();
    h.remove("a1").unwrap();
    assert_eq!(markup(&h), before_markup);
    assert_eq!(leaf_snapshot(h.tree(), &offsets), before);
}

#[test]
fn test_repeated_removal_is_noop() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello world"]));
    h.add_or_update(Annotation::new("a1", 2, 9), None).unwrap();
    h.remove("a1").unwrap();
    let after_first = markup(&h);

    assert_eq!(
        h.remove("a1"),
        Err(HighlightError::NoMatchingMarkers("a1".into()))
    );
    assert_eq!(markup(&h), after_first);
}

#[test]
fn test_markers_never_partially_overlap() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello ", "big ", "world"]));
    let _handle = h.render([
        Annotation::new("a", 0, 7),
        Annotation::new("b", 4, 11),
        Annotation::new("c", 2, 15),
        Annotation::new("d", 9, 10),
    ]);
    let report = h.run_to_completion();
    assert_eq!(report.rendered, 4);
    assert_eq!(h.tree().text_content(h.root()), "Hello big world");

    let root = h.root();
    let spans: Vec<_> = all_markers(&h)
        .into_iter()
        .map(|m| marker_span(h.tree(), root, m))
        .collect();
    for (i, a) in spans.iter().enumerate() {
        for b in &spans[i + 1..] {
            let disjoint = a.1 <= b.0 || b.1 <= a.0;
            let nested = (a.0 <= b.0 && b.1 <= a.1) || (b.0 <= a.0 && a.1 <= b.1);
            assert!(disjoint || nested, "{a:?} partially overlaps {b:?}");
        }
    }
}

#[test]
fn test_leaf_boundary_start_has_no_empty_marker() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello ", "world"]));
    h.add_or_update(Annotation::new("a1", 6, 11), None).unwrap();

    let markers = h.find_markers("a1");
    assert_eq!(markers.len(), 1);
    assert_eq!(h.tree().text_content(markers[0]), "world");
    for marker in all_markers(&h) {
        assert!(!h.tree().text_content(marker).is_empty());
    }
}

#[test]
fn test_batch_visits_descending_start() {
    let visited = Rc::new(RefCell::new(Vec::new()));
    let log = visited.clone();
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello big world"]))
        .with_formatter(move |a: &Annotation| {
            log.borrow_mut().push(a.start().unwrap_or_default());
            None::<Formatted>
        });

    let _handle = h.render([
        Annotation::new("a", 0, 5),
        Annotation::new("b", 10, 15),
        Annotation::new("c", 6, 9),
        Annotation::new("d", 0, 15),
        Annotation::new("e", 12, 13),
    ]);
    h.run_to_completion();

    let visited = visited.borrow();
    assert_eq!(visited.len(), 5);
    assert!(visited.windows(2).all(|w| w[0] >= w[1]), "{visited:?}");
}

#[test]
fn test_out_of_range_annotation_is_skipped() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello"]));
    let _handle = h.render([Annotation::new("ok", 0, 2), Annotation::new("bad", 3, 40)]);
    let report = h.run_to_completion();

    assert_eq!(report.rendered, 1);
    assert_eq!(report.skipped, vec!["bad"]);
    assert_eq!(h.find_markers("ok").len(), 1);
}

#[test]
fn test_ticks_render_one_chunk_each() {
    let config = weaver_highlight::HighlighterConfig {
        chunk_size: 2,
        ..Default::default()
    };
    let tree = TextTree::from_fragments(&["abcdefghij"]);
    let mut h = Highlighter::new(tree, config).unwrap();
    let mut handle = h.render((0..5).map(|i| Annotation::new(format!("a{i}"), i * 2, i * 2 + 1)));

    assert_eq!(h.tick(), TickOutcome::Pending { remaining: 2 });
    assert_eq!(h.annotations().len(), 2);
    assert!(handle.try_report().is_none());

    assert_eq!(h.tick(), TickOutcome::Pending { remaining: 1 });
    assert!(matches!(h.tick(), TickOutcome::Complete(_)));
    assert_eq!(h.tick(), TickOutcome::Idle);
    assert_eq!(handle.try_report().unwrap().unwrap().rendered, 5);
}

#[tokio::test]
async fn test_new_render_cancels_batch_in_flight() {
    let mut h = Highlighter::from_tree(TextTree::from_fragments(&["Hello world"]));
    let first = h.render([Annotation::new("a1", 0, 5)]);
    let second = h.render([Annotation::new("a2", 6, 11)]);
    h.run_to_completion();

    assert_eq!(first.finished().await, Err(HighlightError::RenderCancelled));
    let report = second.finished().await.unwrap();
    assert_eq!(report.rendered, 1);
    assert!(h.find_markers("a1").is_empty());
    assert_eq!(h.find_markers("a2").len(), 1);
}
