//! Dry-run static analysis of a slide tree.
//!
//! [`analyze`] walks every slide without touching any visual surface and
//! returns, per slide: flattened metadata, step count, the ordered
//! transition pairs its morph markers produce, and the annotated content
//! worth prefetching. Citation ids are numbered by first encounter across
//! the whole deck.
//!
//! The walk is two-pass. Pass 1 resolves wrapper chains under a
//! placeholder [`EvalCtx`] to accumulate section/header metadata. Pass 2
//! re-resolves with the real metadata in context, which is what lets a
//! table-of-contents slide derive its own step count from the number of
//! sections elsewhere in the deck.

use std::collections::BTreeMap;

use crate::{
    error::KinetexResult,
    grouping::{GroupStore, KeyValueStore, TransitionPair},
    snapshot::{wrap_math, MathMode},
    tree::{ComponentKind, EvalCtx, Node, Props, SlideContent, SlideMeta, SlideNode},
};

#[derive(Clone, Debug, serde::Serialize)]
pub struct SlideInfo {
    pub meta: SlideMeta,
    pub step_count: usize,
    pub transitions: Vec<TransitionPair>,
    /// Annotated, math-wrapped content strings a caller may hand to the
    /// snapshot provider ahead of time.
    pub prefetch: Vec<String>,
    /// Presenter notes, taken from the slide's first step.
    pub notes: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct AnalysisSummary {
    pub slides: Vec<SlideInfo>,
    /// Citation id to display number, first encounter wins.
    pub citations: BTreeMap<String, usize>,
}

/// A slide root resolved down to its canonical slide node, with every
/// wrapper prop flattened in (outermost occurrence of a key wins).
struct FlatSlide {
    props: Props,
    slide: SlideNode,
}

#[tracing::instrument(skip_all, fields(slides = slides.len()))]
pub fn analyze<S: KeyValueStore>(
    slides: &[Node],
    store: &GroupStore<S>,
) -> KinetexResult<AnalysisSummary> {
    // Pass 1: wrapper resolution under placeholder metadata.
    let placeholder = EvalCtx::placeholder(slides.len());
    let first_pass: Vec<Option<FlatSlide>> = slides
        .iter()
        .map(|slide| flatten_to_slide(slide, &placeholder))
        .collect();

    let metas = scan_meta(&first_pass);
    let citations = collect_citations(&first_pass, &placeholder);

    // Pass 2: the real context, now carrying the scan results.
    let mut ctx = EvalCtx {
        slide_index: 0,
        slides: metas.clone(),
        citations: citations.clone(),
    };

    let mut infos = Vec::with_capacity(slides.len());
    for (index, slide) in slides.iter().enumerate() {
        ctx.slide_index = index;
        let meta = metas[index].clone();
        let info = match flatten_to_slide(slide, &ctx) {
            Some(flat) => slide_info(&flat, meta, &ctx, store),
            None => SlideInfo {
                meta,
                step_count: 1,
                transitions: Vec::new(),
                prefetch: Vec::new(),
                notes: None,
            },
        };
        infos.push(info);
    }

    Ok(AnalysisSummary {
        slides: infos,
        citations,
    })
}

/// Resolves wrapper components until the canonical slide node is found,
/// accumulating props first-seen-wins along the way. A branch that bottoms
/// out in anything else yields `None` and a static-analysis warning.
fn flatten_to_slide(node: &Node, ctx: &EvalCtx) -> Option<FlatSlide> {
    match node {
        Node::Slide(slide) => Some(FlatSlide {
            props: slide.props.clone(),
            slide: slide.clone(),
        }),
        Node::Component(component) => match &component.kind {
            ComponentKind::Pure(render) => {
                let resolved = render(&component.props, ctx);
                let inner = flatten_to_slide(&resolved, ctx)?;
                let mut props = component.props.clone();
                props.merge_under(&inner.props);
                Some(FlatSlide {
                    props,
                    slide: inner.slide,
                })
            }
            ComponentKind::Opaque => {
                tracing::warn!(name = %component.name, "slide root is opaque, skipping");
                None
            }
        },
        _ => {
            tracing::warn!("slide root is not a component or slide node");
            None
        }
    }
}

/// Left-to-right metadata accumulator: `section` and extra props carry
/// forward until overridden, `header`/`hide_navigation`/`section_slide`
/// reset on every slide.
fn scan_meta(flattened: &[Option<FlatSlide>]) -> Vec<SlideMeta> {
    let mut metas: Vec<SlideMeta> = Vec::with_capacity(flattened.len());
    for flat in flattened {
        let mut meta = metas.last().cloned().unwrap_or_default();
        let props = flat.as_ref().map(|f| &f.props);

        meta.section_slide = false;
        meta.hide_navigation = false;
        meta.header = None;

        if let Some(props) = props {
            for (key, value) in props.iter() {
                match key.as_str() {
                    "section" => {
                        if let Some(section) = value.as_str() {
                            meta.section = Some(section.to_string());
                            meta.section_slide = true;
                        }
                    }
                    "header" => meta.header = value.as_str().map(str::to_string),
                    "hideNavigation" => meta.hide_navigation = value.as_bool().unwrap_or(false),
                    "steps" => {}
                    _ => {
                        meta.extra.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        metas.push(meta);
    }
    metas
}

fn collect_citations(
    flattened: &[Option<FlatSlide>],
    ctx: &EvalCtx,
) -> BTreeMap<String, usize> {
    let mut citations = BTreeMap::new();
    for flat in flattened.iter().flatten() {
        for tree in step_trees(&flat.slide, &flat.props, ctx) {
            let mut markers = Markers::default();
            scan_markers(&tree, ctx, &mut markers);
            for id in markers.cites {
                if !citations.contains_key(&id) {
                    let number = citations.values().copied().max().unwrap_or(0) + 1;
                    citations.insert(id, number);
                }
            }
        }
    }
    citations
}

/// Every tree a slide produces: the static content once, or the content
/// function applied to each declared step value.
fn step_trees(slide: &SlideNode, props: &Props, ctx: &EvalCtx) -> Vec<Node> {
    match &slide.content {
        SlideContent::Static(root) => vec![(**root).clone()],
        SlideContent::Steps(render) => match props.steps() {
            Some(steps) => steps.iter().map(|step| render(step, ctx)).collect(),
            None => Vec::new(),
        },
    }
}

#[derive(Default)]
struct Markers {
    morphs: Vec<crate::tree::MorphNode>,
    cites: Vec<String>,
    notes: Vec<Node>,
}

/// Locates marker nodes in evaluation order. Recursion stops at markers
/// and at opaque components; pure components are called and their result
/// walked in their place.
fn scan_markers(node: &Node, ctx: &EvalCtx, out: &mut Markers) {
    match node {
        Node::Empty | Node::Text(_) => {}
        Node::Morph(m) => out.morphs.push(m.clone()),
        Node::Cite { id } => out.cites.push(id.clone()),
        Node::Notes(content) => out.notes.push((**content).clone()),
        Node::Fragment(children) => {
            for child in children {
                scan_markers(child, ctx, out);
            }
        }
        Node::Slide(slide) => {
            if let SlideContent::Static(root) = &slide.content {
                scan_markers(root, ctx, out);
            }
        }
        Node::Component(component) => match &component.kind {
            ComponentKind::Pure(render) => scan_markers(&render(&component.props, ctx), ctx, out),
            ComponentKind::Opaque => {}
        },
    }
}

/// One morph marker's content values across a slide's steps.
struct MorphTimeline {
    values: Vec<Option<String>>,
    math: MathMode,
}

fn slide_info<S: KeyValueStore>(
    flat: &FlatSlide,
    meta: SlideMeta,
    ctx: &EvalCtx,
    store: &GroupStore<S>,
) -> SlideInfo {
    let steps = flat.props.steps();
    let step_count = steps.as_ref().map(Vec::len).unwrap_or(1).max(1);

    let mut timelines: Vec<(String, MorphTimeline)> = Vec::new();
    let mut prefetch = Vec::new();
    let mut notes = None;

    for (step_index, tree) in step_trees(&flat.slide, &flat.props, ctx).into_iter().enumerate() {
        let mut markers = Markers::default();
        scan_markers(&tree, ctx, &mut markers);

        // Presenter notes come from the first step only.
        if step_index == 0 {
            if markers.notes.len() > 1 {
                tracing::warn!(count = markers.notes.len(), "slide has more than one notes node");
            }
            notes = markers.notes.first().map(Node::plain_text);
        }

        let mut unkeyed = 0usize;
        for marker in markers.morphs {
            if marker.replace {
                if let Some(content) = &marker.content {
                    prefetch.push(wrap_math(marker.math, content));
                }
                continue;
            }

            // Markers without an author key fall back to their per-step
            // discovery index; a colliding key merges into one timeline.
            let key = match &marker.key {
                Some(key) => key.clone(),
                None => {
                    let key = format!("#{unkeyed}");
                    unkeyed += 1;
                    key
                }
            };

            match timelines.iter_mut().find(|(k, _)| *k == key) {
                Some((_, timeline)) => {
                    timeline.values.push(marker.content.clone());
                    timeline.math = marker.math;
                }
                None => timelines.push((
                    key,
                    MorphTimeline {
                        values: vec![marker.content.clone()],
                        math: marker.math,
                    },
                )),
            }
        }
    }

    let mut transitions = Vec::new();
    for (_, timeline) in &timelines {
        for window in timeline.values.windows(2) {
            let (start, end) = (&window[0], &window[1]);
            if start == end {
                continue;
            }
            transitions.push(TransitionPair::new(
                start.clone().unwrap_or_default(),
                end.clone().unwrap_or_default(),
            ));

            if let (Some(start), Some(end)) = (start.as_deref(), end.as_deref()) {
                if !start.is_empty() && !end.is_empty() {
                    let (annotated_start, annotated_end) = store.lookup(start, end);
                    prefetch.push(wrap_math(timeline.math, &annotated_start));
                    prefetch.push(wrap_math(timeline.math, &annotated_end));
                }
            }
        }
    }

    SlideInfo {
        meta,
        step_count,
        transitions,
        prefetch,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grouping::{MemoryStore, Side},
        selection::Selection,
        tree::{ComponentNode, MorphNode},
    };
    use serde_json::{json, Value};

    fn empty_store() -> GroupStore<MemoryStore> {
        GroupStore::load(MemoryStore::new()).unwrap()
    }

    fn plain_slide(props: Props) -> Node {
        Node::Slide(SlideNode::new(props, Node::Empty))
    }

    fn step_values(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!(i)).collect()
    }

    #[test]
    fn sections_inherit_and_headers_reset() {
        let slides = vec![
            plain_slide(Props::new().with("section", "Intro").with("header", "Welcome")),
            plain_slide(Props::new()),
            plain_slide(Props::new().with("section", "Results").with("hideNavigation", true)),
            plain_slide(Props::new().with("header", "Details")),
        ];
        let summary = analyze(&slides, &empty_store()).unwrap();
        let metas: Vec<_> = summary.slides.iter().map(|s| &s.meta).collect();

        assert_eq!(metas[0].section.as_deref(), Some("Intro"));
        assert!(metas[0].section_slide);
        assert_eq!(metas[0].header.as_deref(), Some("Welcome"));

        // Section carries forward, header does not.
        assert_eq!(metas[1].section.as_deref(), Some("Intro"));
        assert!(!metas[1].section_slide);
        assert_eq!(metas[1].header, None);

        assert_eq!(metas[2].section.as_deref(), Some("Results"));
        assert!(metas[2].section_slide);
        assert!(metas[2].hide_navigation);

        assert_eq!(metas[3].section.as_deref(), Some("Results"));
        assert!(!metas[3].hide_navigation);
        assert_eq!(metas[3].header.as_deref(), Some("Details"));
    }

    #[test]
    fn wrapper_props_flatten_first_seen_wins() {
        let wrapper = Node::Component(ComponentNode::pure(
            "FancySlide",
            Props::new().with("header", "outer"),
            |_, _| {
                Node::Slide(SlideNode::new(
                    Props::new().with("header", "inner").with("section", "S"),
                    Node::Empty,
                ))
            },
        ));
        let summary = analyze(&[wrapper], &empty_store()).unwrap();
        let meta = &summary.slides[0].meta;
        assert_eq!(meta.header.as_deref(), Some("outer"));
        assert_eq!(meta.section.as_deref(), Some("S"));
    }

    #[test]
    fn non_slide_root_degrades_to_defaults() {
        let slides = vec![
            plain_slide(Props::new().with("section", "A")),
            Node::text("not a slide"),
            Node::Component(ComponentNode::opaque("Chart", Props::new())),
        ];
        let summary = analyze(&slides, &empty_store()).unwrap();
        assert_eq!(summary.slides.len(), 3);
        // A broken slide still inherits accumulated metadata.
        assert_eq!(summary.slides[1].meta.section.as_deref(), Some("A"));
        assert_eq!(summary.slides[1].step_count, 1);
        assert!(summary.slides[2].transitions.is_empty());
    }

    #[test]
    fn toc_slide_reads_section_count_from_pass_one() {
        // Steps are computed from how many section slides the whole deck
        // has, which is only known after the first pass.
        let toc = Node::Component(ComponentNode::pure(
            "TableOfContents",
            Props::new(),
            |_, ctx| {
                Node::Slide(SlideNode::stepped(
                    Props::new().with_steps(step_values(ctx.section_count())),
                    |_, _| Node::Empty,
                ))
            },
        ));
        let slides = vec![
            toc,
            plain_slide(Props::new().with("section", "One")),
            plain_slide(Props::new().with("section", "Two")),
        ];
        let summary = analyze(&slides, &empty_store()).unwrap();
        assert_eq!(summary.slides[0].step_count, 2);
    }

    #[test]
    fn morph_timelines_pair_consecutive_distinct_values() {
        let slide = Node::Slide(SlideNode::stepped(
            Props::new().with_steps(step_values(4)),
            |step, _| {
                let i = step.as_u64().unwrap_or(0);
                let content = match i {
                    0 | 1 => "a", // repeated value yields no pair
                    2 => "b",
                    _ => "c",
                };
                Node::Morph(MorphNode::new(content).keyed("eq"))
            },
        ));
        let summary = analyze(&[slide], &empty_store()).unwrap();
        assert_eq!(
            summary.slides[0].transitions,
            vec![
                TransitionPair::new("a", "b"),
                TransitionPair::new("b", "c"),
            ]
        );
    }

    #[test]
    fn unkeyed_markers_match_by_position() {
        // Two unkeyed markers per step stay two independent timelines.
        let slide = Node::Slide(SlideNode::stepped(
            Props::new().with_steps(step_values(2)),
            |step, _| {
                let i = step.as_u64().unwrap_or(0);
                Node::fragment([
                    Node::Morph(MorphNode::new(format!("x{i}"))),
                    Node::Morph(MorphNode::new("same")),
                ])
            },
        ));
        let summary = analyze(&[slide], &empty_store()).unwrap();
        assert_eq!(
            summary.slides[0].transitions,
            vec![TransitionPair::new("x0", "x1")]
        );
    }

    #[test]
    fn prefetch_carries_annotated_wrapped_sides() {
        let mut store = empty_store();
        store
            .ensure_records(&[TransitionPair::new("ab", "cd")])
            .unwrap();
        store
            .add_selection(0, Side::Start, Selection::new(0, 0, 2))
            .unwrap();

        let slide = Node::Slide(SlideNode::stepped(
            Props::new().with_steps(step_values(2)),
            |step, _| {
                let content = if step.as_u64() == Some(0) { "ab" } else { "cd" };
                Node::Morph(MorphNode::new(content).math(MathMode::Display).keyed("f"))
            },
        ));
        let summary = analyze(&[slide], &store).unwrap();
        assert_eq!(
            summary.slides[0].prefetch,
            vec![
                "$\\displaystyle \\g{1}{ab}$".to_string(),
                "$\\displaystyle cd$".to_string(),
            ]
        );
    }

    #[test]
    fn replace_markers_prefetch_without_pairing() {
        let slide = Node::Slide(SlideNode::new(
            Props::new(),
            Node::fragment([
                Node::Morph(MorphNode::new("E = mc^2").math(MathMode::Inline).replace()),
                Node::text("prose"),
            ]),
        ));
        let summary = analyze(&[slide], &empty_store()).unwrap();
        assert!(summary.slides[0].transitions.is_empty());
        assert_eq!(summary.slides[0].prefetch, vec!["$E = mc^2$".to_string()]);
    }

    #[test]
    fn presenter_notes_come_from_the_first_step() {
        let slide = Node::Slide(SlideNode::stepped(
            Props::new().with_steps(step_values(2)),
            |step, _| {
                if step.as_u64() == Some(0) {
                    Node::fragment([
                        Node::Morph(MorphNode::new("a")),
                        Node::notes(Node::text("mention the lemma")),
                    ])
                } else {
                    Node::notes(Node::text("ignored: not the first step"))
                }
            },
        ));
        let summary = analyze(&[slide], &empty_store()).unwrap();
        assert_eq!(
            summary.slides[0].notes.as_deref(),
            Some("mention the lemma")
        );
    }

    #[test]
    fn duplicate_notes_keep_the_first() {
        let slide = Node::Slide(SlideNode::new(
            Props::new(),
            Node::fragment([
                Node::notes(Node::text("first")),
                Node::notes(Node::text("second")),
            ]),
        ));
        let summary = analyze(&[slide], &empty_store()).unwrap();
        assert_eq!(summary.slides[0].notes.as_deref(), Some("first"));
    }

    #[test]
    fn notes_are_absent_by_default() {
        let slide = plain_slide(Props::new());
        let summary = analyze(&[slide], &empty_store()).unwrap();
        assert_eq!(summary.slides[0].notes, None);
    }

    #[test]
    fn citations_number_by_first_encounter() {
        let slides = vec![
            Node::Slide(SlideNode::new(
                Props::new(),
                Node::fragment([Node::cite("knuth84"), Node::cite("lamport94")]),
            )),
            Node::Slide(SlideNode::stepped(
                Props::new().with_steps(step_values(2)),
                |step, _| {
                    if step.as_u64() == Some(0) {
                        Node::cite("knuth84")
                    } else {
                        Node::cite("shannon48")
                    }
                },
            )),
        ];
        let summary = analyze(&slides, &empty_store()).unwrap();
        assert_eq!(summary.citations["knuth84"], 1);
        assert_eq!(summary.citations["lamport94"], 2);
        assert_eq!(summary.citations["shannon48"], 3);
    }

    #[test]
    fn markers_inside_pure_components_are_found() {
        let slide = Node::Slide(SlideNode::stepped(
            Props::new().with_steps(step_values(2)),
            |step, _| {
                let content = if step.as_u64() == Some(0) { "p" } else { "q" };
                let content = content.to_string();
                Node::Component(ComponentNode::pure(
                    "Boxed",
                    Props::new(),
                    move |_, _| Node::Morph(MorphNode::new(content.clone()).keyed("boxed")),
                ))
            },
        ));
        let summary = analyze(&[slide], &empty_store()).unwrap();
        assert_eq!(
            summary.slides[0].transitions,
            vec![TransitionPair::new("p", "q")]
        );
    }

    #[test]
    fn opaque_components_are_recursion_leaves() {
        let slide = Node::Slide(SlideNode::new(
            Props::new(),
            Node::Component(ComponentNode::opaque("Video", Props::new())),
        ));
        let summary = analyze(&[slide], &empty_store()).unwrap();
        assert!(summary.slides[0].transitions.is_empty());
        assert!(summary.citations.is_empty());
    }
}
