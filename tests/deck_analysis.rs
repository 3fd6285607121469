use std::collections::BTreeMap;

use kinetex::{
    analyze, compile, GroupStore, KinetexResult, MathMode, MemoryStore, MorphNode, MorphSession,
    Node, Position, Props, SlideNode, SnapshotProvider, SvgSurface, TransitionPair,
    VectorSnapshot, STORE_KEY,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn seeded_store() -> GroupStore<MemoryStore> {
    let raw = include_str!("data/records.json");
    GroupStore::load(MemoryStore::with_entry(STORE_KEY, raw)).unwrap()
}

fn deck() -> Vec<Node> {
    vec![
        Node::Slide(SlideNode::new(
            Props::new().with("section", "Intro").with("header", "Welcome"),
            Node::fragment([
                Node::Morph(MorphNode::new("E = mc^2").math(MathMode::Display).replace()),
                Node::cite("knuth84"),
                Node::notes(Node::text("greet the audience")),
            ]),
        )),
        Node::Slide(SlideNode::stepped(
            Props::new()
                .with("header", "Derivation")
                .with_steps(vec![0.into(), 1.into(), 2.into()]),
            |step, _| {
                let content = match step.as_u64() {
                    Some(0) => "ab",
                    Some(1) => "ab",
                    _ => "cd",
                };
                Node::fragment([
                    Node::Morph(MorphNode::new(content).math(MathMode::Display).keyed("eq")),
                    Node::cite("lamport94"),
                ])
            },
        )),
    ]
}

#[test]
fn analysis_extracts_meta_transitions_and_prefetch() {
    init_tracing();
    let store = seeded_store();
    let summary = analyze(&deck(), &store).unwrap();

    assert_eq!(summary.slides.len(), 2);
    assert_eq!(summary.slides[0].meta.section.as_deref(), Some("Intro"));
    assert!(summary.slides[0].meta.section_slide);
    assert_eq!(summary.slides[0].step_count, 1);
    assert_eq!(
        summary.slides[0].prefetch,
        vec!["$\\displaystyle E = mc^2$".to_string()]
    );
    assert_eq!(
        summary.slides[0].notes.as_deref(),
        Some("greet the audience")
    );
    assert_eq!(summary.slides[1].notes, None);

    // The second slide inherits the section but not the header.
    assert_eq!(summary.slides[1].meta.section.as_deref(), Some("Intro"));
    assert!(!summary.slides[1].meta.section_slide);
    assert_eq!(summary.slides[1].meta.header.as_deref(), Some("Derivation"));
    assert_eq!(summary.slides[1].step_count, 3);

    // Steps 0 and 1 render the same content, so only one pair remains, and
    // its prefetch carries the record's annotation.
    assert_eq!(
        summary.slides[1].transitions,
        vec![TransitionPair::new("ab", "cd")]
    );
    assert_eq!(
        summary.slides[1].prefetch,
        vec![
            "$\\displaystyle \\g{1}{ab}$".to_string(),
            "$\\displaystyle cd$".to_string(),
        ]
    );

    assert_eq!(summary.citations["knuth84"], 1);
    assert_eq!(summary.citations["lamport94"], 2);
}

#[test]
fn navigation_walks_the_analyzed_deck() {
    let store = seeded_store();
    let summary = analyze(&deck(), &store).unwrap();
    let steps_per_slide: Vec<usize> = summary.slides.iter().map(|s| s.step_count).collect();

    let mut pos = Position::default();
    let mut count = 1;
    loop {
        let advanced = pos.next(&steps_per_slide);
        if advanced == pos {
            break;
        }
        pos = advanced;
        count += 1;
    }
    assert_eq!(count, 4); // 1 step + 3 steps
    assert_eq!(pos, Position::new(1, 2));
    assert_eq!(Position::new(9, 9).clamp(&steps_per_slide), pos);
}

struct TableProvider {
    table: BTreeMap<String, VectorSnapshot>,
}

impl TableProvider {
    fn with(entries: &[(&str, &[(&str, &str)])]) -> Self {
        let table = entries
            .iter()
            .map(|(text, groups)| {
                let snapshot = VectorSnapshot {
                    width_pt: 10.0,
                    height_pt: 2.0,
                    view_box: [0.0, 0.0, 10.0, 2.0],
                    groups: groups
                        .iter()
                        .map(|(id, path)| (kinetex::GroupId(id.to_string()), path.to_string()))
                        .collect(),
                };
                (text.to_string(), snapshot)
            })
            .collect();
        Self { table }
    }
}

impl SnapshotProvider for TableProvider {
    fn produce(&mut self, text: &str) -> KinetexResult<VectorSnapshot> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| kinetex::KinetexError::compile(format!("no snapshot for '{text}'")))
    }
}

#[test]
fn analyzed_transition_plays_through_a_session() {
    init_tracing();
    let store = seeded_store();
    let summary = analyze(&deck(), &store).unwrap();
    let pair = summary.slides[1].transitions[0].clone();

    // The session compiles the annotated strings the analysis prefetches;
    // the provider sees them with group markers normalized to color hashes.
    let norm = |s: &str| kinetex::snapshot::normalize_group_markers(s);
    let annotated_start = norm("$\\displaystyle \\g{1}{ab}$");
    let annotated_end = norm("$\\displaystyle cd$");
    let provider = TableProvider::with(&[
        ("$\\displaystyle ab$", &[("g0", "M0 0")]),
        (annotated_start.as_str(), &[("g0", "M0 0"), ("gA11CE5", "M1 1")]),
        (annotated_end.as_str(), &[("g0", "M5 5")]),
    ]);

    let mut session =
        MorphSession::new(provider, SvgSurface::new()).math(MathMode::Display);
    session.enqueue(pair.start.clone());
    session.enqueue(pair.end.clone());
    assert_eq!(session.pump(&store).unwrap(), 2);

    // The surface ends on the annotated after-state.
    let surface = session.target();
    assert_eq!(
        surface
            .fragment(&kinetex::GroupId("g0".to_string()))
            .unwrap()
            .path,
        "M5 5"
    );
    assert!(surface
        .fragment(&kinetex::GroupId("gA11CE5".to_string()))
        .is_none());
    assert_eq!(session.metrics().unwrap().width_pt, 10.0);
}

#[test]
fn timeline_steps_feed_slide_declarations() {
    // A notation block drives the steps prop of a slide; the analysis sees
    // one step per expanded record.
    // "d 1.4" expands to d, d, 1, (2 3), 4: six steps.
    let steps = compile("draw d 1.4\nfade h  v").unwrap();
    assert_eq!(steps.len(), 6);
    let slide = Node::Slide(SlideNode::stepped(
        Props::new().with_steps(steps.into_iter().map(|s| serde_json::json!(s)).collect()),
        |_, _| Node::Empty,
    ));
    let store = GroupStore::load(MemoryStore::new()).unwrap();
    let summary = analyze(&[slide], &store).unwrap();
    assert_eq!(summary.slides[0].step_count, 6);
}
