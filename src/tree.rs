//! The declarative slide tree.
//!
//! Slides are described as nested [`Node`]s. Marker nodes ([`Node::Morph`],
//! [`Node::Cite`]) carry animation and citation intent; user components are
//! a closed [`ComponentKind`] fixed when the tree is built — either a pure
//! render function the dry-run evaluator may call, or an opaque component
//! it must treat as a leaf. Evaluation state travels in an explicit
//! [`EvalCtx`]; nothing in this crate is process-global.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use crate::snapshot::MathMode;

/// A per-step argument handed to a slide's content function; typically one
/// record produced by the timeline notation compiler.
pub type StepValue = Value;

/// Render function of a pure component.
pub type RenderFn = Rc<dyn Fn(&Props, &EvalCtx) -> Node>;

/// Content function of a stepped slide.
pub type StepsFn = Rc<dyn Fn(&StepValue, &EvalCtx) -> Node>;

#[derive(Clone, Default)]
pub enum Node {
    #[default]
    Empty,
    Text(String),
    Fragment(Vec<Node>),
    Slide(SlideNode),
    Morph(MorphNode),
    Cite {
        id: String,
    },
    /// Presenter notes for the surrounding slide; never rendered to the
    /// audience surface.
    Notes(Box<Node>),
    Component(ComponentNode),
}

impl Node {
    pub fn text(s: impl Into<String>) -> Self {
        Node::Text(s.into())
    }

    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Self {
        Node::Fragment(children.into_iter().collect())
    }

    pub fn cite(id: impl Into<String>) -> Self {
        Node::Cite { id: id.into() }
    }

    pub fn notes(content: Node) -> Self {
        Node::Notes(Box::new(content))
    }

    /// Concatenated text content of this subtree. Markers, slides and
    /// components contribute nothing.
    pub fn plain_text(&self) -> String {
        fn walk(node: &Node, out: &mut String) {
            match node {
                Node::Text(s) => out.push_str(s),
                Node::Fragment(children) => {
                    for child in children {
                        walk(child, out);
                    }
                }
                Node::Notes(content) => walk(content, out),
                _ => {}
            }
        }
        let mut out = String::new();
        walk(self, &mut out);
        out
    }
}

/// A formula-transition marker: the evaluator tracks its content across
/// steps and the morph session animates between consecutive values.
#[derive(Clone, Debug, Default)]
pub struct MorphNode {
    /// Stable identity across step re-evaluations. Unkeyed markers fall
    /// back to their discovery index within the slide.
    pub key: Option<String>,
    pub content: Option<String>,
    pub math: MathMode,
    /// Replace markers swap synchronously and contribute no animation pair.
    pub replace: bool,
}

impl MorphNode {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn math(mut self, math: MathMode) -> Self {
        self.math = math;
        self
    }

    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }
}

#[derive(Clone)]
pub struct SlideNode {
    pub props: Props,
    pub content: SlideContent,
}

#[derive(Clone)]
pub enum SlideContent {
    Static(Rc<Node>),
    /// Re-evaluated once per declared step value.
    Steps(StepsFn),
}

impl SlideNode {
    pub fn new(props: Props, content: Node) -> Self {
        Self {
            props,
            content: SlideContent::Static(Rc::new(content)),
        }
    }

    pub fn stepped(
        props: Props,
        content: impl Fn(&StepValue, &EvalCtx) -> Node + 'static,
    ) -> Self {
        Self {
            props,
            content: SlideContent::Steps(Rc::new(content)),
        }
    }
}

#[derive(Clone)]
pub struct ComponentNode {
    /// Diagnostic name, used in static-analysis warnings.
    pub name: String,
    pub kind: ComponentKind,
    pub props: Props,
}

/// Closed set of component kinds, decided at tree construction.
#[derive(Clone)]
pub enum ComponentKind {
    /// A pure function of props and context; the evaluator calls it.
    Pure(RenderFn),
    /// Performs essential imperative work; the evaluator never recurses
    /// below it.
    Opaque,
}

impl ComponentNode {
    pub fn pure(
        name: impl Into<String>,
        props: Props,
        render: impl Fn(&Props, &EvalCtx) -> Node + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ComponentKind::Pure(Rc::new(render)),
            props,
        }
    }

    pub fn opaque(name: impl Into<String>, props: Props) -> Self {
        Self {
            name: name.into(),
            kind: ComponentKind::Opaque,
            props,
        }
    }
}

/// Free-form props, flattened across wrapper chains first-seen-wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Props {
    values: BTreeMap<String, Value>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_steps(self, steps: Vec<StepValue>) -> Self {
        self.with("steps", Value::Array(steps))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn steps(&self) -> Option<Vec<StepValue>> {
        match self.values.get("steps") {
            Some(Value::Array(steps)) => Some(steps.clone()),
            _ => None,
        }
    }

    /// Merges `other` underneath: only keys not already present are taken.
    pub fn merge_under(&mut self, other: &Props) {
        for (k, v) in &other.values {
            self.values.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Accumulated per-slide metadata, filled by a left-to-right scan.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct SlideMeta {
    pub section: Option<String>,
    pub section_slide: bool,
    pub hide_navigation: bool,
    pub header: Option<String>,
    /// Any other accumulated wrapper props.
    pub extra: BTreeMap<String, Value>,
}

/// Explicit dry-run evaluation context, threaded through every recursive
/// call. Pass 1 sees placeholder metadata; pass 2 sees the real scan.
#[derive(Clone, Debug, Default)]
pub struct EvalCtx {
    pub slide_index: usize,
    pub slides: Vec<SlideMeta>,
    pub citations: BTreeMap<String, usize>,
}

impl EvalCtx {
    pub fn placeholder(slide_count: usize) -> Self {
        Self {
            slide_index: 0,
            slides: vec![SlideMeta::default(); slide_count],
            citations: BTreeMap::new(),
        }
    }

    pub fn section_count(&self) -> usize {
        self.slides.iter().filter(|m| m.section_slide).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn props_merge_under_is_first_seen_wins() {
        let mut outer = Props::new().with("header", "outer");
        let inner = Props::new().with("header", "inner").with("section", "S");
        outer.merge_under(&inner);
        assert_eq!(outer.get_str("header"), Some("outer"));
        assert_eq!(outer.get_str("section"), Some("S"));
    }

    #[test]
    fn props_steps_reads_array() {
        let props = Props::new().with_steps(vec![json!(1), json!(2)]);
        assert_eq!(props.steps().unwrap().len(), 2);
        assert!(Props::new().steps().is_none());
    }

    #[test]
    fn plain_text_flattens_nested_fragments() {
        let node = Node::fragment([
            Node::text("see "),
            Node::fragment([Node::text("the "), Node::text("board")]),
            Node::Morph(MorphNode::new("x^2")),
        ]);
        assert_eq!(node.plain_text(), "see the board");
    }

    #[test]
    fn section_count_counts_section_slides() {
        let mut ctx = EvalCtx::placeholder(3);
        ctx.slides[0].section_slide = true;
        ctx.slides[2].section_slide = true;
        assert_eq!(ctx.section_count(), 2);
    }
}
