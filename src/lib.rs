#![forbid(unsafe_code)]

pub mod analysis;
pub mod error;
pub mod grouping;
pub mod morph;
pub mod nav;
pub mod selection;
pub mod snapshot;
pub mod timeline;
pub mod tree;

pub use analysis::{analyze, AnalysisSummary, SlideInfo};
pub use error::{KinetexError, KinetexResult};
pub use grouping::{
    AnimationRecord, GroupStore, KeyValueStore, MemoryStore, Orientation, Side, TransitionPair,
    STORE_KEY,
};
pub use morph::{
    diff, AnimationPlan, MorphEngine, MorphOp, MorphSession, MorphTarget, SvgSurface, Timing,
    DEFAULT_TIMING_S,
};
pub use nav::Position;
pub use selection::Selection;
pub use snapshot::{
    GroupId, MathMode, Memoized, SnapshotProvider, SvgMetrics, VectorSnapshot,
};
pub use timeline::{compile, compile_with, Expansion, Step, Substitution};
pub use tree::{
    ComponentKind, ComponentNode, EvalCtx, MorphNode, Node, Props, SlideContent, SlideMeta,
    SlideNode,
};
