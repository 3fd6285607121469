//! Vector content diffing and transition playback.
//!
//! [`diff`] compares the group ids live on a target with the groups of an
//! incoming [`VectorSnapshot`] and produces an [`AnimationPlan`] of
//! per-group operations. [`MorphEngine::transition`] drives a plan into a
//! [`MorphTarget`]; [`MorphSession`] serializes updates per target (FIFO)
//! and implements the two-phase annotated update against the grouping
//! store.

use std::collections::{BTreeSet, VecDeque};

use crate::{
    error::{KinetexError, KinetexResult},
    grouping::{GroupStore, KeyValueStore},
    snapshot::{GroupId, MathMode, Memoized, SnapshotProvider, SvgMetrics, VectorSnapshot, wrap_math},
};

pub const DEFAULT_TIMING_S: f64 = 0.4;

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MorphOp {
    /// Fragment present before, absent after: fade out and delete.
    Remove { id: GroupId },
    /// Fragment absent before: create at opacity 0 and fade in. Whitelisted
    /// group colors get an explicit fill; everything else inherits.
    Insert {
        id: GroupId,
        path: String,
        fill: Option<String>,
    },
    /// Fragment present on both sides: morph path data in place, forcing
    /// opacity back to 1 (revives a fragment caught mid-fade-out).
    Morph { id: GroupId, path: String },
}

impl MorphOp {
    pub fn id(&self) -> &GroupId {
        match self {
            MorphOp::Remove { id } | MorphOp::Insert { id, .. } | MorphOp::Morph { id, .. } => id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Immediate,
    Animate { duration_s: f64 },
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct AnimationPlan {
    pub ops: Vec<MorphOp>,
    pub timing: Timing,
}

/// Classifies every id in the union of both sides. Deterministic: ops come
/// out ordered by group id.
pub fn diff(before: &BTreeSet<GroupId>, after: &VectorSnapshot) -> Vec<MorphOp> {
    let after_ids: BTreeSet<&GroupId> = after.groups.keys().collect();
    let mut all: BTreeSet<&GroupId> = before.iter().collect();
    all.extend(after_ids.iter().copied());

    all.into_iter()
        .map(|id| match after.groups.get(id) {
            None => MorphOp::Remove { id: id.clone() },
            Some(path) if !before.contains(id) => MorphOp::Insert {
                id: id.clone(),
                path: path.clone(),
                fill: id.highlight_fill(),
            },
            Some(path) => MorphOp::Morph {
                id: id.clone(),
                path: path.clone(),
            },
        })
        .collect()
}

/// A visual surface the engine mutates. Implementations settle each applied
/// operation before returning (cooperative, single-threaded model).
pub trait MorphTarget {
    fn present_ids(&self) -> BTreeSet<GroupId>;
    fn apply(&mut self, op: &MorphOp, timing: Timing) -> KinetexResult<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    pub path: String,
    pub fill: Option<String>,
    pub opacity: f64,
}

/// In-memory [`MorphTarget`], journaling every applied operation in order.
#[derive(Debug, Default)]
pub struct SvgSurface {
    fragments: std::collections::BTreeMap<GroupId, Fragment>,
    journal: Vec<(MorphOp, Timing)>,
}

impl SvgSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragment(&self, id: &GroupId) -> Option<&Fragment> {
        self.fragments.get(id)
    }

    pub fn journal(&self) -> &[(MorphOp, Timing)] {
        &self.journal
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl MorphTarget for SvgSurface {
    fn present_ids(&self) -> BTreeSet<GroupId> {
        self.fragments.keys().cloned().collect()
    }

    fn apply(&mut self, op: &MorphOp, timing: Timing) -> KinetexResult<()> {
        match op {
            MorphOp::Remove { id } => {
                if self.fragments.remove(id).is_none() {
                    return Err(KinetexError::validation(format!(
                        "remove of absent fragment '{id}'"
                    )));
                }
            }
            MorphOp::Insert { id, path, fill } => {
                self.fragments.insert(
                    id.clone(),
                    Fragment {
                        path: path.clone(),
                        fill: fill.clone(),
                        opacity: 1.0,
                    },
                );
            }
            MorphOp::Morph { id, path } => {
                let fragment = self.fragments.get_mut(id).ok_or_else(|| {
                    KinetexError::validation(format!("morph of absent fragment '{id}'"))
                })?;
                fragment.path = path.clone();
                fragment.opacity = 1.0;
            }
        }
        self.journal.push((op.clone(), timing));
        Ok(())
    }
}

pub struct MorphEngine<P: SnapshotProvider> {
    provider: Memoized<P>,
}

impl<P: SnapshotProvider> MorphEngine<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Memoized::new(provider),
        }
    }

    /// Warms the snapshot cache for `text` (hosts prefetch every content
    /// string the analysis pass reports).
    pub fn preload(&mut self, text: &str) -> KinetexResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.provider.produce(text).map(|_| ())
    }

    /// Transitions `target` to the snapshot for `text`. Empty text means
    /// the empty snapshot. Metrics are reported through `on_measured`
    /// before any mutation. A provider failure is logged and skipped
    /// (returns `Ok(false)`); `Ok(true)` means the plan was applied.
    #[tracing::instrument(skip(self, target, on_measured), fields(len = text.len()))]
    pub fn transition(
        &mut self,
        target: &mut dyn MorphTarget,
        text: &str,
        replace_immediately: bool,
        duration_s: f64,
        on_measured: &mut dyn FnMut(SvgMetrics),
    ) -> KinetexResult<bool> {
        let snapshot = if text.is_empty() {
            VectorSnapshot::empty()
        } else {
            match self.provider.produce(text) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "content compile failed; transition skipped");
                    return Ok(false);
                }
            }
        };

        on_measured(snapshot.metrics());

        let timing = if replace_immediately {
            Timing::Immediate
        } else {
            Timing::Animate { duration_s }
        };
        let ops = diff(&target.present_ids(), &snapshot);
        for op in &ops {
            target.apply(op, timing)?;
        }
        Ok(true)
    }
}

/// One queued content update for a session's target.
#[derive(Clone, Debug)]
struct PendingUpdate {
    content: String,
}

/// Owns one visual target and its update queue. Updates are applied
/// strictly FIFO; a new update never invokes the engine before the
/// previous one has settled.
pub struct MorphSession<P: SnapshotProvider, T: MorphTarget> {
    engine: MorphEngine<P>,
    target: T,
    math: MathMode,
    replace: bool,
    use_database: bool,
    timing_s: f64,
    previous: Option<String>,
    queue: VecDeque<PendingUpdate>,
    in_flight: bool,
    metrics: Option<SvgMetrics>,
}

impl<P: SnapshotProvider, T: MorphTarget> MorphSession<P, T> {
    pub fn new(provider: P, target: T) -> Self {
        Self {
            engine: MorphEngine::new(provider),
            target,
            math: MathMode::Raw,
            replace: false,
            use_database: true,
            timing_s: DEFAULT_TIMING_S,
            previous: None,
            queue: VecDeque::new(),
            in_flight: false,
            metrics: None,
        }
    }

    pub fn math(mut self, math: MathMode) -> Self {
        self.math = math;
        self
    }

    /// Replace-marker mode: every update swaps synchronously.
    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn use_database(mut self, use_database: bool) -> Self {
        self.use_database = use_database;
        self
    }

    pub fn timing_s(mut self, timing_s: f64) -> Self {
        self.timing_s = timing_s;
        self
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Last metrics reported by the provider for this target.
    pub fn metrics(&self) -> Option<SvgMetrics> {
        self.metrics
    }

    pub fn preload(&mut self, text: &str) -> KinetexResult<()> {
        self.engine.preload(text)
    }

    pub fn enqueue(&mut self, content: impl Into<String>) {
        self.queue.push_back(PendingUpdate {
            content: content.into(),
        });
    }

    /// Drains the queue in order. Reentrant calls (an update scheduled from
    /// a measurement callback) are a no-op; the queued update waits for the
    /// next pump. Returns the number of updates applied.
    pub fn pump<S: KeyValueStore>(&mut self, store: &GroupStore<S>) -> KinetexResult<usize> {
        if self.in_flight {
            return Ok(0);
        }
        self.in_flight = true;
        let result = self.drain(store);
        self.in_flight = false;
        result
    }

    fn drain<S: KeyValueStore>(&mut self, store: &GroupStore<S>) -> KinetexResult<usize> {
        let mut applied = 0;
        while let Some(update) = self.queue.pop_front() {
            self.apply_update(store, &update.content)?;
            applied += 1;
        }
        Ok(applied)
    }

    fn apply_update<S: KeyValueStore>(
        &mut self,
        store: &GroupStore<S>,
        content: &str,
    ) -> KinetexResult<()> {
        let math = self.math;
        let had_previous = self.previous.as_deref().is_some_and(|p| !p.is_empty());
        let previous = self.previous.clone().unwrap_or_default();
        self.previous = Some(content.to_string());

        if content.is_empty() {
            self.transition("", false)?;
            return Ok(());
        }

        if !had_previous {
            // First content on this target: fade in, no database lookup.
            let text = wrap_math(math, content);
            self.transition(&text, false)?;
            return Ok(());
        }

        if self.replace {
            let text = wrap_math(math, content);
            self.transition(&text, true)?;
            return Ok(());
        }

        if self.use_database {
            // Two phases: swap in the annotated before-text synchronously,
            // then animate to the annotated after-text.
            let (before, after) = store.lookup(&previous, content);
            self.transition(&wrap_math(math, &before), true)?;
            self.transition(&wrap_math(math, &after), false)?;
            return Ok(());
        }

        let text = wrap_math(math, content);
        self.transition(&text, false)?;
        Ok(())
    }

    fn transition(&mut self, text: &str, replace_immediately: bool) -> KinetexResult<bool> {
        let Self {
            engine,
            target,
            metrics,
            timing_s,
            ..
        } = self;
        engine.transition(target, text, replace_immediately, *timing_s, &mut |m| {
            *metrics = Some(m);
        })
    }
}
