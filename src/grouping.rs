//! The persisted animation-grouping store.
//!
//! An [`AnimationRecord`] maps one (before, after) content pair — identity
//! is the unordered pair — to curated start/end selection sets. Records are
//! created lazily the first time a transition pair is observed, mutated
//! only through authoring edits, and persisted as one flat JSON array in
//! insertion order under [`STORE_KEY`].

use crate::{
    error::{KinetexError, KinetexResult},
    selection::{self, Selection},
};

/// Well-known key in the backing key-value store.
pub const STORE_KEY: &str = "animation-groups";

/// One (before, after) content pair that must be animated between.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransitionPair {
    pub start: String,
    pub end: String,
}

impl TransitionPair {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnimationRecord {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub start_groups: Vec<Selection>,
    #[serde(default)]
    pub end_groups: Vec<Selection>,
}

/// Which way a record matched a queried pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Forward,
    Reversed,
}

impl AnimationRecord {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            start_groups: Vec::new(),
            end_groups: Vec::new(),
        }
    }

    /// Unordered-pair match: a record also matches the reversed query.
    pub fn matches(&self, start: &str, end: &str) -> Option<Orientation> {
        if self.start == start && self.end == end {
            Some(Orientation::Forward)
        } else if self.start == end && self.end == start {
            Some(Orientation::Reversed)
        } else {
            None
        }
    }
}

/// Side of a record an authoring edit applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Start,
    End,
}

/// External persistence seam. Writes are whole-value replacements.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> KinetexResult<()>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: std::collections::BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut store = Self::default();
        store.entries.insert(key.into(), value.into());
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> KinetexResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct GroupStore<S: KeyValueStore> {
    backing: S,
    records: Vec<AnimationRecord>,
}

impl<S: KeyValueStore> GroupStore<S> {
    /// Reads the record array from the backing store; a missing key is an
    /// empty store.
    pub fn load(backing: S) -> KinetexResult<Self> {
        let records = match backing.get(STORE_KEY) {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| KinetexError::serde(format!("animation record array: {e}")))?,
            None => Vec::new(),
        };
        Ok(Self { backing, records })
    }

    pub fn records(&self) -> &[AnimationRecord] {
        &self.records
    }

    pub fn find(&self, start: &str, end: &str) -> Option<(usize, Orientation)> {
        self.records
            .iter()
            .enumerate()
            .find_map(|(i, r)| r.matches(start, end).map(|o| (i, o)))
    }

    /// Rewrites both sides of a transition into annotated text. Without a
    /// matching record the pair passes through unchanged; a reversed match
    /// swaps the record's sides to fit the query orientation.
    pub fn lookup(&self, start: &str, end: &str) -> (String, String) {
        match self.find(start, end) {
            None => (start.to_string(), end.to_string()),
            Some((i, orientation)) => {
                let r = &self.records[i];
                let annotated_start = selection::annotate(&r.start, &r.start_groups);
                let annotated_end = selection::annotate(&r.end, &r.end_groups);
                match orientation {
                    Orientation::Forward => (annotated_start, annotated_end),
                    Orientation::Reversed => (annotated_end, annotated_start),
                }
            }
        }
    }

    /// Creates empty records for pairs that have none yet, preserving
    /// encounter order. Persists only when something was added; returns the
    /// number of new records.
    #[tracing::instrument(skip_all)]
    pub fn ensure_records(&mut self, pairs: &[TransitionPair]) -> KinetexResult<usize> {
        let mut added = 0;
        for pair in pairs {
            if self.find(&pair.start, &pair.end).is_none() {
                self.records
                    .push(AnimationRecord::new(&pair.start, &pair.end));
                added += 1;
            }
        }
        if added > 0 {
            self.persist()?;
        }
        Ok(added)
    }

    /// Adds a selection to one side of a record, keeping the side's set
    /// merge-closed.
    pub fn add_selection(
        &mut self,
        index: usize,
        side: Side,
        selection: Selection,
    ) -> KinetexResult<()> {
        let record = self
            .records
            .get_mut(index)
            .ok_or_else(|| KinetexError::authoring(format!("no animation record {index}")))?;
        let groups = match side {
            Side::Start => &mut record.start_groups,
            Side::End => &mut record.end_groups,
        };
        *groups = selection::merge(std::mem::take(groups), selection);
        self.persist()
    }

    /// Removes the innermost selection active at `offset` on one side.
    /// A miss (no active selection there) is a no-op.
    pub fn remove_selection_at(
        &mut self,
        index: usize,
        side: Side,
        offset: usize,
    ) -> KinetexResult<()> {
        let record = self
            .records
            .get_mut(index)
            .ok_or_else(|| KinetexError::authoring(format!("no animation record {index}")))?;
        let (text, groups) = match side {
            Side::Start => (&record.start, &mut record.start_groups),
            Side::End => (&record.end, &mut record.end_groups),
        };
        let active = selection::resolve_active(text, groups);
        let Some(Some(target)) = active.get(offset) else {
            return Ok(());
        };
        let target = *target;
        if let Some(pos) = groups.iter().position(|s| *s == target) {
            groups.remove(pos);
        }
        self.persist()
    }

    /// Full-array rewrite under the well-known key.
    fn persist(&mut self) -> KinetexResult<()> {
        let raw = serde_json::to_string(&self.records)
            .map_err(|e| KinetexError::serde(format!("animation record array: {e}")))?;
        self.backing.set(STORE_KEY, &raw)
    }

    pub fn into_backing(self) -> S {
        self.backing
    }
}
