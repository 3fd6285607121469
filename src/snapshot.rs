//! Vector content snapshots and the provider seam.
//!
//! A [`VectorSnapshot`] is one decomposed rendering of typeset content:
//! path fragments keyed by [`GroupId`], plus document metrics. Snapshots
//! are produced externally (the crate does not typeset) through the
//! [`SnapshotProvider`] trait and memoized by exact input text.

use std::collections::BTreeMap;

use crate::error::{KinetexError, KinetexResult};

/// Group ids whose decoded fill color is rendered explicitly; every other
/// group inherits the document's default fill.
pub const HIGHLIGHT_COLORS: [&str; 1] = ["#00d56f"];

/// Stable identity of one path fragment, derived from the fill marker the
/// producer embedded: no marker (or the default fill) is `g0`, anything
/// else is `g` followed by the marker's hex digits.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn default_group() -> Self {
        Self("g0".to_string())
    }

    pub fn from_fill_marker(fill: Option<&str>) -> Self {
        match fill {
            None | Some("") => Self::default_group(),
            Some(fill) => Self(format!("g{}", fill.trim_start_matches('#'))),
        }
    }

    pub fn is_default(&self) -> bool {
        self.0 == "g0"
    }

    /// The fill color this id decodes to, or `None` for the default group.
    pub fn fill_color(&self) -> Option<String> {
        if self.is_default() {
            return None;
        }
        Some(format!("#{}", self.0.trim_start_matches('g')))
    }

    /// `Some(color)` when the decoded color is on the highlight whitelist.
    pub fn highlight_fill(&self) -> Option<String> {
        self.fill_color()
            .filter(|c| HIGHLIGHT_COLORS.iter().any(|w| w.eq_ignore_ascii_case(c)))
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document metrics reported to callers before any visual mutation.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SvgMetrics {
    pub width_pt: f64,
    pub height_pt: f64,
    pub view_box: [f64; 4],
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VectorSnapshot {
    pub width_pt: f64,
    pub height_pt: f64,
    pub view_box: [f64; 4],
    pub groups: BTreeMap<GroupId, String>,
}

impl VectorSnapshot {
    /// The snapshot used for empty content.
    pub fn empty() -> Self {
        Self {
            width_pt: 0.0,
            height_pt: 0.0,
            view_box: [0.0; 4],
            groups: BTreeMap::new(),
        }
    }

    pub fn metrics(&self) -> SvgMetrics {
        SvgMetrics {
            width_pt: self.width_pt,
            height_pt: self.height_pt,
            view_box: self.view_box,
        }
    }

    pub fn validate(&self) -> KinetexResult<()> {
        if !(self.width_pt >= 0.0 && self.height_pt >= 0.0) {
            return Err(KinetexError::validation(
                "snapshot width/height must be finite and >= 0",
            ));
        }
        for (id, path) in &self.groups {
            kurbo::BezPath::from_svg(path).map_err(|e| {
                KinetexError::validation(format!("group '{id}' has invalid path data: {e}"))
            })?;
        }
        Ok(())
    }
}

/// How a content string is wrapped before being handed to the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MathMode {
    Display,
    Inline,
    #[default]
    Raw,
}

pub fn wrap_math(mode: MathMode, s: &str) -> String {
    match mode {
        MathMode::Display => format!("$\\displaystyle {s}$"),
        MathMode::Inline => format!("${s}$"),
        MathMode::Raw => s.to_string(),
    }
}

/// Rewrites author group annotations (`\g<digit>` and `\g{label}`) into
/// `\g{<color hash>}` so that every label maps onto a deterministic fill
/// color. Two passes, short form first; an already-hashed label is hashed
/// again, which stays deterministic.
pub fn normalize_group_markers(text: &str) -> String {
    let pass1 = rewrite_markers(text, true);
    rewrite_markers(&pass1, false)
}

fn rewrite_markers(text: &str, short_form: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let is_marker = chars[i] == '\\' && chars.get(i + 1) == Some(&'g');
        if !is_marker {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        if short_form {
            if let Some(d) = chars.get(i + 2).filter(|c| c.is_ascii_digit()) {
                out.push_str(&format!("\\g{{{}}}", color_hash(&d.to_string())));
                i += 3;
                continue;
            }
        } else if chars.get(i + 2) == Some(&'{') {
            if let Some(close) = chars[i + 3..].iter().position(|&c| c == '}') {
                let label: String = chars[i + 3..i + 3 + close].iter().collect();
                out.push_str(&format!("\\g{{{}}}", color_hash(&label)));
                i += 3 + close + 1;
                continue;
            }
        }

        out.push(chars[i]);
        i += 1;
    }

    out
}

/// 6-hex-digit color hash over UTF-16 units, 32-bit wrapping.
pub fn color_hash(s: &str) -> String {
    let mut hash: i64 = 0;
    for unit in s.encode_utf16() {
        let shifted = i64::from((hash as i32) << 5);
        hash = i64::from(unit) + shifted - hash;
    }
    let h = hash as i32;
    let mut color = String::with_capacity(6);
    for i in 0..3 {
        let value = (h >> (i * 8)) & 0xff;
        color.push_str(&format!("{value:02X}"));
    }
    color
}

/// External producer of snapshots. May fail with a content-compilation
/// error; the morph engine treats that as non-fatal.
pub trait SnapshotProvider {
    fn produce(&mut self, text: &str) -> KinetexResult<VectorSnapshot>;
}

/// Memoizes an inner provider by exact (pre-normalization) text and applies
/// [`normalize_group_markers`] before delegating.
pub struct Memoized<P> {
    inner: P,
    cache: BTreeMap<String, VectorSnapshot>,
}

impl<P: SnapshotProvider> Memoized<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: BTreeMap::new(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: SnapshotProvider> SnapshotProvider for Memoized<P> {
    fn produce(&mut self, text: &str) -> KinetexResult<VectorSnapshot> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit.clone());
        }
        let normalized = normalize_group_markers(text);
        let snapshot = self.inner.produce(&normalized)?;
        self.cache.insert(text.to_string(), snapshot.clone());
        Ok(snapshot)
    }
}
