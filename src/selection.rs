//! Author-curated character ranges used to bias morph correspondences.
//!
//! A [`Selection`] is a half-open `[start, end)` range of code points over
//! one side of an animation record, tagged with a palette color index. The
//! set of selections for one side stays merge-closed at insertion time via
//! [`merge`]; [`annotate`] turns text plus selections back into marker
//! syntax consumed by the snapshot provider.

/// The fixed authoring palette. `Selection::color` indexes into this table.
pub const PALETTE: [&str; 15] = [
    "#ff8a80", "#ea80fc", "#b388ff", "#8c9eff", "#82b1ff", "#80d8ff", "#84ffff", "#a7ffeb",
    "#b9f6ca", "#ccff90", "#f4ff81", "#ffff8d", "#ffe57f", "#ffd180", "#ff9e80",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Selection {
    pub color: u32,
    pub start: usize, // code-point offset, inclusive
    pub end: usize,   // code-point offset, exclusive
}

impl Selection {
    pub fn new(color: u32, start: usize, end: usize) -> Self {
        Self { color, start, end }
    }

    pub fn palette_color(&self) -> Option<&'static str> {
        PALETTE.get(self.color as usize).copied()
    }
}

/// Inserts `new` into `existing`, keeping the set merge-closed.
///
/// Rules, in order: a same-color selection ending exactly where `new`
/// starts is extended to `new.end`; a same-color selection fully
/// containing `new` absorbs it; otherwise `new` is appended unchanged.
/// Overlapping-but-not-nested same-color selections are deliberately both
/// kept. Degenerate ranges (`start == end`) are dropped silently.
pub fn merge(mut existing: Vec<Selection>, new: Selection) -> Vec<Selection> {
    if new.start >= new.end {
        return existing;
    }

    if let Some(prev) = existing
        .iter_mut()
        .find(|s| s.color == new.color && s.end == new.start)
    {
        prev.end = new.end;
        return existing;
    }

    let surrounded = existing
        .iter()
        .any(|s| s.color == new.color && s.start <= new.start && s.end >= new.end);
    if surrounded {
        return existing;
    }

    existing.push(new);
    existing
}

/// Returns, per code-point offset of `text`, the innermost selection active
/// at that offset (or `None`).
///
/// Offsets are scanned left to right with a stack of open selections:
/// selections whose end equals the offset are popped, selections starting
/// at the offset are pushed in descending-end order (so a selection ending
/// later sits below one ending sooner), and the top of the stack wins.
pub fn resolve_active(text: &str, selections: &[Selection]) -> Vec<Option<Selection>> {
    let len = text.chars().count();
    let mut active = Vec::with_capacity(len);
    let mut levels: Vec<Selection> = Vec::new();

    for i in 0..len {
        let ending = selections.iter().filter(|s| s.end == i).count();
        levels.truncate(levels.len().saturating_sub(ending));

        let mut starting: Vec<Selection> = selections.iter().filter(|s| s.start == i).copied().collect();
        starting.sort_by(|a, b| b.end.cmp(&a.end));
        levels.extend(starting);

        active.push(levels.last().copied());
    }

    active
}

/// Rewrites `text` with group markers: one `}` per selection ending at a
/// character, then one `\g{N}{` opener (descending-end order, so nesting
/// comes out innermost-correct) per selection starting there, then the
/// character. Selections ending at `text.len()` close after the loop.
pub fn annotate(text: &str, selections: &[Selection]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());

    for (i, c) in chars.iter().enumerate() {
        for _ in selections.iter().filter(|s| s.end == i) {
            out.push('}');
        }

        let mut starting: Vec<&Selection> = selections.iter().filter(|s| s.start == i).collect();
        starting.sort_by(|a, b| b.end.cmp(&a.end));
        for s in starting {
            out.push_str(&format!("\\g{{{}}}{{", s.color + 1));
        }

        out.push(*c);
    }

    for _ in selections.iter().filter(|s| s.end == chars.len()) {
        out.push('}');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_idempotent() {
        let s = Selection::new(1, 0, 4);
        let once = merge(Vec::new(), s);
        let twice = merge(once.clone(), s);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_coalesces_adjacent_same_color() {
        let sels = merge(Vec::new(), Selection::new(1, 0, 2));
        let sels = merge(sels, Selection::new(1, 2, 5));
        assert_eq!(sels, vec![Selection::new(1, 0, 5)]);
    }

    #[test]
    fn merge_absorbs_contained_same_color() {
        let sels = merge(Vec::new(), Selection::new(2, 0, 10));
        let sels = merge(sels, Selection::new(2, 3, 5));
        assert_eq!(sels, vec![Selection::new(2, 0, 10)]);
    }

    #[test]
    fn merge_keeps_other_colors_separate() {
        let sels = merge(Vec::new(), Selection::new(1, 0, 2));
        let sels = merge(sels, Selection::new(2, 2, 5));
        assert_eq!(sels.len(), 2);
    }

    #[test]
    fn merge_keeps_overlapping_unnested_same_color() {
        // Accepted approximation: overlap without nesting is not unified.
        let sels = merge(Vec::new(), Selection::new(1, 0, 5));
        let sels = merge(sels, Selection::new(1, 3, 8));
        assert_eq!(sels.len(), 2);
    }

    #[test]
    fn merge_drops_degenerate_range() {
        let sels = merge(Vec::new(), Selection::new(0, 3, 3));
        assert!(sels.is_empty());
    }

    #[test]
    fn resolve_active_reports_innermost() {
        let sels = vec![Selection::new(1, 0, 6), Selection::new(2, 2, 4)];
        let active = resolve_active("abcdef", &sels);
        let colors: Vec<Option<u32>> = active.iter().map(|s| s.map(|s| s.color)).collect();
        assert_eq!(
            colors,
            vec![Some(1), Some(1), Some(2), Some(2), Some(1), Some(1)]
        );
    }

    #[test]
    fn resolve_active_is_none_outside_selections() {
        let sels = vec![Selection::new(0, 1, 3)];
        let active = resolve_active("abcd", &sels);
        assert_eq!(active[0], None);
        assert_eq!(active[3], None);
    }

    #[test]
    fn annotate_nests_markers() {
        let sels = vec![Selection::new(1, 0, 6), Selection::new(2, 2, 4)];
        assert_eq!(annotate("abcdef", &sels), "\\g{2}{ab\\g{3}{cd}ef}");
    }

    #[test]
    fn annotate_orders_same_start_by_descending_end() {
        let sels = vec![Selection::new(0, 0, 2), Selection::new(1, 0, 4)];
        assert_eq!(annotate("abcd", &sels), "\\g{2}{\\g{1}{ab}cd}");
    }

    #[test]
    fn annotate_closes_at_text_end() {
        let sels = vec![Selection::new(0, 2, 4)];
        assert_eq!(annotate("abcd", &sels), "ab\\g{1}{cd}");
    }
}
