//! Compact per-track keyframe notation.
//!
//! Each non-empty line is `<label> <tokens>`; tokens are single characters
//! walked left to right with a running counter:
//!
//! - a digit sets the counter and emits it,
//! - `+` / `-` increment/decrement the counter and emit it,
//! - a space repeats the previous slot,
//! - `.` fans out the open range up to the next digit (or up to the
//!   substitution length) as one grouped slot,
//! - anything else is a raw token resolved through substitutions and the
//!   abbreviation table.
//!
//! After tokenizing, every track is expanded to one value per output step:
//! the step count per slot index is the widest slot across tracks at that
//! index, and short tracks repeat their final value.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::error::{KinetexError, KinetexResult};

/// Caller-supplied values for one track line. Numeric slots look their
/// value up by decimal key; `.` with no following digit fans out to
/// [`Substitution::len`].
#[derive(Clone, Debug, Default)]
pub struct Substitution {
    values: BTreeMap<String, Value>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `values` by position: `values[i]` is looked up by the token `i`.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            values: values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        }
    }

    pub fn insert(&mut self, token: impl Into<String>, value: Value) {
        self.values.insert(token.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get(&self, token: &str) -> Option<&Value> {
        self.values.get(token)
    }
}

/// The global abbreviation table applied after substitutions.
pub fn default_abbreviations() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("h".to_string(), json!({ "opacity": 0 })),
        ("v".to_string(), json!({ "opacity": 1 })),
        ("p".to_string(), json!({ "opacity": 0.3 })),
        ("d".to_string(), json!({ "draw": 0 })),
        ("D".to_string(), json!({ "draw": "0 100%" })),
    ])
}

/// One output step: every track label mapped to its translated value.
pub type Step = BTreeMap<String, Value>;

/// A fully expanded notation block.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Expansion {
    pub steps: Vec<Step>,
    /// Width contributed by each unexpanded slot index.
    pub slot_widths: Vec<usize>,
    pub unexpanded_len: usize,
}

#[derive(Clone, Debug, PartialEq)]
enum Slot {
    Number(i64),
    Range(Vec<i64>),
    Raw(char),
}

impl Slot {
    fn width(&self) -> usize {
        match self {
            Slot::Range(r) => r.len(),
            _ => 1,
        }
    }
}

struct Track {
    label: String,
    slots: Vec<Slot>,
}

/// Compiles a notation block with no substitutions.
pub fn compile(notation: &str) -> KinetexResult<Vec<Step>> {
    compile_with(notation, &BTreeMap::new()).map(|e| e.steps)
}

/// Compiles a notation block; `substitutions` are keyed by track label and
/// apply only to that track's line.
#[tracing::instrument(skip_all)]
pub fn compile_with(
    notation: &str,
    substitutions: &BTreeMap<String, Substitution>,
) -> KinetexResult<Expansion> {
    let empty = Substitution::new();
    let abbreviations = default_abbreviations();

    let mut tracks = Vec::new();
    for line in notation.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let track = tokenize_line(line, substitutions, &empty)?;
        tracks.push(track);
    }
    if tracks.is_empty() {
        return Err(KinetexError::authoring("timeline notation has no tracks"));
    }

    let unexpanded_len = tracks.iter().map(|t| t.slots.len()).max().unwrap_or(0);

    // Mismatched fan-out widths at one index widen to the maximum across
    // tracks; each track pads its slot with the slot's last value.
    let slot_widths: Vec<usize> = (0..unexpanded_len)
        .map(|i| {
            tracks
                .iter()
                .map(|t| t.slots.get(i).map_or(1, Slot::width))
                .max()
                .unwrap_or(1)
        })
        .collect();

    let mut expanded: Vec<(String, Vec<Value>)> = Vec::with_capacity(tracks.len());
    for track in &tracks {
        let sub = substitutions.get(&track.label).unwrap_or(&empty);
        let mut values = Vec::new();
        for (i, width) in slot_widths.iter().enumerate() {
            let slot = track.slots.get(i).cloned().unwrap_or_else(|| {
                match track.slots.last() {
                    Some(Slot::Range(r)) => Slot::Number(*r.last().unwrap_or(&0)),
                    Some(other) => other.clone(),
                    None => Slot::Number(0),
                }
            });
            let mut emitted: Vec<i64> = Vec::new();
            let mut raw: Option<char> = None;
            match slot {
                Slot::Number(n) => emitted.push(n),
                Slot::Range(r) => emitted.extend(r),
                Slot::Raw(c) => raw = Some(c),
            }

            for k in 0..*width {
                let value = match raw {
                    Some(c) => translate(&c.to_string(), sub, &abbreviations),
                    None => {
                        let n = emitted[k.min(emitted.len() - 1)];
                        translate(&n.to_string(), sub, &abbreviations)
                    }
                };
                values.push(value);
            }
        }
        expanded.push((track.label.clone(), values));
    }

    let step_count = expanded.first().map_or(0, |(_, v)| v.len());
    let steps = (0..step_count)
        .map(|i| {
            expanded
                .iter()
                .map(|(label, values)| (label.clone(), values[i].clone()))
                .collect::<Step>()
        })
        .collect();

    Ok(Expansion {
        steps,
        slot_widths,
        unexpanded_len,
    })
}

fn translate(token: &str, sub: &Substitution, abbreviations: &BTreeMap<String, Value>) -> Value {
    if let Some(v) = sub.get(token) {
        return v.clone();
    }
    if let Some(v) = abbreviations.get(token) {
        return v.clone();
    }
    match token.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(token.to_string()),
    }
}

fn tokenize_line(
    line: &str,
    substitutions: &BTreeMap<String, Substitution>,
    empty: &Substitution,
) -> KinetexResult<Track> {
    let trimmed = line.trim();
    let (label, text) = trimmed
        .split_once(char::is_whitespace)
        .ok_or_else(|| KinetexError::authoring(format!("track line '{trimmed}' has no tokens")))?;
    let text = text.trim_start();
    let sub = substitutions.get(label).unwrap_or(empty);

    let chars: Vec<char> = text.chars().collect();
    let mut slots: Vec<Slot> = Vec::new();
    let mut counter: i64 = 0;

    for (i, &c) in chars.iter().enumerate() {
        match c {
            ' ' => {
                let prev = slots.last().cloned().ok_or_else(|| {
                    KinetexError::authoring(format!("track '{label}': nothing to repeat"))
                })?;
                slots.push(prev);
            }
            '+' | '-' => {
                counter += if c == '+' { 1 } else { -1 };
                slots.push(Slot::Number(counter));
            }
            '.' => {
                let from = match slots.last() {
                    Some(Slot::Number(n)) => *n,
                    Some(Slot::Range(_)) => {
                        return Err(KinetexError::authoring(format!(
                            "track '{label}': a dot cannot immediately follow another dot"
                        )));
                    }
                    Some(Slot::Raw(_)) | None => {
                        return Err(KinetexError::authoring(format!(
                            "track '{label}': a dot needs a preceding number"
                        )));
                    }
                };
                let to = match chars.get(i + 1).and_then(|c| c.to_digit(10)) {
                    Some(d) => d as i64,
                    None => sub.len() as i64,
                };
                let in_between: Vec<i64> = (from + 1..to).collect();
                if in_between.is_empty() {
                    slots.push(Slot::Number(from));
                } else {
                    slots.push(Slot::Range(in_between));
                }
            }
            c if c.is_ascii_digit() => {
                counter = c.to_digit(10).map(i64::from).unwrap_or(0);
                slots.push(Slot::Number(counter));
            }
            c => slots.push(Slot::Raw(c)),
        }
    }

    Ok(Track {
        label: label.to_string(),
        slots,
    })
}
