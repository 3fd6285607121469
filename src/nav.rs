//! Presenter navigation over the analyzed deck.
//!
//! A deck is reduced to its steps-per-slide vector; stepping walks through
//! every step of every slide in order, and out-of-range positions clamp to
//! the nearest valid one instead of failing.

/// A position in the deck: slide index plus step index within that slide.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub slide: usize,
    pub step: usize,
}

impl Position {
    pub fn new(slide: usize, step: usize) -> Self {
        Self { slide, step }
    }

    /// Clamps to the last valid slide and step. An empty deck clamps to
    /// the origin.
    pub fn clamp(self, steps_per_slide: &[usize]) -> Self {
        let Some(last_slide) = steps_per_slide.len().checked_sub(1) else {
            return Self::default();
        };
        let slide = self.slide.min(last_slide);
        let step = self.step.min(steps_per_slide[slide].max(1) - 1);
        Self { slide, step }
    }

    /// Advances one step, spilling into the next slide's first step. At
    /// the very end the position stays put.
    pub fn next(self, steps_per_slide: &[usize]) -> Self {
        if steps_per_slide.is_empty() {
            return Self::default();
        }
        let pos = self.clamp(steps_per_slide);
        if pos.step + 1 < steps_per_slide[pos.slide].max(1) {
            return Self::new(pos.slide, pos.step + 1);
        }
        if pos.slide + 1 < steps_per_slide.len() {
            return Self::new(pos.slide + 1, 0);
        }
        pos
    }

    /// Steps back, landing on the previous slide's last step. At the very
    /// beginning the position stays put.
    pub fn prev(self, steps_per_slide: &[usize]) -> Self {
        if steps_per_slide.is_empty() {
            return Self::default();
        }
        let pos = self.clamp(steps_per_slide);
        if pos.step > 0 {
            return Self::new(pos.slide, pos.step - 1);
        }
        if pos.slide > 0 {
            let slide = pos.slide - 1;
            return Self::new(slide, steps_per_slide[slide].max(1) - 1);
        }
        pos
    }
}
