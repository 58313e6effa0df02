//! Weighted pass/fail aggregation
//!
//! One scoring rule, applied at the criterion level and summed
//! componentwise upward; element, zone and overall scores all go through
//! the same code path.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::Serialize;

use crate::model::{Criterion, CriterionValue, Element, Fiche, Zone};
use crate::{Error, Result};

/// Accumulated (note, max) pair for one aggregate
///
/// `max == 0` means the aggregate is entirely not-applicable and has no
/// numeric percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    pub note: u32,
    pub max: u32,
}

impl Score {
    pub const fn new(note: u32, max: u32) -> Self {
        Self { note, max }
    }

    /// Integer percentage, floored and clamped to 0..=100
    ///
    /// Returns `None` when `max == 0` (aggregate is not applicable).
    pub fn percentage(&self) -> Option<u8> {
        if self.max == 0 {
            return None;
        }
        let pct = (self.note as u64 * 100) / self.max as u64;
        Some(pct.min(100) as u8)
    }

    /// Band for this score under the given thresholds
    ///
    /// `None` when the score has no percentage or no thresholds are
    /// configured; the aggregate is then rendered neutrally.
    pub fn band(&self, thresholds: Option<Thresholds>) -> Option<Band> {
        Some(thresholds?.band(self.percentage()?))
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        Score::new(self.note + rhs.note, self.max + rhs.max)
    }
}

impl AddAssign for Score {
    fn add_assign(&mut self, rhs: Score) {
        self.note += rhs.note;
        self.max += rhs.max;
    }
}

impl Sum for Score {
    fn sum<I: Iterator<Item = Score>>(iter: I) -> Score {
        iter.fold(Score::default(), Score::add)
    }
}

/// Pass/fail band of a scored aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Critical,
    Warning,
    Good,
}

/// Configured banding thresholds, identical at every aggregation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    low: u8,
    high: u8,
}

impl Thresholds {
    /// Build validated thresholds; requires `low <= high`, both 0..=100
    pub fn new(low: u8, high: u8) -> Result<Self> {
        if low > high {
            return Err(Error::Config(format!(
                "score thresholds out of order: low={} high={}",
                low, high
            )));
        }
        if high > 100 {
            return Err(Error::Config(format!("score threshold above 100: {}", high)));
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> u8 {
        self.low
    }

    pub fn high(&self) -> u8 {
        self.high
    }

    /// Band a percentage: below `low` is critical, at or above `high` is
    /// good, anything between is warning
    pub fn band(&self, percentage: u8) -> Band {
        if percentage < self.low {
            Band::Critical
        } else if percentage >= self.high {
            Band::Good
        } else {
            Band::Warning
        }
    }
}

/// Anything in the tree that aggregates to a (note, max) pair
pub trait Scored {
    fn score(&self) -> Score;
}

impl Scored for Criterion {
    /// The single leaf rule: pass contributes (coef, coef), fail
    /// contributes (0, coef), not-applicable contributes (0, 0) and stays
    /// out of the denominator entirely.
    fn score(&self) -> Score {
        match self.value {
            CriterionValue::Pass => Score::new(self.coef, self.coef),
            CriterionValue::Fail => Score::new(0, self.coef),
            CriterionValue::NotApplicable => Score::new(0, 0),
        }
    }
}

impl Scored for Element {
    fn score(&self) -> Score {
        self.criteria.iter().map(Scored::score).sum()
    }
}

impl Scored for Zone {
    fn score(&self) -> Score {
        self.elements.iter().map(Scored::score).sum()
    }
}

impl Scored for Fiche {
    fn score(&self) -> Score {
        self.zones.iter().map(Scored::score).sum()
    }
}
