//! Grille data model: the Zone/Element/Criterion tree and the Fiche

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Answer state of a single criterion
///
/// Wire and snapshot representations use the integers -1 (fail),
/// 0 (not applicable) and 1 (pass); any other integer is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum CriterionValue {
    Fail = -1,
    NotApplicable = 0,
    Pass = 1,
}

impl Default for CriterionValue {
    fn default() -> Self {
        CriterionValue::NotApplicable
    }
}

impl From<CriterionValue> for i8 {
    fn from(value: CriterionValue) -> Self {
        value as i8
    }
}

impl TryFrom<i8> for CriterionValue {
    type Error = Error;

    fn try_from(value: i8) -> Result<Self> {
        CriterionValue::try_from(value as i64)
    }
}

impl TryFrom<i64> for CriterionValue {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            -1 => Ok(CriterionValue::Fail),
            0 => Ok(CriterionValue::NotApplicable),
            1 => Ok(CriterionValue::Pass),
            other => Err(Error::InvalidValue(other)),
        }
    }
}

impl std::fmt::Display for CriterionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", i8::from(*self))
    }
}

/// Finest checklist level, owned by its Element
///
/// `comment` and `capture` are conventionally filled only for failed
/// criteria, but that is a UI convention: the model accepts them for any
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub text: String,
    pub coef: u32,
    pub value: CriterionValue,
    pub comment: String,
    pub capture: String,
    pub capture_data: String,
}

impl Criterion {
    /// Create an unanswered criterion
    pub fn new(id: impl Into<String>, text: impl Into<String>, coef: u32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            coef,
            value: CriterionValue::default(),
            comment: String::new(),
            capture: String::new(),
            capture_data: String::new(),
        }
    }

    /// True when the criterion carries a comment or an attachment reference
    pub fn has_annotation(&self) -> bool {
        !self.comment.is_empty() || !self.capture.is_empty()
    }
}

/// Middle checklist level, owned by its Zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    pub text: String,
    pub coef: u32,
    pub criteria: Vec<Criterion>,
}

impl Element {
    pub fn new(id: impl Into<String>, text: impl Into<String>, coef: u32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            coef,
            criteria: Vec::new(),
        }
    }

    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    pub fn criterion_mut(&mut self, id: &str) -> Option<&mut Criterion> {
        self.criteria.iter_mut().find(|c| c.id == id)
    }
}

/// Coarsest checklist level, owned by the Fiche
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub text: String,
    pub coef: u32,
    pub elements: Vec<Element>,
}

impl Zone {
    pub fn new(id: impl Into<String>, text: impl Into<String>, coef: u32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            coef,
            elements: Vec::new(),
        }
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.id == id)
    }
}

/// Identity of the residence under inspection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Residence {
    pub id: String,
    pub reference: String,
    pub name: String,
    pub entry: String,
    pub address: String,
    pub supervisor: String,
    pub caretaker: String,
    pub agent: String,
}

/// Remediation task attached to a low-scoring control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanAction {
    pub id: String,
    pub due_date: NaiveDate,
    pub text: String,
}

/// The in-progress inspection record for one residence visit
///
/// Created when an inspection starts, populated by the grille builder,
/// mutated by operator input, read-only once the control is closed
/// server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fiche {
    pub residence: Residence,
    /// Control timestamp as carried by the remote service, opaque here
    pub ctrl_timestamp: String,
    /// Overall percentage, set once the control is finalized
    pub note: Option<u8>,
    pub plan_action: Option<PlanAction>,
    pub zones: Vec<Zone>,
}

impl Fiche {
    pub fn new(residence: Residence) -> Self {
        Self {
            residence,
            ctrl_timestamp: String::new(),
            note: None,
            plan_action: None,
            zones: Vec::new(),
        }
    }

    pub fn zone(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn zone_mut(&mut self, id: &str) -> Option<&mut Zone> {
        self.zones.iter_mut().find(|z| z.id == id)
    }

    /// Locate a criterion by its zone/element/criterion id path
    pub fn criterion(&self, zone_id: &str, element_id: &str, criterion_id: &str) -> Option<&Criterion> {
        self.zone(zone_id)?.element(element_id)?.criterion(criterion_id)
    }

    /// Mutable lookup by zone/element/criterion id path
    pub fn criterion_mut(
        &mut self,
        zone_id: &str,
        element_id: &str,
        criterion_id: &str,
    ) -> Option<&mut Criterion> {
        self.zone_mut(zone_id)?
            .element_mut(element_id)?
            .criterion_mut(criterion_id)
    }
}
