//! Structure definition and grille materialization
//!
//! The structure definition is the authoritative checklist tree supplied
//! by the remote service; the builder combines it with a previous-answers
//! source into a populated [`Fiche`]. A malformed definition fails the
//! whole build: a partial tree would silently under-report the control.

use serde::Deserialize;

use crate::model::{Criterion, Element, Fiche, Residence, Zone};
use crate::protocol::resume::DecodedControl;
use crate::snapshot::FicheSnapshot;
use crate::{Error, Result};

/// Checklist subset a zone belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistGroup {
    Proximity,
    Contract,
}

/// Subset selection for one control
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecklistSelection {
    pub proximity: bool,
    pub contract: bool,
}

impl ChecklistSelection {
    pub fn new(proximity: bool, contract: bool) -> Self {
        Self { proximity, contract }
    }

    pub fn includes(&self, group: ChecklistGroup) -> bool {
        match group {
            ChecklistGroup::Proximity => self.proximity,
            ChecklistGroup::Contract => self.contract,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.proximity && !self.contract
    }
}

/// Authoritative checklist tree: zones, elements, criteria with weights
///
/// Every field is required; a definition missing any expected key fails to
/// deserialize as a whole.
#[derive(Debug, Clone, Deserialize)]
pub struct StructureDef {
    pub zones: Vec<ZoneDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneDef {
    pub id: String,
    pub text: String,
    pub coef: u32,
    pub group: ChecklistGroup,
    pub elements: Vec<ElementDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementDef {
    pub id: String,
    pub text: String,
    pub coef: u32,
    pub criteria: Vec<CriterionDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CriterionDef {
    pub id: String,
    pub text: String,
    pub coef: u32,
}

impl StructureDef {
    /// Parse a JSON structure definition; any missing key aborts the build
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| Error::Build(e.to_string()))
    }
}

/// Previous-answers source for a new control
#[derive(Debug, Clone)]
pub enum PreviousAnswers {
    /// Remote snapshot of the residence's last submitted control
    Remote(DecodedControl),
    /// Locally queued snapshot for the same residence
    Local(FicheSnapshot),
    /// Fresh control, everything zeroed
    None,
}

/// One recovered answer, whatever the source
struct Answer {
    value: crate::model::CriterionValue,
    comment: String,
    capture: String,
    capture_data: String,
}

impl PreviousAnswers {
    fn answer(&self, zone_id: &str, element_id: &str, criterion_id: &str) -> Option<Answer> {
        match self {
            PreviousAnswers::Remote(control) => {
                let criterion = control
                    .zones
                    .iter()
                    .find(|z| z.id == zone_id)?
                    .element(element_id)?
                    .criterion(criterion_id)?;
                Some(Answer {
                    value: criterion.value,
                    comment: criterion.comment.clone(),
                    capture: criterion.capture.clone(),
                    capture_data: criterion.capture_data.clone(),
                })
            }
            PreviousAnswers::Local(snapshot) => {
                let entry = snapshot.criterion(zone_id, element_id, criterion_id)?;
                Some(Answer {
                    value: entry.value,
                    comment: entry.comment.clone(),
                    capture: entry.capture.name.clone(),
                    capture_data: entry.capture.data.clone(),
                })
            }
            PreviousAnswers::None => None,
        }
    }
}

/// Materialize a fiche from the structure definition
///
/// Only zones belonging to the selected subset(s) are materialized —
/// zones outside the selection are dropped entirely, not hidden. Each
/// criterion is initialized from the previous-answers source when a
/// matching id path exists, else left unanswered.
pub fn build_fiche(
    def: &StructureDef,
    selection: ChecklistSelection,
    previous: &PreviousAnswers,
    residence: Residence,
) -> Result<Fiche> {
    if selection.is_empty() {
        return Err(Error::Build("no checklist subset selected".to_string()));
    }
    validate(def)?;

    let mut fiche = Fiche::new(residence);

    for zone_def in &def.zones {
        if !selection.includes(zone_def.group) {
            continue;
        }
        let mut zone = Zone::new(&zone_def.id, &zone_def.text, zone_def.coef);
        for element_def in &zone_def.elements {
            let mut element = Element::new(&element_def.id, &element_def.text, element_def.coef);
            for criterion_def in &element_def.criteria {
                let mut criterion =
                    Criterion::new(&criterion_def.id, &criterion_def.text, criterion_def.coef);
                if let Some(answer) =
                    previous.answer(&zone_def.id, &element_def.id, &criterion_def.id)
                {
                    criterion.value = answer.value;
                    criterion.comment = answer.comment;
                    criterion.capture = answer.capture;
                    criterion.capture_data = answer.capture_data;
                }
                element.criteria.push(criterion);
            }
            zone.elements.push(element);
        }
        fiche.zones.push(zone);
    }

    tracing::debug!(
        residence_id = %fiche.residence.id,
        zones = fiche.zones.len(),
        "Materialized grille"
    );
    Ok(fiche)
}

/// Reject definitions with empty ids, zero weights or duplicate sibling ids
fn validate(def: &StructureDef) -> Result<()> {
    check_unique(def.zones.iter().map(|z| z.id.as_str()), "zone")?;
    for zone in &def.zones {
        check_node(&zone.id, zone.coef, "zone")?;
        check_unique(zone.elements.iter().map(|e| e.id.as_str()), "element")?;
        for element in &zone.elements {
            check_node(&element.id, element.coef, "element")?;
            check_unique(element.criteria.iter().map(|c| c.id.as_str()), "criterion")?;
            for criterion in &element.criteria {
                check_node(&criterion.id, criterion.coef, "criterion")?;
            }
        }
    }
    Ok(())
}

fn check_node(id: &str, coef: u32, level: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Build(format!("{} with empty id", level)));
    }
    if coef == 0 {
        return Err(Error::Build(format!("{} '{}' has zero coefficient", level, id)));
    }
    Ok(())
}

fn check_unique<'a>(ids: impl Iterator<Item = &'a str>, level: &str) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(Error::Build(format!("duplicate {} id '{}'", level, id)));
        }
    }
    Ok(())
}
