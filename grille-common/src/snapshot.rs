//! Internal persisted snapshot of a fiche
//!
//! Nested shape mirroring the Zone/Element/Criterion tree exactly, one
//! entry per criterion. Used by the local offline queue only; it is never
//! sent over the wire as-is.

use serde::{Deserialize, Serialize};

use crate::model::{CriterionValue, Fiche};

/// Attachment reference slot of one criterion entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSnapshot {
    pub name: String,
    pub data: String,
}

/// One criterion entry: id, value, comment and capture slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionSnapshot {
    pub id: String,
    pub value: CriterionValue,
    pub comment: String,
    pub capture: CaptureSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub id: String,
    pub criteria: Vec<CriterionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub id: String,
    pub elements: Vec<ElementSnapshot>,
}

/// Full snapshot of the answers in a fiche
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FicheSnapshot {
    pub zones: Vec<ZoneSnapshot>,
}

impl FicheSnapshot {
    /// Lookup one criterion entry by its zone/element/criterion id path
    pub fn criterion(
        &self,
        zone_id: &str,
        element_id: &str,
        criterion_id: &str,
    ) -> Option<&CriterionSnapshot> {
        self.zones
            .iter()
            .find(|z| z.id == zone_id)?
            .elements
            .iter()
            .find(|e| e.id == element_id)?
            .criteria
            .iter()
            .find(|c| c.id == criterion_id)
    }
}

impl From<&Fiche> for FicheSnapshot {
    fn from(fiche: &Fiche) -> Self {
        FicheSnapshot {
            zones: fiche
                .zones
                .iter()
                .map(|zone| ZoneSnapshot {
                    id: zone.id.clone(),
                    elements: zone
                        .elements
                        .iter()
                        .map(|element| ElementSnapshot {
                            id: element.id.clone(),
                            criteria: element
                                .criteria
                                .iter()
                                .map(|criterion| CriterionSnapshot {
                                    id: criterion.id.clone(),
                                    value: criterion.value,
                                    comment: criterion.comment.clone(),
                                    capture: CaptureSnapshot {
                                        name: criterion.capture.clone(),
                                        data: criterion.capture_data.clone(),
                                    },
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Criterion, Element, Residence, Zone};

    fn sample_fiche() -> Fiche {
        let mut fiche = Fiche::new(Residence::default());
        let mut zone = Zone::new("z1", "Exterior", 1);
        let mut element = Element::new("e1", "Facade", 1);
        let mut criterion = Criterion::new("c1", "Paint intact", 2);
        criterion.value = CriterionValue::Fail;
        criterion.comment = "cracked render".to_string();
        criterion.capture = "photo_12".to_string();
        criterion.capture_data = "content://photos/12".to_string();
        element.criteria.push(criterion);
        zone.elements.push(element);
        fiche.zones.push(zone);
        fiche
    }

    #[test]
    fn snapshot_mirrors_the_tree() {
        let fiche = sample_fiche();
        let snapshot = FicheSnapshot::from(&fiche);

        let entry = snapshot.criterion("z1", "e1", "c1").unwrap();
        assert_eq!(entry.value, CriterionValue::Fail);
        assert_eq!(entry.comment, "cracked render");
        assert_eq!(entry.capture.name, "photo_12");
        assert_eq!(entry.capture.data, "content://photos/12");
        assert!(snapshot.criterion("z1", "e1", "nope").is_none());
    }

    #[test]
    fn snapshot_json_round_trip() {
        let snapshot = FicheSnapshot::from(&sample_fiche());
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: FicheSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);

        // criterion values persist as bare integers in the JSON shape
        assert!(json.contains("\"value\":-1"));
    }
}
