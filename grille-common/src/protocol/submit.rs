//! Submission encoding
//!
//! Flat key=value shape produced when uploading a control. Zone groups
//! look like `zoneId_elem1:crit1=1,crit2=-1;elem2:crit3=0` and are joined
//! by `§`; only zones with at least one recorded element are emitted. A
//! parallel comment stream carries one entry per annotated criterion:
//! `zoneId_elementId_criterionId#02<escaped-comment>£<attachmentRef>`,
//! entries joined by `#01`. Unlike the fetch/resume stream this encoding
//! carries no coefficients or labels.

use crate::model::Fiche;
use crate::protocol::escape::escape_comment;

/// Separator between zone groups in the grille stream
pub const ZONE_SEPARATOR: &str = "§";
/// Separator between entries in the comment stream
pub const COMMENT_ENTRY_SEPARATOR: &str = "#01";
/// Marker between the id triple and the escaped comment text
pub const COMMENT_MARKER: &str = "#02";
/// Separator between the escaped comment and the attachment reference
pub const CAPTURE_SEPARATOR: &str = "£";

/// The two parallel streams of one control upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    /// Flat zone/element/criterion value groups
    pub grille: String,
    /// Comment stream, empty when no criterion is annotated
    pub comments: String,
}

/// Encode a fiche into the submission shape
pub fn encode_submission(fiche: &Fiche) -> Submission {
    let mut zone_groups = Vec::new();
    let mut comment_entries = Vec::new();

    for zone in &fiche.zones {
        let mut element_groups = Vec::new();
        for element in &zone.elements {
            if element.criteria.is_empty() {
                continue;
            }
            let values: Vec<String> = element
                .criteria
                .iter()
                .map(|criterion| format!("{}={}", criterion.id, criterion.value))
                .collect();
            element_groups.push(format!("{}:{}", element.id, values.join(",")));

            for criterion in &element.criteria {
                if !criterion.has_annotation() {
                    continue;
                }
                comment_entries.push(format!(
                    "{}_{}_{}{}{}{}{}",
                    zone.id,
                    element.id,
                    criterion.id,
                    COMMENT_MARKER,
                    escape_comment(&criterion.comment),
                    CAPTURE_SEPARATOR,
                    criterion.capture,
                ));
            }
        }
        if element_groups.is_empty() {
            continue;
        }
        zone_groups.push(format!("{}_{}", zone.id, element_groups.join(";")));
    }

    Submission {
        grille: zone_groups.join(ZONE_SEPARATOR),
        comments: comment_entries.join(COMMENT_ENTRY_SEPARATOR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Criterion, CriterionValue, Element, Fiche, Residence, Zone};

    fn criterion(id: &str, value: CriterionValue) -> Criterion {
        let mut c = Criterion::new(id, id.to_uppercase(), 1);
        c.value = value;
        c
    }

    fn sample_fiche() -> Fiche {
        let mut fiche = Fiche::new(Residence::default());

        let mut z1 = Zone::new("10", "Exterior", 1);
        let mut e1 = Element::new("101", "Facade", 1);
        e1.criteria.push(criterion("1011", CriterionValue::Pass));
        e1.criteria.push(criterion("1012", CriterionValue::Fail));
        let mut e2 = Element::new("102", "Roof", 1);
        e2.criteria.push(criterion("1021", CriterionValue::NotApplicable));
        z1.elements.push(e1);
        z1.elements.push(e2);

        let mut z2 = Zone::new("20", "Stairwell", 1);
        let mut e3 = Element::new("201", "Lighting", 1);
        e3.criteria.push(criterion("2011", CriterionValue::Pass));
        z2.elements.push(e3);

        fiche.zones.push(z1);
        fiche.zones.push(z2);
        fiche
    }

    #[test]
    fn grille_stream_layout() {
        let submission = encode_submission(&sample_fiche());
        assert_eq!(
            submission.grille,
            "10_101:1011=1,1012=-1;102:1021=0§20_201:2011=1"
        );
        assert_eq!(submission.comments, "");
    }

    #[test]
    fn zones_without_recorded_elements_are_omitted() {
        let mut fiche = sample_fiche();
        fiche.zones.push(Zone::new("30", "Empty", 1));
        let mut hollow = Zone::new("40", "Hollow", 1);
        hollow.elements.push(Element::new("401", "No criteria", 1));
        fiche.zones.push(hollow);

        let submission = encode_submission(&fiche);
        assert!(!submission.grille.contains("30_"));
        assert!(!submission.grille.contains("40_"));
    }

    #[test]
    fn comment_stream_carries_annotated_criteria_only() {
        let mut fiche = sample_fiche();
        {
            let c = fiche.criterion_mut("10", "101", "1012").unwrap();
            c.comment = "fuite d'eau; urgent".to_string();
            c.capture = "photo_3".to_string();
        }
        {
            let c = fiche.criterion_mut("20", "201", "2011").unwrap();
            c.capture = "photo_4".to_string();
        }

        let submission = encode_submission(&fiche);
        let entries: Vec<&str> = submission.comments.split(COMMENT_ENTRY_SEPARATOR).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], "10_101_1012#02fuite d$$#39;eau$$#59; urgent£photo_3");
        assert_eq!(entries[1], "20_201_2011#02£photo_4");
    }
}
