//! Fetch/resume encoding
//!
//! A single `§`-delimited token stream describing a previously submitted
//! control. The first two tokens are the control timestamp and the overall
//! note; every following record starts with a tag-prefixed token (`1` zone,
//! `2` element, `3` criterion) whose remaining fields are consumed as
//! subsequent tokens in a fixed order:
//!
//! - zone: coef, text
//! - element: coef, text
//! - criterion: value, coef, comment, capture, text
//!
//! A new zone or element tag implicitly closes and attaches the previous
//! one. The literal `vide` in comment/capture fields means empty; a record
//! whose id is the sentinel `new` is parsed but never attached. Any
//! deviation from the documented token order is a hard parse failure for
//! the whole decode — silently misaligned fields would corrupt scores.

use crate::model::{Criterion, CriterionValue, Element, Fiche, Zone};
use crate::{Error, Result};

/// Token separator of the stream
pub const TOKEN_SEPARATOR: char = '§';
/// Literal meaning "empty" in comment/capture fields
pub const EMPTY_FIELD: &str = "vide";
/// Sentinel id marking a record that exists in the stream but names no node
pub const SENTINEL_ID: &str = "new";

/// One tagged record of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeRecord {
    Zone {
        id: String,
        coef: u32,
        text: String,
    },
    Element {
        id: String,
        coef: u32,
        text: String,
    },
    Criterion {
        id: String,
        value: CriterionValue,
        coef: u32,
        comment: String,
        capture: String,
        text: String,
    },
}

/// Decoded contents of a fetch/resume stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedControl {
    pub ctrl_timestamp: String,
    /// Overall note token as received; `-1` marks a non-finalized control
    pub note: String,
    pub zones: Vec<Zone>,
}

/// Decode a full fetch/resume stream into a zone tree
pub fn decode_resume(input: &str) -> Result<DecodedControl> {
    let mut tokens = input.split(TOKEN_SEPARATOR).map(str::trim);

    let ctrl_timestamp = tokens
        .next()
        .ok_or_else(|| Error::Parse("missing control timestamp".to_string()))?
        .to_string();
    let note = tokens
        .next()
        .ok_or_else(|| Error::Parse("missing overall note".to_string()))?
        .to_string();

    let records = parse_records(tokens)?;
    let zones = fold_records(records)?;

    Ok(DecodedControl {
        ctrl_timestamp,
        note,
        zones,
    })
}

/// Encode a fiche into the fetch/resume stream shape
///
/// Comment and capture fields are written as `vide` when empty; a
/// non-finalized control carries `-1` as its overall note token.
pub fn encode_resume(fiche: &Fiche) -> String {
    let mut tokens: Vec<String> = Vec::new();
    tokens.push(fiche.ctrl_timestamp.clone());
    tokens.push(
        fiche
            .note
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-1".to_string()),
    );

    for zone in &fiche.zones {
        tokens.push(format!("1{}", zone.id));
        tokens.push(zone.coef.to_string());
        tokens.push(zone.text.clone());
        for element in &zone.elements {
            tokens.push(format!("2{}", element.id));
            tokens.push(element.coef.to_string());
            tokens.push(element.text.clone());
            for criterion in &element.criteria {
                tokens.push(format!("3{}", criterion.id));
                tokens.push(criterion.value.to_string());
                tokens.push(criterion.coef.to_string());
                tokens.push(field_or_empty(&criterion.comment));
                tokens.push(field_or_empty(&criterion.capture));
                tokens.push(criterion.text.clone());
            }
        }
    }

    tokens.join(&TOKEN_SEPARATOR.to_string())
}

fn field_or_empty(value: &str) -> String {
    if value.is_empty() {
        EMPTY_FIELD.to_string()
    } else {
        value.to_string()
    }
}

fn parse_records<'a, I>(mut tokens: I) -> Result<Vec<ResumeRecord>>
where
    I: Iterator<Item = &'a str>,
{
    let mut records = Vec::new();

    while let Some(head) = tokens.next() {
        let mut chars = head.chars();
        let tag = chars
            .next()
            .ok_or_else(|| Error::Parse("empty record token".to_string()))?;
        let id = chars.as_str().to_string();

        let record = match tag {
            '1' => ResumeRecord::Zone {
                id,
                coef: parse_coef(next_field(&mut tokens, "zone coefficient")?)?,
                text: next_field(&mut tokens, "zone text")?.to_string(),
            },
            '2' => ResumeRecord::Element {
                id,
                coef: parse_coef(next_field(&mut tokens, "element coefficient")?)?,
                text: next_field(&mut tokens, "element text")?.to_string(),
            },
            '3' => ResumeRecord::Criterion {
                id,
                value: parse_value(next_field(&mut tokens, "criterion value")?)?,
                coef: parse_coef(next_field(&mut tokens, "criterion coefficient")?)?,
                comment: decode_field(next_field(&mut tokens, "criterion comment")?),
                capture: decode_field(next_field(&mut tokens, "criterion capture")?),
                text: next_field(&mut tokens, "criterion text")?.to_string(),
            },
            other => {
                return Err(Error::Parse(format!(
                    "unknown record tag '{}' in token '{}'",
                    other, head
                )))
            }
        };
        records.push(record);
    }

    Ok(records)
}

fn next_field<'a, I>(tokens: &mut I, what: &str) -> Result<&'a str>
where
    I: Iterator<Item = &'a str>,
{
    tokens
        .next()
        .ok_or_else(|| Error::Parse(format!("stream ended before {}", what)))
}

fn parse_coef(token: &str) -> Result<u32> {
    token
        .parse::<u32>()
        .map_err(|_| Error::Parse(format!("invalid coefficient '{}'", token)))
}

fn parse_value(token: &str) -> Result<CriterionValue> {
    let raw: i64 = token
        .parse()
        .map_err(|_| Error::Parse(format!("invalid criterion value '{}'", token)))?;
    CriterionValue::try_from(raw)
        .map_err(|_| Error::Parse(format!("criterion value out of range '{}'", token)))
}

fn decode_field(token: &str) -> String {
    if token == EMPTY_FIELD {
        String::new()
    } else {
        token.to_string()
    }
}

/// Open node on the reducer stack; `attach: false` marks sentinel records
/// whose subtree is dropped on close
enum Frame {
    Zone { zone: Zone, attach: bool },
    Element { element: Element, attach: bool },
}

/// Fold the flat record list into a zone tree with an explicit stack
fn fold_records(records: Vec<ResumeRecord>) -> Result<Vec<Zone>> {
    let mut zones: Vec<Zone> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for record in records {
        match record {
            ResumeRecord::Zone { id, coef, text } => {
                close_element(&mut stack);
                close_zone(&mut stack, &mut zones);
                let attach = id != SENTINEL_ID;
                stack.push(Frame::Zone {
                    zone: Zone::new(id, text, coef),
                    attach,
                });
            }
            ResumeRecord::Element { id, coef, text } => {
                close_element(&mut stack);
                if !matches!(stack.last(), Some(Frame::Zone { .. })) {
                    return Err(Error::Parse("element record outside any zone".to_string()));
                }
                let attach = id != SENTINEL_ID;
                stack.push(Frame::Element {
                    element: Element::new(id, text, coef),
                    attach,
                });
            }
            ResumeRecord::Criterion {
                id,
                value,
                coef,
                comment,
                capture,
                text,
            } => match stack.last_mut() {
                Some(Frame::Element { element, .. }) => {
                    if id != SENTINEL_ID {
                        let mut criterion = Criterion::new(id, text, coef);
                        criterion.value = value;
                        criterion.comment = comment;
                        criterion.capture = capture;
                        element.criteria.push(criterion);
                    }
                }
                _ => {
                    return Err(Error::Parse(
                        "criterion record outside any element".to_string(),
                    ))
                }
            },
        }
    }

    close_element(&mut stack);
    close_zone(&mut stack, &mut zones);
    Ok(zones)
}

fn close_element(stack: &mut Vec<Frame>) {
    if matches!(stack.last(), Some(Frame::Element { .. })) {
        let Some(Frame::Element { element, attach }) = stack.pop() else {
            unreachable!();
        };
        if attach {
            if let Some(Frame::Zone { zone, .. }) = stack.last_mut() {
                zone.elements.push(element);
            }
        }
    }
}

fn close_zone(stack: &mut Vec<Frame>, zones: &mut Vec<Zone>) {
    if matches!(stack.last(), Some(Frame::Zone { .. })) {
        let Some(Frame::Zone { zone, attach }) = stack.pop() else {
            unreachable!();
        };
        if attach {
            zones.push(zone);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fiche, Residence};

    fn stream(tokens: &[&str]) -> String {
        tokens.join("§")
    }

    #[test]
    fn decodes_a_two_zone_stream() {
        let input = stream(&[
            "20240112143000",
            "85",
            "110", "2", "Exterior",
            "2101", "1", "Facade",
            "31011", "1", "2", "vide", "vide", "Paint intact",
            "31012", "-1", "3", "fuite d'eau", "photo_3", "Gutters sealed",
            "120", "1", "Stairwell",
            "2201", "1", "Lighting",
            "32011", "0", "1", "vide", "vide", "Bulbs working",
        ]);

        let decoded = decode_resume(&input).unwrap();
        assert_eq!(decoded.ctrl_timestamp, "20240112143000");
        assert_eq!(decoded.note, "85");
        assert_eq!(decoded.zones.len(), 2);

        let facade = decoded.zones[0].element("101").unwrap();
        assert_eq!(facade.criterion("1011").unwrap().value, CriterionValue::Pass);
        let gutters = facade.criterion("1012").unwrap();
        assert_eq!(gutters.value, CriterionValue::Fail);
        assert_eq!(gutters.comment, "fuite d'eau");
        assert_eq!(gutters.capture, "photo_3");
        assert_eq!(gutters.coef, 3);

        let lighting = decoded.zones[1].element("201").unwrap();
        assert_eq!(
            lighting.criterion("2011").unwrap().value,
            CriterionValue::NotApplicable
        );
    }

    #[test]
    fn tokens_are_trimmed() {
        let input = " 20240112143000 §85§ 110 §2§Exterior";
        let decoded = decode_resume(input).unwrap();
        assert_eq!(decoded.ctrl_timestamp, "20240112143000");
        assert_eq!(decoded.zones[0].id, "10");
    }

    #[test]
    fn sentinel_records_are_never_attached() {
        let input = stream(&[
            "ts", "-1",
            "110", "1", "Exterior",
            "2101", "1", "Facade",
            "3new", "0", "1", "vide", "vide", "placeholder",
            "2new", "1", "placeholder",
            "1new", "1", "placeholder",
        ]);

        let decoded = decode_resume(&input).unwrap();
        assert_eq!(decoded.zones.len(), 1);
        assert_eq!(decoded.zones[0].elements.len(), 1);
        assert!(decoded.zones[0].elements[0].criteria.is_empty());
    }

    #[test]
    fn children_of_a_sentinel_zone_are_dropped_with_it() {
        let input = stream(&[
            "ts", "-1",
            "1new", "1", "placeholder",
            "2201", "1", "Orphaned",
            "32011", "1", "1", "vide", "vide", "Orphaned criterion",
        ]);

        let decoded = decode_resume(&input).unwrap();
        assert!(decoded.zones.is_empty());
    }

    #[test]
    fn truncated_stream_is_a_hard_failure() {
        let input = stream(&["ts", "-1", "110", "2"]);
        let err = decode_resume(&input).unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "got {:?}", err);
    }

    #[test]
    fn unknown_tag_is_a_hard_failure() {
        let input = stream(&["ts", "-1", "9oops", "1", "text"]);
        assert!(decode_resume(&input).is_err());
    }

    #[test]
    fn out_of_range_value_is_a_hard_failure() {
        let input = stream(&[
            "ts", "-1",
            "110", "1", "Z",
            "2101", "1", "E",
            "31011", "7", "1", "vide", "vide", "C",
        ]);
        assert!(decode_resume(&input).is_err());
    }

    #[test]
    fn criterion_before_any_element_is_a_hard_failure() {
        let input = stream(&["ts", "-1", "31011", "1", "1", "vide", "vide", "C"]);
        assert!(decode_resume(&input).is_err());
    }

    #[test]
    fn trailing_separator_is_a_hard_failure() {
        let mut input = stream(&["ts", "-1", "110", "1", "Z"]);
        input.push('§');
        assert!(decode_resume(&input).is_err());
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let mut fiche = Fiche::new(Residence::default());
        fiche.ctrl_timestamp = "20240112143000".to_string();
        fiche.note = Some(62);

        let mut zone = Zone::new("10", "Exterior", 2);
        let mut element = Element::new("101", "Facade", 1);
        let mut c1 = Criterion::new("1011", "Paint intact", 2);
        c1.value = CriterionValue::Pass;
        let mut c2 = Criterion::new("1012", "Gutters sealed", 3);
        c2.value = CriterionValue::Fail;
        c2.comment = "fuite d'eau".to_string();
        c2.capture = "photo_3".to_string();
        element.criteria.push(c1);
        element.criteria.push(c2);
        zone.elements.push(element);
        fiche.zones.push(zone);

        let encoded = encode_resume(&fiche);
        let decoded = decode_resume(&encoded).unwrap();

        assert_eq!(decoded.ctrl_timestamp, fiche.ctrl_timestamp);
        assert_eq!(decoded.note, "62");
        assert_eq!(decoded.zones, fiche.zones);
    }

    #[test]
    fn unanswered_fiche_encodes_note_as_minus_one() {
        let fiche = Fiche::new(Residence::default());
        let encoded = encode_resume(&fiche);
        assert!(encoded.ends_with("§-1"));
    }
}
