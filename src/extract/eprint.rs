use std::path::Path;

use quick_xml::events::{BytesStart, Event};

use crate::error::ExtractError;
use crate::table::RecordMeta;

/// Namespace of the EPrints 2.0 export schema. Any document not declaring
/// it is rejected; other shapes are out of scope.
pub const EPRINTS_XMLNS: &str = "http://eprints.org/ep2/data/2.0";

/// One `<eprint>` occurrence as read from a term file. The identifier is
/// optional at this level; the scan skips and counts records without one.
#[derive(Debug, Default)]
pub struct RawEprint {
    pub id: Option<String>,
    pub meta: RecordMeta,
}

/// Parse one term file into its eprint records.
pub fn parse_term_file(path: &Path) -> Result<Vec<RawEprint>, ExtractError> {
    let xml = std::fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_records(&xml).map_err(|failure| match failure {
        ParseFailure::Xml(source) => ExtractError::Parse {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::Namespace(found) => ExtractError::Namespace {
            path: path.to_path_buf(),
            expected: EPRINTS_XMLNS.to_string(),
            found,
        },
    })
}

#[derive(Debug)]
enum ParseFailure {
    Xml(quick_xml::Error),
    Namespace(String),
}

impl From<quick_xml::Error> for ParseFailure {
    fn from(e: quick_xml::Error) -> Self {
        ParseFailure::Xml(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Abstract,
    Date,
    Funder,
}

/// Map an element path (local names, relative to `<eprint>`) to the field
/// it populates. The funder descends through the nested rioxx2 project
/// structure; only the first matching hit per record is kept.
fn field_for_path(path: &[String]) -> Option<Field> {
    match path {
        [a] if a == "id_number" => Some(Field::Id),
        [a] if a == "title" => Some(Field::Title),
        [a] if a == "abstract" => Some(Field::Abstract),
        [a] if a == "date" => Some(Field::Date),
        [a, b, c] if a == "rioxx2_project_input" && b == "item" && c == "funder_name" => {
            Some(Field::Funder)
        }
        _ => None,
    }
}

fn slot<'a>(rec: &'a mut RawEprint, field: Field) -> &'a mut Option<String> {
    match field {
        Field::Id => &mut rec.id,
        Field::Title => &mut rec.meta.title,
        Field::Abstract => &mut rec.meta.abstract_text,
        Field::Date => &mut rec.meta.date,
        Field::Funder => &mut rec.meta.funder,
    }
}

fn parse_records(xml: &str) -> Result<Vec<RawEprint>, ParseFailure> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records: Vec<RawEprint> = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<RawEprint> = None;
    let mut path: Vec<String> = Vec::new();
    // Text buffer for the field element we are currently inside, if its
    // slot has not already been filled by an earlier occurrence.
    let mut capturing: Option<(Field, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 {
                    check_namespace(&e)?;
                } else if depth == 1 {
                    if e.local_name().as_ref() == b"eprint" {
                        current = Some(RawEprint::default());
                    }
                } else if let Some(rec) = current.as_mut() {
                    path.push(local_name_str(&e));
                    if capturing.is_none() {
                        if let Some(field) = field_for_path(&path) {
                            if slot(rec, field).is_none() {
                                capturing = Some((field, String::new()));
                            }
                        }
                    }
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    // A childless root still has to carry the namespace.
                    check_namespace(&e)?;
                    break;
                }
                if depth == 1 && e.local_name().as_ref() == b"eprint" {
                    // Self-closing record: no identifier, caller skips it.
                    records.push(RawEprint::default());
                }
            }
            Event::Text(e) => {
                if let Some((_, buf)) = capturing.as_mut() {
                    buf.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some((_, buf)) = capturing.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 1 {
                    if let Some(rec) = current.take() {
                        records.push(rec);
                    }
                } else if let Some(rec) = current.as_mut() {
                    let finished = matches!(&capturing,
                        Some((field, _)) if field_for_path(&path) == Some(*field));
                    if finished {
                        let (field, buf) = capturing.take().unwrap();
                        let text = buf.trim().to_string();
                        if !text.is_empty() {
                            *slot(rec, field) = Some(text);
                        }
                    }
                    path.pop();
                }
            }
            Event::Eof => {
                if depth != 0 || current.is_some() {
                    let io = std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "document ended with unclosed elements",
                    );
                    return Err(ParseFailure::Xml(quick_xml::Error::from(io)));
                }
                break;
            }
            _ => {}
        }
    }

    Ok(records)
}

fn local_name_str(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

/// The root element must declare the EPrints namespace, either as the
/// default namespace or via any prefix.
fn check_namespace(root: &BytesStart) -> Result<(), ParseFailure> {
    let mut first_declared: Option<String> = None;
    for attr in root.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            let value = attr.unescape_value()?.to_string();
            if value == EPRINTS_XMLNS {
                return Ok(());
            }
            first_declared.get_or_insert(value);
        }
    }
    Err(ParseFailure::Namespace(
        first_declared.unwrap_or_else(|| "(no namespace)".to_string()),
    ))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_RECORD: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<eprints xmlns="http://eprints.org/ep2/data/2.0">
  <eprint>
    <id_number>10.1000/abc.123</id_number>
    <title>Simulating protein folding</title>
    <abstract>We present a simulation study.</abstract>
    <date>03/04/2015</date>
    <rioxx2_project_input>
      <item>
        <funder_name>EPSRC (Engineering and Physical Sciences Research Council)</funder_name>
      </item>
      <item>
        <funder_name>Medical Research Council</funder_name>
      </item>
    </rioxx2_project_input>
  </eprint>
</eprints>"#;

    #[test]
    fn extracts_all_fields() {
        let records = parse_records(ONE_RECORD).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id.as_deref(), Some("10.1000/abc.123"));
        assert_eq!(r.meta.title.as_deref(), Some("Simulating protein folding"));
        assert_eq!(
            r.meta.abstract_text.as_deref(),
            Some("We present a simulation study.")
        );
        assert_eq!(r.meta.date.as_deref(), Some("03/04/2015"));
    }

    #[test]
    fn only_first_funder_is_taken() {
        let records = parse_records(ONE_RECORD).unwrap();
        assert_eq!(
            records[0].meta.funder.as_deref(),
            Some("EPSRC (Engineering and Physical Sciences Research Council)")
        );
    }

    #[test]
    fn record_without_identifier_has_none() {
        let xml = r#"<eprints xmlns="http://eprints.org/ep2/data/2.0">
  <eprint><title>No id here</title></eprint>
  <eprint><id_number>ok-1</id_number></eprint>
</eprints>"#;
        let records = parse_records(xml).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].id.is_none());
        assert_eq!(records[0].meta.title.as_deref(), Some("No id here"));
        assert_eq!(records[1].id.as_deref(), Some("ok-1"));
    }

    #[test]
    fn missing_fields_stay_unset() {
        let xml = r#"<eprints xmlns="http://eprints.org/ep2/data/2.0">
  <eprint><id_number>sparse</id_number><date>2012</date></eprint>
</eprints>"#;
        let records = parse_records(xml).unwrap();
        let r = &records[0];
        assert!(r.meta.title.is_none());
        assert!(r.meta.abstract_text.is_none());
        assert!(r.meta.funder.is_none());
        assert_eq!(r.meta.date.as_deref(), Some("2012"));
    }

    #[test]
    fn prefixed_namespace_is_accepted() {
        let xml = r#"<ep:eprints xmlns:ep="http://eprints.org/ep2/data/2.0">
  <ep:eprint><ep:id_number>pfx-1</ep:id_number><ep:title>Prefixed</ep:title></ep:eprint>
</ep:eprints>"#;
        let records = parse_records(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_deref(), Some("pfx-1"));
        assert_eq!(records[0].meta.title.as_deref(), Some("Prefixed"));
    }

    #[test]
    fn wrong_namespace_is_rejected() {
        let xml = r#"<eprints xmlns="http://example.org/other">
  <eprint><id_number>x</id_number></eprint>
</eprints>"#;
        match parse_records(xml) {
            Err(ParseFailure::Namespace(found)) => {
                assert_eq!(found, "http://example.org/other");
            }
            other => panic!("expected namespace failure, got {other:?}"),
        }
    }

    #[test]
    fn malformed_xml_is_a_parse_failure() {
        let xml = r#"<eprints xmlns="http://eprints.org/ep2/data/2.0"><eprint>"#;
        assert!(matches!(parse_records(xml), Err(ParseFailure::Xml(_))));
    }

    #[test]
    fn funder_outside_project_path_is_ignored() {
        let xml = r#"<eprints xmlns="http://eprints.org/ep2/data/2.0">
  <eprint>
    <id_number>deep</id_number>
    <funder_name>Not at the right depth</funder_name>
  </eprint>
</eprints>"#;
        let records = parse_records(xml).unwrap();
        assert!(records[0].meta.funder.is_none());
    }
}
