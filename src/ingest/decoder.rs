//! XML batch decoder.
//!
//! Turns a `<Site>` document into a [`SiteBatch`]. Only structural problems
//! are fatal here; per-probe content is passed through for validation.

use std::collections::BTreeMap;

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// A single measurement value as it appeared in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Number(value),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

/// One `<Probe>` element, positionally indexed within its batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeEntry {
    pub index: usize,
    pub address: Option<String>,
    pub timestamp: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

/// A decoded batch document.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteBatch {
    pub customer_id: String,
    pub site_id: String,
    pub server_id: Option<String>,
    pub distributor_id: Option<String>,
    pub entries: Vec<ProbeEntry>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("payload is not well-formed XML: {0}")]
    Malformed(#[from] roxmltree::Error),
    #[error("document has no <Site> element")]
    MissingSite,
    #[error("site is missing required element <{0}>")]
    MissingSiteField(&'static str),
}

/// Decode a raw payload into a [`SiteBatch`].
pub fn decode(payload: &[u8]) -> Result<SiteBatch, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    // DTDs are rejected by roxmltree's default options.
    let document = Document::parse(text)?;

    let site = document
        .root_element()
        .descendants()
        .find(|node| node.has_tag_name("Site"))
        .ok_or(DecodeError::MissingSite)?;

    let customer_id = required_child(site, "CustomerID")?;
    let site_id = required_child(site, "SiteID")?;

    let entries = site
        .descendants()
        .filter(|node| node.has_tag_name("Probe"))
        .enumerate()
        .map(|(index, node)| decode_probe(index, node))
        .collect();

    Ok(SiteBatch {
        customer_id,
        site_id,
        server_id: child_text(site, "ServerID").filter(|v| !v.is_empty()),
        distributor_id: child_text(site, "DistributorID").filter(|v| !v.is_empty()),
        entries,
    })
}

fn required_child(node: Node<'_, '_>, name: &'static str) -> Result<String, DecodeError> {
    child_text(node, name)
        .filter(|value| !value.is_empty())
        .ok_or(DecodeError::MissingSiteField(name))
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(name))
        .map(|child| child.text().unwrap_or_default().trim().to_string())
}

fn decode_probe(index: usize, node: Node<'_, '_>) -> ProbeEntry {
    let mut entry = ProbeEntry {
        index,
        address: None,
        timestamp: None,
        fields: BTreeMap::new(),
    };

    for child in node.children().filter(Node::is_element) {
        let name = child.tag_name().name();
        match name {
            "Address" => entry.address = Some(child.text().unwrap_or_default().trim().to_string()),
            "DateTime" => {
                entry.timestamp = Some(child.text().unwrap_or_default().trim().to_string())
            }
            _ if child.children().any(|c| c.is_element()) => {
                // Containers such as <Temperatures> flatten to temperature_1..N.
                for (position, item) in child.children().filter(Node::is_element).enumerate() {
                    let key = format!("{}_{}", to_snake_case(item.tag_name().name()), position + 1);
                    entry
                        .fields
                        .insert(key, FieldValue::parse(item.text().unwrap_or_default()));
                }
            }
            _ => {
                entry.fields.insert(
                    to_snake_case(name),
                    FieldValue::parse(child.text().unwrap_or_default()),
                );
            }
        }
    }

    entry
}

/// `ProbeStatus` -> `probe_status`, `CustomerID` -> `customer_id`.
pub(crate) fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Site>
  <CustomerID>C1</CustomerID>
  <SiteID>S1</SiteID>
  <ServerID>SRV-9</ServerID>
  <Probes>
    <Probe>
      <Address>068745</Address>
      <DateTime>2025-03-28 15:30:00</DateTime>
      <Product>840.5</Product>
      <Discriminator>D</Discriminator>
      <Temperatures>
        <Temperature>12.5</Temperature>
        <Temperature>12.7</Temperature>
      </Temperatures>
    </Probe>
    <Probe>
      <Address>068746</Address>
      <DateTime></DateTime>
      <Product>12</Product>
    </Probe>
  </Probes>
</Site>"#;

    #[test]
    fn decodes_site_and_probes_in_document_order() {
        let batch = decode(SAMPLE.as_bytes()).unwrap();

        assert_eq!(batch.customer_id, "C1");
        assert_eq!(batch.site_id, "S1");
        assert_eq!(batch.server_id.as_deref(), Some("SRV-9"));
        assert_eq!(batch.distributor_id, None);
        assert_eq!(batch.entries.len(), 2);

        let first = &batch.entries[0];
        assert_eq!(first.index, 0);
        assert_eq!(first.address.as_deref(), Some("068745"));
        assert_eq!(first.timestamp.as_deref(), Some("2025-03-28 15:30:00"));
        assert_eq!(first.fields["product"], FieldValue::Number(840.5));
        assert_eq!(first.fields["discriminator"], FieldValue::Text("D".into()));
        assert_eq!(first.fields["temperature_1"], FieldValue::Number(12.5));
        assert_eq!(first.fields["temperature_2"], FieldValue::Number(12.7));

        let second = &batch.entries[1];
        assert_eq!(second.index, 1);
        assert_eq!(second.timestamp.as_deref(), Some(""));
    }

    #[test]
    fn empty_probe_list_is_a_valid_batch() {
        let batch =
            decode(b"<Site><CustomerID>C1</CustomerID><SiteID>S1</SiteID><Probes/></Site>").unwrap();
        assert!(batch.entries.is_empty());
    }

    #[test]
    fn malformed_xml_is_rejected() {
        let err = decode(b"<Site><CustomerID>C1</Site>").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));

        let err = decode(b"").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn missing_site_identifiers_are_rejected() {
        let err = decode(b"<Site><SiteID>S1</SiteID></Site>").unwrap_err();
        assert!(matches!(err, DecodeError::MissingSiteField("CustomerID")));

        let err = decode(b"<Site><CustomerID>C1</CustomerID><SiteID> </SiteID></Site>").unwrap_err();
        assert!(matches!(err, DecodeError::MissingSiteField("SiteID")));

        let err = decode(b"<Probes/>").unwrap_err();
        assert!(matches!(err, DecodeError::MissingSite));
    }

    #[test]
    fn doctype_declarations_are_refused() {
        let payload = br#"<!DOCTYPE Site [<!ENTITY x "boom">]><Site><CustomerID>&x;</CustomerID><SiteID>S</SiteID></Site>"#;
        assert!(matches!(decode(payload), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn non_finite_numbers_stay_text() {
        let entry = decode_probe(
            0,
            Document::parse("<Probe><Water>NaN</Water></Probe>")
                .unwrap()
                .root_element(),
        );
        assert_eq!(entry.fields["water"], FieldValue::Text("NaN".into()));
    }

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("ProbeStatus"), "probe_status");
        assert_eq!(to_snake_case("CustomerID"), "customer_id");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("Temp2Value"), "temp2_value");
        assert_eq!(to_snake_case("product"), "product");
    }
}
