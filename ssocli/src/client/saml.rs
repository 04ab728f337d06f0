//! SAML assertion decoding.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use roxmltree::Document;
use tracing::{debug, warn};

use super::error::{SsoError, SsoResult};
use crate::common::RoleArns;

const SAML_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
const AWS_ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";

/// Extract the role and principal ARNs from a base64 encoded SAML response.
///
/// Only the first value of the first AWS role attribute is used; further values are
/// ignored (and logged) when the directory grants more than one role.
pub fn decode(assertion: &str) -> SsoResult<RoleArns> {
    if assertion.is_empty() {
        return Err(SsoError::EmptyAssertion);
    }

    let compact: String = assertion
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let raw = B64
        .decode(compact.as_bytes())
        .map_err(|e| SsoError::malformed_assertion(format!("invalid base64: {}", e)))?;
    let xml = String::from_utf8(raw)
        .map_err(|e| SsoError::malformed_assertion(format!("assertion is not UTF-8: {}", e)))?;

    let doc = Document::parse(&xml)
        .map_err(|e| SsoError::malformed_assertion(format!("invalid XML: {}", e)))?;

    let values = role_attribute_values(&doc);
    if values.len() > 1 {
        warn!(
            "Assertion grants {} roles, using the first one",
            values.len()
        );
    }

    let first = values.first().ok_or_else(|| {
        SsoError::malformed_assertion(format!("no {} attribute value", AWS_ROLE_ATTRIBUTE))
    })?;
    let (role_arn, principal_arn) = first.split_once(',').ok_or_else(|| {
        SsoError::malformed_assertion("role attribute value is not a role,principal pair")
    })?;

    debug!("Role ARN: {}, principal ARN: {}", role_arn, principal_arn);
    Ok(RoleArns {
        role_arn: role_arn.to_string(),
        principal_arn: principal_arn.to_string(),
    })
}

/// Values of the first AWS role attribute, in document order
fn role_attribute_values(doc: &Document<'_>) -> Vec<String> {
    let Some(attribute) = doc.descendants().find(|n| {
        is_saml_element(n, "Attribute") && n.attribute("Name") == Some(AWS_ROLE_ATTRIBUTE)
    }) else {
        return Vec::new();
    };

    attribute
        .descendants()
        .filter(|n| is_saml_element(n, "AttributeValue"))
        .map(|n| n.text().unwrap_or_default().trim().to_string())
        .collect()
}

fn is_saml_element(node: &roxmltree::Node<'_, '_>, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(SAML_ASSERTION_NS)
}
