//! Loading canaries from YAML manifests
//!
//! Manifests may hold several `---` separated documents of any kind; only
//! `flagger.app` Canary documents are decoded, the rest are skipped. Each
//! document goes through `serde_json::Value` first so the kind can be
//! checked before the typed decode.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::crd::{Canary, CANARY_GROUP, CANARY_KIND};
use crate::{Error, Result};

/// Parse every document of a multi-document YAML string.
///
/// Empty documents are dropped.
pub fn parse_documents(input: &str) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(input) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            docs.push(value);
        }
    }
    Ok(docs)
}

/// True if the document is a Canary of the `flagger.app` group
pub fn is_canary(doc: &Value) -> bool {
    let kind = doc.get("kind").and_then(Value::as_str);
    let group = doc
        .get("apiVersion")
        .and_then(Value::as_str)
        .and_then(|v| v.split_once('/'))
        .map(|(group, _)| group);
    kind == Some(CANARY_KIND) && group == Some(CANARY_GROUP)
}

/// Load every Canary in a manifest, in document order
pub fn load_canaries(input: &str) -> Result<Vec<Canary>> {
    let mut canaries = Vec::new();
    for (index, doc) in parse_documents(input)?.into_iter().enumerate() {
        if !is_canary(&doc) {
            let kind = doc
                .get("kind")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<none>");
            debug!(index, kind, "skipping non-canary document");
            continue;
        }
        let canary: Canary = serde_json::from_value(doc).map_err(|e| {
            Error::serialization_for_kind(CANARY_KIND, format!("document {index}: {e}"))
        })?;
        canaries.push(canary);
    }
    Ok(canaries)
}

/// Load a manifest that must contain exactly one Canary
pub fn load_canary(input: &str) -> Result<Canary> {
    let mut canaries = load_canaries(input)?;
    match canaries.len() {
        1 => Ok(canaries.remove(0)),
        n => Err(Error::validation(format!(
            "expected exactly one Canary in manifest, found {n}"
        ))),
    }
}

/// Serialize canaries back into a multi-document YAML string
pub fn to_yaml(canaries: &[Canary]) -> Result<String> {
    let docs = canaries
        .iter()
        .map(serde_yaml::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(docs.join("---\n"))
}
