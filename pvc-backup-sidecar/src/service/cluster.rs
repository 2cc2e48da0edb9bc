//! Decoding of the Kubernetes objects sent by the operator.

use crate::utils::{Result, SidecarError};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
struct KubeObject {
    #[serde(default)]
    kind: Option<String>,
    metadata: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Reads the metadata of a `Cluster` definition.
pub fn decode_cluster(definition: &Value) -> Result<ObjectMeta> {
    decode_object(definition, "Cluster")
}

/// Reads the metadata of a `Backup` definition.
pub fn decode_backup(definition: &Value) -> Result<ObjectMeta> {
    decode_object(definition, "Backup")
}

fn decode_object(definition: &Value, expected_kind: &str) -> Result<ObjectMeta> {
    let object = KubeObject::deserialize(definition)
        .map_err(|e| SidecarError::Decode(format!("{expected_kind} definition: {e}")))?;

    if let Some(kind) = object.kind.as_deref() {
        if kind != expected_kind {
            return Err(SidecarError::Decode(format!(
                "expected a {expected_kind} definition, got {kind}"
            )));
        }
    }
    if object.metadata.name.is_empty() {
        return Err(SidecarError::Decode(format!("{expected_kind} definition has no name")));
    }
    if !is_dns1123_subdomain(&object.metadata.name) {
        return Err(SidecarError::Decode(format!(
            "{expected_kind} name {:?} is not a valid DNS-1123 subdomain",
            object.metadata.name
        )));
    }

    Ok(object.metadata)
}

/// Kubernetes object name rule. Names are joined into paths under the
/// backup root, so this also keeps them to a single path component.
fn is_dns1123_subdomain(name: &str) -> bool {
    const MAX_NAME_LEN: usize = 253;
    const MAX_LABEL_LEN: usize = 63;

    name.len() <= MAX_NAME_LEN
        && name.split('.').all(|label| {
            let bytes = label.as_bytes();
            !bytes.is_empty()
                && bytes.len() <= MAX_LABEL_LEN
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
                && bytes[0] != b'-'
                && bytes[bytes.len() - 1] != b'-'
        })
}
