//! Snapshot tags.

use std::collections::BTreeMap;

pub const TYPE_TAG: &str = "type";
pub const OID_TAG: &str = "oid";
pub const TYPE_BASE: &str = "base";
pub const TYPE_TABLESPACE: &str = "tablespace";

/// Key/value tags attached to a snapshot. Keys are kept sorted so the
/// rendered argument is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotTags(BTreeMap<String, String>);

impl SnapshotTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags of the data directory snapshot.
    pub fn base() -> Self {
        Self::new().with(TYPE_TAG, TYPE_BASE)
    }

    /// Tags of a tablespace snapshot.
    pub fn tablespace(oid: &str) -> Self {
        Self::new().with(TYPE_TAG, TYPE_TABLESPACE).with(OID_TAG, oid)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders `k1:v1,k2:v2`, or `None` when there are no tags.
    pub fn to_argument(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let joined = self
            .0
            .iter()
            .map(|(key, value)| format!("{key}:{value}"))
            .collect::<Vec<_>>()
            .join(",");
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_is_sorted_by_key() {
        let tags = SnapshotTags::new().with("type", "tablespace").with("oid", "16384");
        assert_eq!(tags.to_argument().as_deref(), Some("oid:16384,type:tablespace"));
        assert_eq!(tags, SnapshotTags::tablespace("16384"));
    }

    #[test]
    fn test_empty_tags_render_nothing() {
        assert!(SnapshotTags::new().to_argument().is_none());
        assert_eq!(SnapshotTags::base().to_argument().as_deref(), Some("type:base"));
    }

    #[test]
    fn test_duplicate_key_keeps_last_value() {
        let tags = SnapshotTags::new().with("type", "base").with("type", "tablespace");
        assert_eq!(tags.get("type"), Some("tablespace"));
    }
}
