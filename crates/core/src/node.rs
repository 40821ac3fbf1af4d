//! Node resource model.
//!
//! A [`Node`] is a snapshot of one cluster member's resource record as held
//! by the node registry. Annotation and label maps are optional: a node that
//! has never been written to carries `None`, which reads exactly like an
//! empty map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String-to-string metadata map used for annotations and labels.
pub type Metadata = BTreeMap<String, String>;

/// Snapshot of a node resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node name; also the notification key.
    pub name: String,
    /// Optimistic-concurrency token assigned by the registry.
    #[serde(default)]
    pub resource_version: u64,
    /// Annotations, `None` until first written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Metadata>,
    /// Labels, `None` until first written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Metadata>,
}

impl Node {
    /// Create a node with no metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the resource version.
    #[must_use]
    pub const fn with_resource_version(mut self, version: u64) -> Self {
        self.resource_version = version;
        self
    }

    /// Add an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations_mut().insert(key.into(), value.into());
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels_mut().insert(key.into(), value.into());
        self
    }

    /// Look up an annotation.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        lookup(self.annotations.as_ref(), key)
    }

    /// Look up a label.
    pub fn label(&self, key: &str) -> Option<&str> {
        lookup(self.labels.as_ref(), key)
    }

    /// Annotation value, with a missing key or map reading as `""`.
    pub fn annotation_value(&self, key: &str) -> &str {
        self.annotation(key).unwrap_or_default()
    }

    /// Label value, with a missing key or map reading as `""`.
    pub fn label_value(&self, key: &str) -> &str {
        self.label(key).unwrap_or_default()
    }

    /// Annotations for mutation, allocating an empty map if unset.
    pub fn annotations_mut(&mut self) -> &mut Metadata {
        self.annotations.get_or_insert_with(Metadata::new)
    }

    /// Labels for mutation, allocating an empty map if unset.
    pub fn labels_mut(&mut self) -> &mut Metadata {
        self.labels.get_or_insert_with(Metadata::new)
    }
}

fn lookup<'a>(map: Option<&'a Metadata>, key: &str) -> Option<&'a str> {
    map.and_then(|m| m.get(key)).map(String::as_str)
}
