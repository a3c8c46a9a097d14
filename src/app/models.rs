//! Response documents and fetched results
//!
//! The fetch collaborator returns loosely-typed nested data, so documents are
//! kept as a generic JSON value (null, bool, number, string, array, object).
//! Field removal is a key filter applied to the top-level object and to every
//! object directly inside a top-level array (list endpoints wrap their items
//! that way, e.g. `{"aweme_list": [{...}, {...}]}`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::id::CandidateId;
use crate::constants::fetch;

/// Structured response payload
pub type Document = Value;

/// A successfully fetched and cleaned response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub id: CandidateId,
    pub document: Document,
}

impl FetchResult {
    pub fn new(id: CandidateId, document: Document) -> Self {
        Self { id, document }
    }
}

/// Field names that are never stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDenylist {
    fields: HashSet<String>,
}

impl Default for FieldDenylist {
    fn default() -> Self {
        Self::new(fetch::DEFAULT_DENYLIST.iter().copied())
    }
}

impl FieldDenylist {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Remove denylisted keys in place; returns how many were removed
    pub fn strip(&self, document: &mut Document) -> usize {
        if self.fields.is_empty() {
            return 0;
        }

        let Value::Object(map) = document else {
            return 0;
        };

        let before = map.len();
        map.retain(|key, _| !self.fields.contains(key));
        let mut removed = before - map.len();

        for value in map.values_mut() {
            if let Value::Array(items) = value {
                for item in items.iter_mut() {
                    if let Value::Object(inner) = item {
                        let before = inner.len();
                        inner.retain(|key, _| !self.fields.contains(key));
                        removed += before - inner.len();
                    }
                }
            }
        }

        removed
    }

    /// Consume a document and return it cleaned
    pub fn clean(&self, mut document: Document) -> Document {
        self.strip(&mut document);
        document
    }
}
