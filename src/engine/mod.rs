//! The tag/image association engine.
//!
//! Each operation here is a single atomic transition against the store:
//! it either commits every listed mutation or none of them. Connections
//! are passed in by the caller (one per request); mutating operations
//! open an explicit transaction that rolls back on any error path.

pub mod assoc;
pub mod delete;
pub mod merge;
pub mod registry;

use serde::Serialize;

/// A tag as stored, in its owning language.
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub lang: String,
    pub name: String,
    pub description: Option<String>,
    pub used: i64,
}

/// A tag as presented to a viewer in a particular language:
/// name/description resolved through the per-language override.
#[derive(Debug, Clone, Serialize)]
pub struct TagView {
    pub id: i64,
    pub name: String,
    pub used: i64,
    #[serde(flatten)]
    pub extended: Option<TagViewExtended>,
}

/// The extra fields of an extended tag listing: the localized
/// description plus the un-overridden originals and the owning language.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagViewExtended {
    pub lang: String,
    pub description: Option<String>,
    pub original_name: String,
    pub original_description: Option<String>,
}

/// Details for a single tag: description, usage count and a few
/// example images carrying it.
#[derive(Debug, Clone, Serialize)]
pub struct TagInfo {
    pub description: Option<String>,
    pub used: i64,
    pub images: Vec<String>,
}

/// Result of updating a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// No fields were supplied; the store was not touched.
    NoChanges,
}

/// Result of merging several tags into one.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub kept: i64,
    pub removed: Vec<i64>,
}

/// "?, ?, ?" placeholder list for an `IN (...)` clause.
fn repeat_vars(count: usize) -> String {
    let mut s = "?,".repeat(count);
    s.pop();
    s
}
