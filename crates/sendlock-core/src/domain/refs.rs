//! Opaque references handed to us by the host page and the backend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend draft identifier (Gmail `drafts/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftRef(String);

impl DraftRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DraftRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reference to the compose session inside the host UI.
///
/// Opaque to the scheduler. The one convention we read is the `draft:` prefix:
/// when the host integration already knows the saved draft id it encodes it as
/// `draft:<id>`, which lets the scheduler dedupe by draft at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostSessionRef(String);

impl HostSessionRef {
    pub const DRAFT_PREFIX: &'static str = "draft:";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Session ref for a compose surface whose draft id is already known.
    pub fn for_draft(draft: &DraftRef) -> Self {
        Self(format!("{}{}", Self::DRAFT_PREFIX, draft.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn draft_hint(&self) -> Option<DraftRef> {
        self.0
            .strip_prefix(Self::DRAFT_PREFIX)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(DraftRef::new)
    }
}

impl fmt::Display for HostSessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
