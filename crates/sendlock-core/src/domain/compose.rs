//! Host UI handles as seen by the interceptor.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::refs::HostSessionRef;

/// Stable identity of a control inside the host page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(String);

impl ControlId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlRole {
    /// The composer's own send button.
    SendButton,
    /// The compose body / dialog; only the send shortcut counts here.
    ComposeSurface,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlHandle {
    pub id: ControlId,
    pub role: ControlRole,
}

impl ControlHandle {
    pub fn send_button(id: impl Into<String>) -> Self {
        Self {
            id: ControlId::new(id),
            role: ControlRole::SendButton,
        }
    }

    pub fn compose_surface(id: impl Into<String>) -> Self {
        Self {
            id: ControlId::new(id),
            role: ControlRole::ComposeSurface,
        }
    }
}

/// Raw field values read from a compose surface.
///
/// `recipients` is unnormalized text as it appears in the page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComposeFields {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub host_session_ref: HostSessionRef,
    /// Dialog label (e.g. "Reply", "Forward"), if the host exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}
