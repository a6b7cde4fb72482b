//! Send intent payload and presentation metadata.

use serde::{Deserialize, Serialize};

use super::refs::HostSessionRef;

/// Upper bound on the body fragment carried with an intent.
pub const CONTENT_SUMMARY_MAX_CHARS: usize = 200;

/// Normalized "send requested" payload emitted by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPayload {
    pub recipients: Vec<String>,
    pub subject: String,
    pub content_summary: String,
    pub host_session_ref: HostSessionRef,
    #[serde(default)]
    pub kind: ComposeKind,
}

impl SendPayload {
    pub fn new(
        recipients: Vec<String>,
        subject: impl Into<String>,
        content: &str,
        host_session_ref: HostSessionRef,
    ) -> Self {
        let subject = subject.into().trim().to_string();
        Self {
            kind: ComposeKind::detect(&subject, None),
            recipients,
            subject,
            content_summary: summarize(content),
            host_session_ref,
        }
    }

    /// Override the subject-derived kind (the host knows better).
    pub fn with_kind(mut self, kind: ComposeKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Collapse whitespace and cut at `CONTENT_SUMMARY_MAX_CHARS`.
pub fn summarize(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= CONTENT_SUMMARY_MAX_CHARS {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(CONTENT_SUMMARY_MAX_CHARS).collect();
    cut.push('…');
    cut
}

/// What kind of compose surface produced the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeKind {
    #[default]
    New,
    Reply,
    Forward,
}

impl ComposeKind {
    /// Detect from the dialog label (if any) and the subject prefix.
    pub fn detect(subject: &str, label: Option<&str>) -> Self {
        let label = label.unwrap_or_default();
        let subject = subject.trim_start();
        if label.contains("Forward") || starts_with_ignore_case(subject, "fwd:") {
            ComposeKind::Forward
        } else if label.contains("Reply") || starts_with_ignore_case(subject, "re:") {
            ComposeKind::Reply
        } else {
            ComposeKind::New
        }
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Recipient/subject summary for the countdown UI.
///
/// Never consulted for scheduling decisions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayMeta {
    pub recipients: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub kind: ComposeKind,
}

impl DisplayMeta {
    pub fn from_payload(payload: &SendPayload) -> Self {
        Self {
            recipients: payload.recipients.clone(),
            subject: payload.subject.clone(),
            kind: payload.kind,
        }
    }

    /// One-line summary, e.g. `to a@x.com +1: Quarterly report`.
    pub fn headline(&self) -> String {
        let to = match self.recipients.as_slice() {
            [] => "no recipients".to_string(),
            [only] => format!("to {only}"),
            [first, rest @ ..] => format!("to {first} +{}", rest.len()),
        };
        let subject = if self.subject.is_empty() {
            "(no subject)"
        } else {
            self.subject.as_str()
        };
        format!("{to}: {subject}")
    }
}
