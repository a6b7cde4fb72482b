//! Intent interceptor.
//!
//! Turns raw activations of host send controls into at most one
//! [`SendPayload`] per gesture. The native action is always suppressed for an
//! activation on an attached control, even when extraction fails afterwards.

pub mod event;
pub mod rules;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{ComposeKind, ControlHandle, ControlId, ControlRole, HostSessionRef, SendPayload};
use crate::ports::ElementLocator;

pub use event::{Disposition, Gesture, Interception, Key, Modifiers, UiEvent};
pub use rules::{normalize_recipients, LookupRules};

/// Result of one `scan()` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub attached: usize,
    pub dropped: usize,
}

pub struct Interceptor<L> {
    locator: L,
    /// Per-control marker set.
    attached: BTreeMap<ControlId, ControlRole>,
    last_emitted: HashMap<HostSessionRef, DateTime<Utc>>,
    dedup_window: chrono::Duration,
}

impl<L: ElementLocator> Interceptor<L> {
    pub fn new(locator: L, dedup_window: std::time::Duration) -> Self {
        Self {
            locator,
            attached: BTreeMap::new(),
            last_emitted: HashMap::new(),
            dedup_window: chrono::Duration::from_std(dedup_window)
                .unwrap_or(chrono::Duration::zero()),
        }
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    pub fn is_attached(&self, control: &ControlId) -> bool {
        self.attached.contains_key(control)
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    /// Mark `control` as intercepted. Returns false if it already was.
    pub fn attach(&mut self, control: &ControlHandle) -> bool {
        if self.attached.contains_key(&control.id) {
            return false;
        }
        debug!(control = %control.id, role = ?control.role, "attached send control");
        self.attached.insert(control.id.clone(), control.role);
        true
    }

    /// Re-discover controls after a host mutation.
    ///
    /// New controls get attached; markers of vanished controls are dropped.
    pub fn scan(&mut self) -> ScanReport {
        let present = self.locator.send_controls();

        let mut report = ScanReport::default();
        for control in &present {
            if self.attach(control) {
                report.attached += 1;
            }
        }

        let before = self.attached.len();
        self.attached
            .retain(|id, _| present.iter().any(|control| &control.id == id));
        report.dropped = before - self.attached.len();

        if report.attached > 0 || report.dropped > 0 {
            debug!(
                attached = report.attached,
                dropped = report.dropped,
                total = self.attached.len(),
                "scan updated control markers"
            );
        }
        report
    }

    pub fn handle(&mut self, event: &UiEvent) -> Interception {
        let Some(role) = self.attached.get(&event.control).copied() else {
            return Interception::pass_through();
        };
        if !event.gesture.activates(role) {
            return Interception::pass_through();
        }

        let control = ControlHandle {
            id: event.control.clone(),
            role,
        };
        let fields = match self.locator.compose_fields(&control) {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                warn!(control = %event.control, "send activation outside a compose surface");
                return Interception::suppressed(None);
            }
            Err(err) => {
                warn!(control = %event.control, error = %err, "could not read compose fields");
                return Interception::suppressed(None);
            }
        };

        let window = self.dedup_window;
        self.last_emitted.retain(|_, last| event.at - *last < window);
        if let Some(last) = self.last_emitted.get(&fields.host_session_ref) {
            let since = event.at - *last;
            if since >= chrono::Duration::zero() && since < self.dedup_window {
                debug!(
                    session = %fields.host_session_ref,
                    since_ms = since.num_milliseconds(),
                    "repeat activation swallowed"
                );
                return Interception::suppressed(None);
            }
        }

        let kind = ComposeKind::detect(&fields.subject, fields.label.as_deref());
        let payload = SendPayload::new(
            normalize_recipients(&fields.recipients),
            fields.subject,
            &fields.body,
            fields.host_session_ref,
        )
        .with_kind(kind);

        self.last_emitted
            .insert(payload.host_session_ref.clone(), event.at);
        info!(
            session = %payload.host_session_ref,
            recipients = payload.recipients.len(),
            "send requested"
        );
        Interception::suppressed(Some(payload))
    }

    /// Forget dedup history for a session (after cancel/edit the same
    /// compose surface may legitimately send again right away).
    pub fn reset_session(&mut self, session: &HostSessionRef) {
        self.last_emitted.remove(session);
    }
}
