//! UI events delivered by the host integration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ControlId, ControlRole, SendPayload};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Enter,
    Space,
    Other(String),
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value.
    pub fn from_dom(key: &str) -> Self {
        match key {
            "Enter" => Key::Enter,
            " " | "Space" | "Spacebar" => Key::Space,
            other => Key::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        meta: false,
        shift: false,
        alt: false,
    };

    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::NONE
        }
    }

    pub fn meta() -> Self {
        Self {
            meta: true,
            ..Self::NONE
        }
    }

    /// Platform send shortcut modifier (Ctrl on Linux/Windows, Cmd on macOS).
    pub fn has_command(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Gesture {
    Pointer,
    Key { key: Key, modifiers: Modifiers },
}

impl Gesture {
    pub fn key(key: Key) -> Self {
        Gesture::Key {
            key,
            modifiers: Modifiers::NONE,
        }
    }

    /// Does this gesture trigger a send on a control with `role`?
    pub fn activates(&self, role: ControlRole) -> bool {
        match (role, self) {
            (ControlRole::SendButton, Gesture::Pointer) => true,
            (ControlRole::SendButton, Gesture::Key { key, .. }) => {
                matches!(key, Key::Enter | Key::Space)
            }
            (ControlRole::ComposeSurface, Gesture::Key { key, modifiers }) => {
                *key == Key::Enter && modifiers.has_command()
            }
            (ControlRole::ComposeSurface, Gesture::Pointer) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiEvent {
    pub control: ControlId,
    pub gesture: Gesture,
    pub at: DateTime<Utc>,
}

impl UiEvent {
    pub fn pointer(control: ControlId, at: DateTime<Utc>) -> Self {
        Self {
            control,
            gesture: Gesture::Pointer,
            at,
        }
    }

    pub fn key(control: ControlId, key: Key, modifiers: Modifiers, at: DateTime<Utc>) -> Self {
        Self {
            control,
            gesture: Gesture::Key { key, modifiers },
            at,
        }
    }
}

/// What the host should do with the native event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Let the host handle it unmodified.
    PassThrough,
    /// preventDefault + stopPropagation.
    Suppress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interception {
    pub disposition: Disposition,
    pub intent: Option<SendPayload>,
}

impl Interception {
    pub fn pass_through() -> Self {
        Self {
            disposition: Disposition::PassThrough,
            intent: None,
        }
    }

    pub fn suppressed(intent: Option<SendPayload>) -> Self {
        Self {
            disposition: Disposition::Suppress,
            intent,
        }
    }
}
