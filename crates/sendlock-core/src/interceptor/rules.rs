//! Declarative lookup rules for host compose surfaces.
//!
//! Locator implementations walk each list in order and take the first hit.
//! Keeping the lists as data lets a host redesign be patched from config.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupRules {
    pub send_button: Vec<String>,
    pub compose_window: Vec<String>,
    pub recipient_input: Vec<String>,
    pub subject_input: Vec<String>,
    pub body: Vec<String>,
}

impl LookupRules {
    /// Selectors for the Gmail web composer.
    pub fn gmail() -> Self {
        Self {
            send_button: strings(&[
                "[aria-label=\"Send\"]",
                "[data-tooltip=\"Send\"]",
                "div[role=\"button\"][aria-label*=\"Send\"]",
                "button[aria-label*=\"Send\"]",
                "div[role=\"button\"][data-tooltip^=\"Send\"]",
            ]),
            compose_window: strings(&[
                "div[role=\"dialog\"][aria-label*=\"Compose\"]",
                "div[role=\"dialog\"][aria-label*=\"New Message\"]",
                "div[role=\"dialog\"][aria-label*=\"Reply\"]",
                "div[role=\"dialog\"][aria-label*=\"Forward\"]",
                "[role=\"dialog\"]",
                ".AD",
                ".adn",
            ]),
            recipient_input: strings(&[
                "textarea[name=\"to\"]",
                "input[name=\"to\"]",
                "input[aria-label*=\"To\"]",
                "input[aria-label*=\"recipient\"]",
                ".vO input",
            ]),
            subject_input: strings(&[
                "input[name=\"subjectbox\"]",
                "input[name=\"subject\"]",
                "input[aria-label*=\"Subject\"]",
            ]),
            body: strings(&[
                "div[contenteditable=\"true\"][aria-label*=\"Message Body\"]",
                "div[role=\"textbox\"]",
                "[contenteditable=\"true\"]",
            ]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.send_button.is_empty() || self.compose_window.is_empty()
    }
}

impl Default for LookupRules {
    fn default() -> Self {
        Self::gmail()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Normalize raw recipient text into addresses.
///
/// Splits on `,` and `;`, trims, keeps entries that contain `@` and no
/// whitespace, and drops duplicates keeping first-seen order.
pub fn normalize_recipients<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for chunk in raw {
        for addr in chunk.as_ref().split([',', ';']) {
            let addr = addr.trim();
            if addr.is_empty() || !addr.contains('@') || addr.chars().any(char::is_whitespace) {
                continue;
            }
            if !out.iter().any(|seen| seen == addr) {
                out.push(addr.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_are_split_trimmed_and_deduped() {
        let raw = [
            "ann@example.com, bob@example.com",
            "bob@example.com;carol@example.com",
            "not an address",
            "  dave @example.com",
            "",
        ];
        assert_eq!(
            normalize_recipients(&raw),
            vec!["ann@example.com", "bob@example.com", "carol@example.com"]
        );
    }

    #[test]
    fn partial_rules_fall_back_to_gmail_defaults() {
        let rules: LookupRules = toml::from_str(r##"send_button = ["#send"]"##).unwrap();
        assert_eq!(rules.send_button, vec!["#send"]);
        assert_eq!(rules.subject_input, LookupRules::gmail().subject_input);
        assert!(!rules.is_empty());
    }
}
