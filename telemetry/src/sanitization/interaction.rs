//! Suppression of user-interaction spans on secret-bearing elements
//!
//! Interaction instrumentation records clicks and input events together with
//! a description of the target element. Events on password fields, or on
//! elements whose class, name or id suggests token or credential content,
//! must not produce a span at all.

use serde::{Deserialize, Serialize};

/// Fragments that mark an element as carrying secret content
const SECRET_MARKERS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "secret",
    "credential",
    "api-key",
    "apikey",
];

/// Markers too short to match inside words; they must form a whole token
const SECRET_TOKENS: &[&str] = &["ssn"];

/// DOM-like description of an interaction target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionTarget {
    pub tag_name: String,
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub autocomplete: Option<String>,
}

impl InteractionTarget {
    pub fn new(tag_name: &str) -> Self {
        Self {
            tag_name: tag_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_input_type(mut self, input_type: &str) -> Self {
        self.input_type = Some(input_type.to_string());
        self
    }

    pub fn with_class_name(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_autocomplete(mut self, autocomplete: &str) -> Self {
        self.autocomplete = Some(autocomplete.to_string());
        self
    }
}

/// Whether an interaction on `target` must not create a span.
/// No target means nothing to protect.
pub fn should_suppress_interaction(target: Option<&InteractionTarget>) -> bool {
    let Some(target) = target else {
        return false;
    };

    if target
        .input_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("password"))
    {
        return true;
    }

    if target
        .autocomplete
        .as_deref()
        .is_some_and(|a| a.to_ascii_lowercase().contains("password"))
    {
        return true;
    }

    [&target.class_name, &target.name, &target.id]
        .into_iter()
        .flatten()
        .any(|value| contains_secret_marker(value))
}

fn contains_secret_marker(value: &str) -> bool {
    let value = value.to_ascii_lowercase().replace('_', "-");
    SECRET_MARKERS.iter().any(|marker| value.contains(marker))
        || value
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| SECRET_TOKENS.contains(&token))
}
