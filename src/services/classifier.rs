//! System-message classification.
//!
//! Messaging clients interleave administrative notices (group renames,
//! member changes, encryption banners) with user text. Those are never
//! expenses and are filtered before fingerprinting.

use once_cell::sync::Lazy;
use regex::{RegexSet, RegexSetBuilder};

/// Administrative notice fragments emitted by the messaging client (Spanish
/// locale).
pub const DEFAULT_SYSTEM_PATTERNS: &[&str] = &[
    "cambiaste la imagen de este grupo",
    "cambió la imagen de este grupo",
    "cambió el nombre del grupo",
    "cambiaste el nombre del grupo",
    "se agregó al grupo",
    "salió del grupo",
    "eliminó este mensaje",
    "no hay contactos",
    "miembro ·",
    "miembros ·",
    "admin del grupo",
    "creó este grupo",
    "mensaje eliminado",
    "cifrado de extremo a extremo",
    "los mensajes y las llamadas",
];

static DEFAULT_SET: Lazy<Option<RegexSet>> = Lazy::new(|| build_set(DEFAULT_SYSTEM_PATTERNS));

fn build_set<S: AsRef<str>>(fragments: &[S]) -> Option<RegexSet> {
    let escaped = fragments.iter().map(|f| regex::escape(f.as_ref()));
    match RegexSetBuilder::new(escaped).case_insensitive(true).build() {
        Ok(set) => Some(set),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build system message pattern set");
            None
        },
    }
}

/// Decides whether a message is an administrative notice.
///
/// Implementations must be pure and cheap; the coordinator calls this for
/// every incoming message.
pub trait SystemMessageClassifier: Send + Sync {
    /// Returns true if `text` is a system notice.
    fn is_system_message(&self, text: &str) -> bool;
}

/// Substring classifier over a fixed set of notice fragments.
///
/// Matching is case-insensitive and ignores surrounding whitespace.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    set: Option<RegexSet>,
}

impl PatternClassifier {
    /// Creates a classifier over custom fragments.
    ///
    /// Fragments are matched literally.
    #[must_use]
    pub fn with_patterns<S: AsRef<str>>(fragments: &[S]) -> Self {
        Self {
            set: build_set(fragments),
        }
    }

    /// Number of fragments in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.as_ref().map_or(0, RegexSet::len)
    }

    /// Returns true if the set has no fragments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self {
            set: DEFAULT_SET.clone(),
        }
    }
}

impl SystemMessageClassifier for PatternClassifier {
    fn is_system_message(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.set.as_ref().is_some_and(|set| set.is_match(text))
    }
}
