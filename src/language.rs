use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    De,
    En,
    Fr,
    It,
}

// keyword hints per language, matched as lowercase substrings
const HINTS: [(Language, &[&str]); 4] = [
    (
        Language::Fr,
        &["bonjour", "merci", "je", "nous", "vous", "besoin", "réducteur", "engrenage"],
    ),
    (
        Language::It,
        &["buongiorno", "grazie", "ho bisogno", "riduttore", "ingranaggio", "vorrei"],
    ),
    (
        Language::En,
        &["hello", "hi", "need", "gearbox", "looking for", "would like", "please"],
    ),
    (
        Language::De,
        &["hallo", "guten tag", "getriebe", "brauche", "suche", "möchte", "bitte"],
    ),
];

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::De => "de",
            Self::En => "en",
            Self::Fr => "fr",
            Self::It => "it",
        }
    }

    // Unknown or missing codes fall back to German
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(|c| c.trim().to_ascii_lowercase()).as_deref() {
            Some("en") => Self::En,
            Some("fr") => Self::Fr,
            Some("it") => Self::It,
            _ => Self::De,
        }
    }

    // Best guess from keyword hits; ties go to the later language in
    // fr, it, en, de order, and no hits at all means German.
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut best = (Self::De, 0usize);
        for (lang, words) in HINTS {
            let hits = words.iter().filter(|w| lower.contains(*w)).count();
            if hits >= best.1 {
                best = (lang, hits);
            }
        }
        if best.1 == 0 { Self::De } else { best.0 }
    }

    // Language of the first user message in a conversation
    pub fn of_conversation(messages: &[ChatMessage]) -> Self {
        messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| Self::detect(&m.content))
            .unwrap_or_default()
    }
}
