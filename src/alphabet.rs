//! Sign alphabet and the actions committed labels map to
//!
//! The classifier emits one of 28 labels: the letters A-Z plus two
//! control signs. Every label maps to exactly one `Action` through a
//! static table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One symbol of the sign alphabet
///
/// Build labels through `Label::letter` or `FromStr`. Both normalize to
/// uppercase and reject anything outside A-Z; the variant itself does not
/// check, so code constructing `Letter` directly must pass uppercase ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// A letter sign, uppercase ASCII
    Letter(char),
    /// Control sign that clears the output text
    Clear,
    /// Control sign that submits the output text as a search
    Search,
}

impl Label {
    /// Build a letter label, rejecting anything outside A-Z
    pub fn letter(c: char) -> Option<Self> {
        let upper = c.to_ascii_uppercase();
        upper.is_ascii_uppercase().then_some(Label::Letter(upper))
    }

    /// The action this label commits to
    pub fn action(&self) -> Action {
        match *self {
            Label::Letter(c) => Action::AppendLetter(c),
            Label::Clear => Action::ClearOutput,
            Label::Search => Action::TriggerSearch,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Letter(c) => write!(f, "{}", c),
            Label::Clear => write!(f, "CLEAR"),
            Label::Search => write!(f, "SEARCH"),
        }
    }
}

/// Returned when a classifier label is not part of the alphabet
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseLabelError {
    #[error("label is empty")]
    Empty,

    #[error("unknown label: {0:?}")]
    Unknown(String),
}

impl FromStr for Label {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseLabelError::Empty);
        }

        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Label::letter(c).ok_or_else(|| ParseLabelError::Unknown(trimmed.to_string()));
        }

        match trimmed.to_ascii_uppercase().as_str() {
            "CLEAR" | "DEL" | "ACTION_CLEAR" => Ok(Label::Clear),
            "SEARCH" | "SPACE" | "ACTION_COMMIT_SEARCH" => Ok(Label::Search),
            _ => Err(ParseLabelError::Unknown(trimmed.to_string())),
        }
    }
}

impl Serialize for Label {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What a committed label does to the output text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "letter", rename_all = "snake_case")]
pub enum Action {
    /// Append a letter to the output
    AppendLetter(char),
    /// Empty the output
    ClearOutput,
    /// Hand the current output to an external search
    TriggerSearch,
}

/// A single per-frame classifier result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: Label,
    /// Always within [0, 1]
    pub confidence: f32,
}

/// Why a raw classifier result could not be used
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    #[error(transparent)]
    Label(#[from] ParseLabelError),

    #[error("confidence is not a finite number: {0}")]
    Confidence(f32),
}

impl Classification {
    pub fn new(label: Label, confidence: f32) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Validate a raw `(label, confidence)` pair coming from the classifier
    pub fn parse(label: &str, confidence: f32) -> Result<Self, ClassificationError> {
        let label = label.parse::<Label>()?;
        if !confidence.is_finite() {
            return Err(ClassificationError::Confidence(confidence));
        }
        Ok(Self::new(label, confidence))
    }
}
