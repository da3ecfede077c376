//! Data types exchanged with the forced-alignment capability.
//!
//! [`Alignment`] mirrors the JSON document the aligner prints, field for
//! field in camelCase. Unknown fields are ignored so newer aligner builds
//! keep working.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Filler words the aligner treats as disfluencies when the flag is set.
pub const BUILTIN_DISFLUENCIES: &[&str] = &["uh", "um"];

/// Alignment flags captured once at admission and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignOptions {
    pub disfluency: bool,
    pub conservative: bool,
    pub disfluencies: BTreeSet<String>,
}

impl AlignOptions {
    pub fn new(disfluency: bool, conservative: bool) -> Self {
        Self {
            disfluency,
            conservative,
            disfluencies: BUILTIN_DISFLUENCIES.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self::new(false, false)
    }
}

/// Handle to the aligner's on-disk resources (acoustic model, lexicon).
///
/// Resolved once at startup and shared by every job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resources {
    pub root: PathBuf,
}

impl Resources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Structured result of one alignment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub transcript: String,
    #[serde(default)]
    pub words: Vec<AlignedWord>,
}

/// One transcript token and where (if anywhere) it was found in the audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignedWord {
    pub word: String,
    /// "success", "not-found-in-audio" or "not-found-in-transcript".
    pub case: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aligned_word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default)]
    pub start_offset: usize,
    #[serde(default)]
    pub end_offset: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phones: Vec<Phone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phone {
    pub phone: String,
    pub duration: f64,
}
