//! Label extraction: pick the routing label out of noisy recognized text.
//!
//! Recognized lines from the label band contain headers, dates and stray
//! characters alongside the name we want. Names are printed as two words
//! (sometimes followed by a third, e.g. a middle initial), so the rule is:
//!
//! 1. Walk the lines in recognizer order.
//! 2. Take the **first** line that splits into 2 or 3 whitespace tokens.
//! 3. Its first two tokens, joined by one space, are the label.
//!
//! The first qualifying line wins even when a later one looks "better";
//! there is no scoring.

use crate::error::ImageError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Characters that would let a label escape its folder or confuse the filesystem.
static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[/\\\p{Cc}]").unwrap());

/// A two-word routing label, safe to use as a single folder name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    /// Validate `text` as a folder name.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() || text == "." || text == ".." || RE_UNSAFE.is_match(&text) {
            return None;
        }
        Some(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-cased first character, i.e. the upload group this label lands in.
    pub fn prefix(&self) -> Option<char> {
        self.0.chars().next().and_then(|c| c.to_uppercase().next())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for Label {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Index of the first line with two or three tokens, and that line's first two tokens.
pub fn find_candidate<S: AsRef<str>>(lines: &[S]) -> Option<(usize, String)> {
    lines.iter().enumerate().find_map(|(idx, line)| {
        let tokens: Vec<&str> = line.as_ref().split_whitespace().collect();
        match tokens.len() {
            2 | 3 => Some((idx, tokens[..2].join(" "))),
            _ => None,
        }
    })
}

/// Extract the label for the image at `path` from its recognized lines.
pub fn extract_label<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<Label, ImageError> {
    let (idx, text) = find_candidate(lines).ok_or_else(|| ImageError::LabelNotFound {
        path: path.to_path_buf(),
        candidates: lines.len(),
    })?;
    debug!("{}: label {:?} from line {}", path.display(), text, idx);

    Label::new(text.clone()).ok_or(ImageError::UnsafeLabel {
        path: path.to_path_buf(),
        label: text,
    })
}
