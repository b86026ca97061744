//! Puzzles and their derived hints.

use serde::{Deserialize, Serialize};

use crate::RoomError;
use crate::evaluate::normalize;

/// One puzzle as handed over by the ingestion side: an image reference
/// (URL or data URI, never inspected here) and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleSource {
    pub image: String,
    pub answer: String,
}

impl PuzzleSource {
    pub fn new(image: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            answer: answer.into(),
        }
    }
}

/// A puzzle ready for play, with both hints derived up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Puzzle {
    image: String,
    answer: String,
    hints: [String; 2],
}

impl Puzzle {
    /// Builds a puzzle, deriving its hints from the answer.
    ///
    /// # Errors
    /// [`RoomError::InvalidInput`] if the answer has nothing left to
    /// compare against after normalization.
    pub fn new(source: PuzzleSource) -> Result<Self, RoomError> {
        let answer = source.answer.trim().to_owned();
        if normalize(&answer).is_empty() {
            return Err(RoomError::InvalidInput(format!(
                "answer {:?} has no letters or digits",
                source.answer
            )));
        }
        let hints = [first_letters(&answer), alternate_letters(&answer)];
        Ok(Self {
            image: source.image,
            answer,
            hints,
        })
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// The answer as supplied, trimmed.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Hint text for `level` 1 or 2.
    pub fn hint(&self, level: u8) -> Option<&str> {
        match level {
            1 | 2 => Some(&self.hints[usize::from(level - 1)]),
            _ => None,
        }
    }
}

/// `"Eiffel Tower"` → `"E_____ T____ (2 words)"`.
fn first_letters(answer: &str) -> String {
    let words: Vec<String> = answer
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            let mut masked = String::new();
            if let Some(first) = chars.next() {
                masked.push(first);
            }
            masked.extend(chars.map(|_| '_'));
            masked
        })
        .collect();
    let count = words.len();
    let noun = if count == 1 { "word" } else { "words" };
    format!("{} ({count} {noun})", words.join(" "))
}

/// `"Eiffel Tower"` → `"E_f_e_ T_w_r"`.
fn alternate_letters(answer: &str) -> String {
    answer
        .split_whitespace()
        .map(|word| {
            word.chars()
                .enumerate()
                .map(|(i, c)| if i % 2 == 0 { c } else { '_' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
