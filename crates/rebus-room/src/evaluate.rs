//! Fuzzy guess evaluation.
//!
//! Both the guess and the answer are normalized the same way before they
//! are compared:
//!
//! 1. lowercase
//! 2. drop anything that is not a letter, digit, or whitespace
//! 3. drop the standalone articles "the", "a", "an"
//! 4. collapse runs of whitespace to one space and trim
//!
//! Classification then walks a fixed ladder and the first rung that
//! matches wins. See [`evaluate`].

use rebus_protocol::MatchKind;

/// Words ignored when comparing guesses.
const ARTICLES: [&str; 3] = ["the", "a", "an"];

/// Similarity awarded when one normalized string contains the other.
const CONTAINMENT_SIMILARITY: f64 = 0.9;

/// Lowest similarity that still earns partial credit.
const PARTIAL_THRESHOLD: f64 = 0.6;

/// Result of comparing a guess against an answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub kind: MatchKind,
    /// In `[0, 1]`.
    pub similarity: f64,
}

impl Evaluation {
    const fn new(kind: MatchKind, similarity: f64) -> Self {
        Self { kind, similarity }
    }

    /// `true` for `correct` and `partial`, the outcomes that score.
    pub fn is_scoring(&self) -> bool {
        !matches!(self.kind, MatchKind::Wrong)
    }
}

/// Canonical comparison form of a guess or an answer.
pub fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let kept: String = lowered
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();
    kept.split_whitespace()
        .filter(|word| !ARTICLES.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Edit distance counting single-`char` insertions, deletions and
/// substitutions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Maximum edit distance still accepted as correct for an answer of
/// `answer_len` chars.
fn typo_threshold(answer_len: usize) -> usize {
    if answer_len <= 6 { 2 } else { 3 }
}

/// Classifies `guess` against `answer`.
///
/// First match wins:
///
/// | # | condition | result |
/// |---|---|---|
/// | 1 | normalized guess is empty | `wrong`, 0 |
/// | 2 | normalized strings are equal | `correct`, 1 |
/// | 3 | edit distance within the typo threshold | `correct`, `1 - d/max_len` |
/// | 4 | one contains the other | `correct`, 0.9 |
/// | 5 | similarity ≥ 0.6 | `partial` |
/// | 6 | otherwise | `wrong` with the computed similarity |
///
/// The typo threshold is 2 for answers of at most 6 chars and 3 beyond.
pub fn evaluate(guess: &str, answer: &str) -> Evaluation {
    let guess = normalize(guess);
    let answer = normalize(answer);

    if guess.is_empty() {
        return Evaluation::new(MatchKind::Wrong, 0.0);
    }
    if guess == answer {
        return Evaluation::new(MatchKind::Correct, 1.0);
    }

    let answer_len = answer.chars().count();
    let max_len = guess.chars().count().max(answer_len);
    let distance = levenshtein(&guess, &answer);
    let similarity = 1.0 - distance as f64 / max_len as f64;

    if distance <= typo_threshold(answer_len) {
        return Evaluation::new(MatchKind::Correct, similarity);
    }
    if !answer.is_empty() && (answer.contains(&guess) || guess.contains(&answer)) {
        return Evaluation::new(MatchKind::Correct, CONTAINMENT_SIMILARITY);
    }
    if similarity >= PARTIAL_THRESHOLD {
        return Evaluation::new(MatchKind::Partial, similarity);
    }
    Evaluation::new(MatchKind::Wrong, similarity)
}
