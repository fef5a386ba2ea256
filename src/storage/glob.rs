//! Glob matching for KEYS.
//!
//! Supported syntax:
//! - `*` matches any run of bytes, including none
//! - `?` matches exactly one byte
//! - `[abc]`, `[a-z]`, `[^a-z]` match one byte from (or not from) a class
//! - `\x` matches `x` literally
//!
//! A pattern with an unterminated class is rejected up front.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("unterminated character class at offset {0}")]
    UnterminatedClass(usize),
}

/// Returns whether `key` matches the glob `pattern`.
pub fn matches(pattern: &[u8], key: &[u8]) -> Result<bool, PatternError> {
    validate(pattern)?;
    Ok(match_from(pattern, key))
}

/// A pattern checked once and matched against many keys.
#[derive(Debug, Clone)]
pub struct GlobPattern<'a> {
    pattern: &'a [u8],
}

impl<'a> GlobPattern<'a> {
    pub fn new(pattern: &'a [u8]) -> Result<Self, PatternError> {
        validate(pattern)?;
        Ok(Self { pattern })
    }

    /// Fast path for the `*` pattern.
    pub fn matches_all(&self) -> bool {
        self.pattern == b"*"
    }

    pub fn matches(&self, key: &[u8]) -> bool {
        self.matches_all() || match_from(self.pattern, key)
    }
}

fn validate(pattern: &[u8]) -> Result<(), PatternError> {
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            b'\\' => i += 2,
            b'[' => {
                let start = i;
                i += 1;
                if pattern.get(i) == Some(&b'^') {
                    i += 1;
                }
                // A leading ']' is a member of the class
                if pattern.get(i) == Some(&b']') {
                    i += 1;
                }
                loop {
                    match pattern.get(i) {
                        None => return Err(PatternError::UnterminatedClass(start)),
                        Some(b']') => break,
                        Some(b'\\') => i += 2,
                        Some(_) => i += 1,
                    }
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Iterative matcher. Only the most recent `*` is ever resumed, so the work
/// is bounded by `pattern.len() * text.len()` whatever the pattern.
fn match_from(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Pattern index after the last `*` and the text index it is retried from
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        if pattern.get(p) == Some(&b'*') {
            p += 1;
            resume = Some((p, t));
            continue;
        }

        if p < pattern.len() {
            let (matched, width) = match_one(&pattern[p..], text[t]);
            if matched {
                p += width;
                t += 1;
                continue;
            }
        }

        match resume {
            Some((star_p, star_t)) => {
                // Let the star swallow one more byte
                p = star_p;
                t = star_t + 1;
                resume = Some((star_p, t));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

/// Matches one byte against the pattern element at `pattern[0]`.
/// Returns the outcome and the width of that element.
fn match_one(pattern: &[u8], c: u8) -> (bool, usize) {
    match pattern[0] {
        b'?' => (true, 1),
        b'[' => match_class(pattern, c),
        b'\\' if pattern.len() > 1 => (pattern[1] == c, 2),
        literal => (literal == c, 1),
    }
}

/// Matches `c` against the class starting at `pattern[0] == '['`.
/// Returns the outcome and the index just past the closing `]`.
fn match_class(pattern: &[u8], c: u8) -> (bool, usize) {
    let mut i = 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < pattern.len() && (first || pattern[i] != b']') {
        first = false;
        let mut lo = pattern[i];
        if lo == b'\\' && i + 1 < pattern.len() {
            i += 1;
            lo = pattern[i];
        }
        if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let hi = pattern[i + 2];
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            if (lo..=hi).contains(&c) {
                matched = true;
            }
            i += 3;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }

    (matched != negate, i + 1)
}
