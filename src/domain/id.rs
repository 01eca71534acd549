use std::sync::OnceLock;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use sqids::Sqids;

use crate::domain::error::DomainError;

/// Confusable characters and the canonical character each one folds onto.
const SIMILAR_CHARS: &[(&str, char)] = &[
    ("C", 'c'),
    ("Ilj17", 'i'),
    ("O0", 'o'),
    ("P", 'p'),
    ("S5", 's'),
    ("UVvr", 'u'),
    ("W", 'w'),
    ("X", 'x'),
    ("Z2", 'z'),
    ("q", '9'),
];

const FOLD_TABLE: [u8; 128] = {
    let mut table = [0; 128];

    let mut i = 0;
    while i < 128 {
        table[i] = i as u8;
        i += 1;
    }

    let mut r = 0;
    while r < SIMILAR_CHARS.len() {
        let (sources, target) = SIMILAR_CHARS[r];
        let src_bytes = sources.as_bytes();

        let mut k = 0;
        while k < src_bytes.len() {
            table[src_bytes[k] as usize] = target as u8;
            k += 1;
        }
        r += 1;
    }
    table
};

pub const MIN_GENERATED_LENGTH: u8 = 6;
const CUSTOM_LENGTH: std::ops::RangeInclusive<usize> = 3..=32;
const RESERVED: &[&str] = &["api", "health"];

fn fold(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii() {
                FOLD_TABLE[c as usize] as char
            } else {
                c
            }
        })
        .collect()
}

fn is_confusable(c: char) -> bool {
    SIMILAR_CHARS.iter().any(|(s, _)| s.contains(c))
}

fn alphabet() -> Vec<char> {
    ('A'..='Z')
        .chain('a'..='z')
        .chain('0'..='9')
        .filter(|c| !is_confusable(*c))
        .collect()
}

static SQIDS: OnceLock<Sqids> = OnceLock::new();

fn sqids() -> &'static Sqids {
    SQIDS.get_or_init(|| {
        Sqids::builder()
            .min_length(MIN_GENERATED_LENGTH)
            .alphabet(alphabet())
            .build()
            .expect("short code alphabet is valid")
    })
}

/// The path segment a short link is reached by.
///
/// Codes are always stored folded, so a code typed with `0` instead of `O`
/// (or `l` instead of `1`) resolves to the same link.
#[derive(Debug, Display, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct ShortCode(pub String);

impl ShortCode {
    /// Folds an incoming code, e.g. the path segment of a redirect request.
    pub fn new(s: &str) -> Self {
        Self(fold(s.trim()))
    }

    /// Encodes a store sequence number into a fresh code.
    pub fn generate(seq: u64) -> anyhow::Result<Self> {
        let code = sqids().encode(&[seq])?;
        Ok(Self(code))
    }

    /// Validates a user-chosen alias.
    pub fn custom(s: &str) -> Result<Self, DomainError> {
        let code = Self::new(s);
        if !CUSTOM_LENGTH.contains(&code.0.len()) {
            return Err(DomainError::invalid(format!(
                "Custom code must be between {} and {} characters",
                CUSTOM_LENGTH.start(),
                CUSTOM_LENGTH.end()
            )));
        }
        if !code
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::invalid(
                "Custom code may only contain letters, digits, '-' and '_'",
            ));
        }
        if RESERVED.iter().any(|r| code.0.eq_ignore_ascii_case(&fold(r))) {
            return Err(DomainError::invalid("Custom code is reserved"));
        }
        Ok(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
