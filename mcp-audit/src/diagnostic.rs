//! Stable, machine-readable audit findings.
//!
//! Every finding produced by the engines is a [`Diagnostic`] rendered as
//! `"<CODE> <context>: <text>"`, for example
//! `PAY-010 restrictedCalls[0].x402Version: Missing required field`.
//!
//! The code is the external contract: tooling filters findings by category
//! prefix (`PAY`) or full code (`PAY-010`). Context and text are free-form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The category half of a diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Input validation (`VAL`).
    Validation,
    /// Connection and handshake (`CON`).
    Connection,
    /// OAuth discovery and compliance (`AUTH`).
    Auth,
    /// x402 payment requirement fields (`PAY`).
    Payment,
    /// Tool probing (`PRB`).
    Probe,
    /// Snapshot comparison integrity (`CMP`).
    Compare,
}

impl Category {
    /// Returns the code prefix for this category.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Validation => "VAL",
            Self::Connection => "CON",
            Self::Auth => "AUTH",
            Self::Payment => "PAY",
            Self::Probe => "PRB",
            Self::Compare => "CMP",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "VAL" => Some(Self::Validation),
            "CON" => Some(Self::Connection),
            "AUTH" => Some(Self::Auth),
            "PAY" => Some(Self::Payment),
            "PRB" => Some(Self::Probe),
            "CMP" => Some(Self::Compare),
            _ => None,
        }
    }
}

/// A diagnostic code such as `AUTH-003`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Code {
    category: Category,
    number: u16,
}

impl Code {
    /// Creates a code from its category and three-digit number.
    #[must_use]
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }

    /// Returns the category of this code.
    #[must_use]
    pub const fn category(self) -> Category {
        self.category
    }

    /// Returns the numeric part of this code.
    #[must_use]
    pub const fn number(self) -> u16 {
        self.number
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}", self.category.prefix(), self.number)
    }
}

impl FromStr for Code {
    type Err = DiagnosticParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, number) = s
            .split_once('-')
            .ok_or_else(|| DiagnosticParseError(s.to_owned()))?;
        let category =
            Category::from_prefix(prefix).ok_or_else(|| DiagnosticParseError(s.to_owned()))?;
        if number.len() != 3 {
            return Err(DiagnosticParseError(s.to_owned()));
        }
        let number = number
            .parse::<u16>()
            .map_err(|_| DiagnosticParseError(s.to_owned()))?;
        Ok(Self { category, number })
    }
}

/// Error returned when a string is not a well-formed diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed diagnostic: {0:?}")]
pub struct DiagnosticParseError(String);

/// A single audit finding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    code: Code,
    context: String,
    text: String,
}

impl Diagnostic {
    /// Creates a diagnostic.
    #[must_use]
    pub fn new(code: Code, context: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            code,
            context: context.into(),
            text: text.into(),
        }
    }

    /// Returns the diagnostic code.
    #[must_use]
    pub const fn code(&self) -> Code {
        self.code
    }

    /// Returns the location or subject the finding refers to.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Returns the human-readable text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns `true` if the rendered code equals `code` (e.g. `"PAY-083"`).
    #[must_use]
    pub fn has_code(&self, code: &str) -> bool {
        self.code.to_string() == code
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.code, self.context, self.text)
    }
}

impl FromStr for Diagnostic {
    type Err = DiagnosticParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, rest) = s
            .split_once(' ')
            .ok_or_else(|| DiagnosticParseError(s.to_owned()))?;
        let code = code.parse::<Code>()?;
        let at = context_end(rest).ok_or_else(|| DiagnosticParseError(s.to_owned()))?;
        Ok(Self::new(code, &rest[..at], &rest[at + 2..]))
    }
}

/// Byte offset of the `": "` that ends the context. Separators nested in
/// brackets, parentheses or quoted keys belong to the context.
fn context_end(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut depth = 0_usize;
    let mut quoted = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if quoted {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => quoted = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => quoted = true,
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b' ') => return Some(i),
            _ => {}
        }
    }
    None
}

impl Serialize for Diagnostic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Diagnostic {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Returns `true` if any diagnostic in `messages` carries `code`.
#[must_use]
pub fn contains_code(messages: &[Diagnostic], code: &str) -> bool {
    messages.iter().any(|m| m.has_code(code))
}
