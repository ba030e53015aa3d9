//! DTMF digit validation

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// A touch-tone digit: `0-9`, `*` or `#`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DtmfDigit(char);

impl DtmfDigit {
    pub fn as_char(&self) -> char {
        self.0
    }
}

impl TryFrom<char> for DtmfDigit {
    type Error = BridgeError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            '0'..='9' | '*' | '#' => Ok(Self(c)),
            other => Err(BridgeError::invalid_digit(other.to_string())),
        }
    }
}

impl TryFrom<&str> for DtmfDigit {
    type Error = BridgeError;

    /// Exactly one character is accepted
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::try_from(c),
            _ => Err(BridgeError::invalid_digit(s)),
        }
    }
}

impl TryFrom<String> for DtmfDigit {
    type Error = BridgeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::try_from(s.as_str())
    }
}

impl From<DtmfDigit> for String {
    fn from(digit: DtmfDigit) -> Self {
        digit.0.to_string()
    }
}

impl fmt::Display for DtmfDigit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
