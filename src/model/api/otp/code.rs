use std::fmt::Display;
use std::str::FromStr;

use mongodb::bson::Bson;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_LENGTH: usize = 6;

/// Smallest and largest codes ever issued; issued codes never start with a zero.
const MIN_CODE: u32 = 100_000;
const MAX_CODE: u32 = 999_999;

/// A one-time login code: exactly six ASCII digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Code {
    digits: [u8; CODE_LENGTH],
}

impl Code {
    /// Generate a uniformly random code in `100000..=999999`.
    pub fn random() -> Self {
        Self::from_value(rand::thread_rng().gen_range(MIN_CODE..=MAX_CODE))
    }

    fn from_value(mut value: u32) -> Self {
        let mut digits = [0; CODE_LENGTH];
        for digit in digits.iter_mut().rev() {
            *digit = (value % 10) as u8;
            value /= 10;
        }
        Self { digits }
    }

    /// The code as a number.
    pub fn value(&self) -> u32 {
        self.digits
            .iter()
            .fold(0, |acc, digit| acc * 10 + u32::from(*digit))
    }
}

impl Display for Code {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for digit in self.digits {
            write!(formatter, "{digit}")?;
        }
        Ok(())
    }
}

impl FromStr for Code {
    type Err = ParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let len = string.chars().count();
        if len != CODE_LENGTH {
            return Err(ParseError::InvalidLength(len));
        }
        let mut digits = [0; CODE_LENGTH];
        for (slot, c) in digits.iter_mut().zip(string.chars()) {
            *slot = match c {
                '0'..='9' => c as u8 - b'0',
                _ => return Err(ParseError::InvalidChar(c)),
            };
        }
        Ok(Self { digits })
    }
}

impl TryFrom<String> for Code {
    type Error = ParseError;

    fn try_from(string: String) -> Result<Self, Self::Error> {
        string.parse()
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.to_string()
    }
}

impl From<Code> for Bson {
    fn from(code: Code) -> Self {
        Bson::String(code.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("code must contain exactly {CODE_LENGTH} characters, got {0}")]
    InvalidLength(usize),
    #[error("code must contain only digits, found '{0}'")]
    InvalidChar(char),
}
