//! Platform identifiers.
//!
//! Organizations, users and resources are addressed by 64-bit identifiers
//! rendered as 16 lowercase hex digits. The zero identifier is never valid.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of the textual form of an [`Id`].
pub const ID_LENGTH: usize = 16;

/// A well-formed, non-zero platform identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u64);

/// Reasons an identifier string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidId {
    #[error("id must have a length of 16 bytes, got {0}")]
    Length(usize),

    #[error("id must be hexadecimal")]
    NotHex,

    #[error("id must not be zero")]
    Zero,
}

impl Id {
    /// Wrap a raw value. Returns `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        loop {
            let (hi, _) = uuid::Uuid::new_v4().as_u64_pair();
            if let Some(id) = Self::new(hi) {
                return id;
            }
        }
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl FromStr for Id {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LENGTH {
            return Err(InvalidId::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidId::NotHex);
        }
        let raw = u64::from_str_radix(s, 16).map_err(|_| InvalidId::NotHex)?;
        Self::new(raw).ok_or(InvalidId::Zero)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
