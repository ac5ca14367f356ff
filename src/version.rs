//! Resource versions
//!
//! A version is the CRC32 (IEEE) checksum of a resource's bytes, rendered
//! on the wire as eight lowercase hex digits wrapped in double quotes.
//!
//! CRC32 is an equality check, not a digest: two different bodies can
//! collide, in which case a subscriber would be treated as already current.
//! That risk is accepted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Content-derived version identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version(u32);

impl Version {
    /// Hash a resource body into its version
    pub fn of(bytes: &[u8]) -> Self {
        Self(crc32fast::hash(bytes))
    }

    /// Raw checksum value
    pub fn checksum(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Version {
    fn from(checksum: u32) -> Self {
        Self(checksum)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{:08x}\"", self.0)
    }
}

/// Error parsing a quoted version string
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid version string: {0}")]
pub struct ParseVersionError(String);

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .filter(|hex| hex.len() == 8)
            .ok_or_else(|| ParseVersionError(s.to_string()))?;

        u32::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|_| ParseVersionError(s.to_string()))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
