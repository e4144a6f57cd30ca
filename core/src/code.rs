use std::fmt;
use std::str::FromStr;

use crate::error::{ChimeError, Result};
use crate::symbols::index_of;
use crate::{CODE_PREFIX, PAYLOAD_LEN};

/// A validated share code: `DS-` followed by exactly 6 symbols of `0-9A-Z`
///
/// Parsing trims surrounding whitespace and uppercases before validating,
/// so `" ds-abc123 "` parses as `DS-ABC123`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShareCode {
    payload: [u8; PAYLOAD_LEN],
}

impl ShareCode {
    /// Parse and normalize a user-supplied code
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_ascii_uppercase();
        let payload = normalized
            .strip_prefix(CODE_PREFIX)
            .ok_or_else(|| ChimeError::InvalidCodeFormat(input.to_string()))?;

        Self::from_payload(payload).map_err(|_| ChimeError::InvalidCodeFormat(input.to_string()))
    }

    /// Build a code from its 6 payload symbols (no prefix, no normalization)
    pub fn from_payload(payload: &str) -> Result<Self> {
        let bytes = payload.as_bytes();
        if bytes.len() != PAYLOAD_LEN || !payload.chars().all(|c| index_of(c).is_some()) {
            return Err(ChimeError::InvalidCodeFormat(payload.to_string()));
        }

        let mut out = [0u8; PAYLOAD_LEN];
        out.copy_from_slice(bytes);
        Ok(Self { payload: out })
    }

    /// The 6 payload symbols in transmission order
    pub fn symbols(&self) -> impl Iterator<Item = char> + '_ {
        self.payload.iter().map(|&b| b as char)
    }

    pub fn payload(&self) -> &str {
        // Only alphabet bytes are ever stored
        std::str::from_utf8(&self.payload).unwrap_or_default()
    }
}

impl FromStr for ShareCode {
    type Err = ChimeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CODE_PREFIX, self.payload())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ShareCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
