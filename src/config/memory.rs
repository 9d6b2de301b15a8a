use crate::error::{PmError, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Resident-memory ceiling, stored in bytes.
///
/// Manifests write it the way process managers usually do: a plain byte
/// count or a number with a `K`/`M`/`G` suffix (base 1024), e.g. `"150M"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemorySize(u64);

impl MemorySize {
    pub fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn from_megabytes(mb: u64) -> Self {
        Self(mb.saturating_mul(MB))
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for MemorySize {
    type Err = PmError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PmError::InvalidMemorySize(
                s.to_string(),
                "empty value".to_string(),
            ));
        }

        let upper = trimmed.to_ascii_uppercase();
        let without_b = upper.strip_suffix('B').unwrap_or(&upper);

        let (digits, multiplier) = match without_b.chars().last() {
            Some('K') => (&without_b[..without_b.len() - 1], KB),
            Some('M') => (&without_b[..without_b.len() - 1], MB),
            Some('G') => (&without_b[..without_b.len() - 1], GB),
            Some(c) if c.is_ascii_digit() => (without_b, 1),
            _ => {
                return Err(PmError::InvalidMemorySize(
                    s.to_string(),
                    "expected a number followed by K, M or G".to_string(),
                ))
            }
        };

        let value: u64 = digits.trim().parse().map_err(|_| {
            PmError::InvalidMemorySize(s.to_string(), "not a whole number".to_string())
        })?;

        let bytes = value.checked_mul(multiplier).ok_or_else(|| {
            PmError::InvalidMemorySize(s.to_string(), "value too large".to_string())
        })?;

        Ok(Self(bytes))
    }
}

impl fmt::Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes >= GB && bytes % GB == 0 {
            write!(f, "{}G", bytes / GB)
        } else if bytes >= MB && bytes % MB == 0 {
            write!(f, "{}M", bytes / MB)
        } else if bytes >= KB && bytes % KB == 0 {
            write!(f, "{}K", bytes / KB)
        } else {
            write!(f, "{}", bytes)
        }
    }
}

impl Serialize for MemorySize {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MemorySize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MemorySizeVisitor;

        impl<'de> Visitor<'de> for MemorySizeVisitor {
            type Value = MemorySize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a size such as \"150M\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<MemorySize, E> {
                Ok(MemorySize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<MemorySize, E> {
                u64::try_from(v)
                    .map(MemorySize)
                    .map_err(|_| E::custom("memory size cannot be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<MemorySize, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(MemorySizeVisitor)
    }
}
