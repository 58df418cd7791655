use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::{Result, VerifyError};

/// A 256-bit SHA-256 digest.
///
/// Parsed from and rendered as 64 lowercase hex characters, which is also
/// its serde representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Hash(pub [u8; 32]);

impl Sha256Hash {
    pub fn from_hex(s: &str) -> Result<Self> { s.parse() }

    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }
}

impl FromStr for Sha256Hash {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 64 {
            return Err(VerifyError::InvalidHash(s.to_string()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).map_err(|_| VerifyError::InvalidHash(s.to_string()))?;
        Ok(Self(out))
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&hex::encode(self.0)) }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Sha256Hash({self})") }
}

impl Serialize for Sha256Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Sha256Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Digest of a complete payload.
pub fn digest(bytes: &[u8]) -> Sha256Hash { Sha256Hash(Sha256::digest(bytes).into()) }

/// Whether `bytes` hash to `expected_hex`. An unparsable hex string never matches.
pub fn matches(bytes: &[u8], expected_hex: &str) -> bool {
    Sha256Hash::from_hex(expected_hex).is_ok_and(|expected| digest(bytes) == expected)
}
