//! Identifier newtypes shared across the registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Wallet address: 0x-prefixed hex of a 32-byte Ed25519 public key.
///
/// Stored canonically lowercased. The address is the ledger-native identity
/// for both issuers and admins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Expected length of the hex body (32 bytes).
    pub const HEX_LEN: usize = 64;

    /// Parse and canonicalize an address string.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let body = s.strip_prefix("0x").unwrap_or(s);
        if body.len() != Self::HEX_LEN {
            return Err(AddressParseError::BadLength(body.len()));
        }
        if !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError::NonHex);
        }
        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    /// Build an address from raw public key bytes.
    pub fn from_public_key_bytes(bytes: &[u8; 32]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// Decode the address back into public key bytes.
    pub fn to_public_key_bytes(&self) -> Result<[u8; 32], AddressParseError> {
        let body = self.0.strip_prefix("0x").unwrap_or(&self.0);
        let bytes = hex::decode(body).map_err(|_| AddressParseError::NonHex)?;
        bytes
            .try_into()
            .map_err(|_| AddressParseError::BadLength(body.len()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors parsing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("address hex body must be 64 characters, got {0}")]
    BadLength(usize),
    #[error("address contains non-hex characters")]
    NonHex,
}

/// Certificate content hash: 0x-prefixed hex of a 32-byte SHA-256 digest.
///
/// Globally unique external handle for one certificate version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertHash(String);

impl CertHash {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// Parse and canonicalize a cert hash string.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let body = s.strip_prefix("0x").unwrap_or(s);
        if body.len() != 64 {
            return Err(AddressParseError::BadLength(body.len()));
        }
        if !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError::NonHex);
        }
        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger transaction identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TxId(pub Uuid);

impl TxId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque resumable position in the ledger event stream.
///
/// Cursors are assigned by the ledger, strictly increasing, and a consumer
/// holding cursor `c` resumes exactly after `c`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventCursor(pub u64);

impl fmt::Display for EventCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fixed-point credential value, stored as an integer scaled by 100.
///
/// A value of 3.85 is stored as 385. Avoids floating-point drift in the
/// content hash and the read model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CredentialValue(i64);

impl CredentialValue {
    pub const SCALE: i64 = 100;

    /// Build from an already-scaled integer (385 means 3.85).
    pub fn from_scaled(scaled: i64) -> Self {
        Self(scaled)
    }

    pub fn scaled(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for CredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for CredentialValue {
    type Err = CredentialValueParseError;

    /// Parses decimal strings with at most two fractional digits: "3.85",
    /// "4", "3.8".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sign, body) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        if body.is_empty() {
            return Err(CredentialValueParseError::Empty);
        }
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if frac_part.len() > 2 {
            return Err(CredentialValueParseError::TooPrecise);
        }
        let int: i64 = int_part
            .parse()
            .map_err(|_| CredentialValueParseError::NotANumber)?;
        let frac: i64 = if frac_part.is_empty() {
            0
        } else {
            let padded = format!("{:0<2}", frac_part);
            padded
                .parse()
                .map_err(|_| CredentialValueParseError::NotANumber)?
        };
        int.checked_mul(Self::SCALE)
            .and_then(|v| v.checked_add(frac))
            .and_then(|v| v.checked_mul(sign))
            .map(Self)
            .ok_or(CredentialValueParseError::Overflow)
    }
}

/// Errors parsing a [`CredentialValue`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialValueParseError {
    #[error("empty value")]
    Empty,
    #[error("value is not a decimal number")]
    NotANumber,
    #[error("at most two fractional digits are supported")]
    TooPrecise,
    #[error("value out of range")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_canonicalizes() {
        let upper = format!("0x{}", "AB".repeat(32));
        let addr = Address::parse(&upper).unwrap();
        assert_eq!(addr.as_str(), &format!("0x{}", "ab".repeat(32)));

        // Accepts missing prefix
        let no_prefix = "cd".repeat(32);
        let addr = Address::parse(&no_prefix).unwrap();
        assert!(addr.as_str().starts_with("0x"));
    }

    #[test]
    fn address_parse_rejects_bad_input() {
        assert!(matches!(
            Address::parse("0x1234"),
            Err(AddressParseError::BadLength(_))
        ));
        assert!(matches!(
            Address::parse(&"zz".repeat(32)),
            Err(AddressParseError::NonHex)
        ));
    }

    #[test]
    fn address_public_key_roundtrip() {
        let bytes = [7u8; 32];
        let addr = Address::from_public_key_bytes(&bytes);
        assert_eq!(addr.to_public_key_bytes().unwrap(), bytes);
    }

    #[test]
    fn credential_value_parsing() {
        assert_eq!("3.85".parse::<CredentialValue>().unwrap().scaled(), 385);
        assert_eq!("4".parse::<CredentialValue>().unwrap().scaled(), 400);
        assert_eq!("3.8".parse::<CredentialValue>().unwrap().scaled(), 380);
        assert_eq!("0.05".parse::<CredentialValue>().unwrap().scaled(), 5);
        assert_eq!("-1.25".parse::<CredentialValue>().unwrap().scaled(), -125);

        assert!("3.855".parse::<CredentialValue>().is_err());
        assert!("abc".parse::<CredentialValue>().is_err());
        assert!("".parse::<CredentialValue>().is_err());
    }

    #[test]
    fn credential_value_display() {
        assert_eq!(CredentialValue::from_scaled(385).to_string(), "3.85");
        assert_eq!(CredentialValue::from_scaled(400).to_string(), "4.00");
        assert_eq!(CredentialValue::from_scaled(5).to_string(), "0.05");
        assert_eq!(CredentialValue::from_scaled(-125).to_string(), "-1.25");
    }
}
