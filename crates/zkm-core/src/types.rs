use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ZkmError;

/// Ledger epoch number. Always an integer inside the workspace; string forms
/// are only accepted at the boundary via [`parse_epoch`].
pub type Epoch = u64;

/// Size of a ledger account address in bytes
pub const ADDRESS_SIZE: usize = 32;

/// Parse an epoch value that arrived over JSON as either a number or a
/// decimal string (RPC nodes and stored sessions disagree on the shape).
pub fn parse_epoch(value: &serde_json::Value) -> Result<Epoch, ZkmError> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ZkmError::InvalidEpoch(format!("not a non-negative integer: {n}"))),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| ZkmError::InvalidEpoch(format!("{s:?}: {e}"))),
        other => Err(ZkmError::InvalidEpoch(format!("unexpected JSON type: {other}"))),
    }
}

/// A 32-byte ledger account address, rendered as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = ZkmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; ADDRESS_SIZE];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|e| ZkmError::InvalidAddress(format!("{s}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Transaction identifier as reported by the ledger or an external wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxDigest(pub String);

impl fmt::Display for TxDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxDigest {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_parse_epoch_number_and_string() {
        assert_eq!(parse_epoch(&json!(100)).unwrap(), 100);
        assert_eq!(parse_epoch(&json!("100")).unwrap(), 100);
        assert_eq!(parse_epoch(&json!(" 42 ")).unwrap(), 42);
    }

    #[test]
    fn test_parse_epoch_rejects_garbage() {
        assert!(parse_epoch(&json!(-1)).is_err());
        assert!(parse_epoch(&json!(1.5)).is_err());
        assert!(parse_epoch(&json!("ten")).is_err());
        assert!(parse_epoch(&json!(null)).is_err());
    }

    #[test]
    fn test_address_hex_parse() {
        let addr = Address::from_bytes([0xABu8; ADDRESS_SIZE]);
        let hex_str = addr.to_hex();
        assert!(hex_str.starts_with("0x"));
        assert_eq!(hex_str.len(), 2 + 64);
        assert_eq!(hex_str.parse::<Address>().unwrap(), addr);
        // prefix is optional on input
        assert_eq!(hex_str[2..].parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("zz".repeat(32).parse::<Address>().is_err());
    }

    #[test]
    fn test_address_serde_as_string() {
        let addr = Address::from_bytes([7u8; ADDRESS_SIZE]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    proptest! {
        #[test]
        fn epoch_string_and_number_agree(epoch in any::<u64>()) {
            let from_num = parse_epoch(&json!(epoch)).unwrap();
            let from_str = parse_epoch(&json!(epoch.to_string())).unwrap();
            prop_assert_eq!(from_num, from_str);
        }
    }
}
