//! Strict `0x`-prefixed lower-case hex for fixed size byte strings.

use {
    alloy::primitives::Address,
    serde::{Deserializer, Serializer, de},
    std::fmt,
};

/// Encodes the bytes as `0x` followed by lower-case hex digits.
pub fn encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes exactly `N` bytes from a `0x`-prefixed lower-case hex string.
pub fn decode<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("{s:?} does not start with '0x'"))?;
    if digits.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(format!("{s:?} contains upper-case hex digits"));
    }
    let mut bytes = [0u8; N];
    hex::decode_to_slice(digits, &mut bytes)
        .map_err(|err| format!("failed to decode {s:?} as {N} hex bytes: {err}"))?;
    Ok(bytes)
}

pub(crate) struct FixedVisitor<const N: usize> {
    pub what: &'static str,
}

impl<const N: usize> de::Visitor<'_> for FixedVisitor<N> {
    type Value = [u8; N];

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "{} as {N} bytes of 0x-prefixed lower-case hex",
            self.what
        )
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        decode(s).map_err(de::Error::custom)
    }
}

/// `serde(with = ..)` adapter for addresses in their canonical wire form.
pub mod address {
    use super::*;

    pub fn serialize<S>(address: &Address, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&encode(address.as_slice()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer
            .deserialize_str(FixedVisitor::<20> { what: "an address" })
            .map(Address::from)
    }
}
