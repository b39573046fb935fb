//! Signed relay bids.
//!
//! A bid commits to an amount and to the L1 block it was placed for. The
//! bidder address is never taken from the bidder directly but recovered from
//! the signature over [`digest`], so an address can't be claimed by anyone
//! not holding its key.

use {
    crate::lower_hex,
    alloy::{
        primitives::{Address, B256, Signature, SignatureError, U256, keccak256},
        signers::{SignerSync, local::PrivateKeySigner},
    },
    num::BigUint,
    serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser},
    serde_json::value::RawValue,
    std::fmt::{self, Debug, Formatter},
};

/// Returns the message a bid signature commits to.
///
/// This is the keccak256 hash of the decimal amount immediately followed by
/// the decimal block number. Other implementations rely on this exact
/// preimage so it must never change.
pub fn digest(amount_wei: &BigUint, l1_block: u64) -> B256 {
    keccak256(format!("{amount_wei}{l1_block}"))
}

/// A bid for the relay slot of a single L1 block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "JsonBid", into = "JsonBid")]
pub struct SignedBid {
    amount_wei: BigUint,
    l1_block: u64,
    address: Address,
    signature: BidSignature,
}

impl SignedBid {
    /// Signs a bid and embeds the address recovered from the new signature.
    ///
    /// The address is recovered rather than derived from the key so that it is
    /// exactly what [`SignedBid::verify`] recomputes later on.
    pub fn sign(
        amount_wei: BigUint,
        l1_block: u64,
        signer: &PrivateKeySigner,
    ) -> Result<Self, SigningError> {
        let digest = digest(&amount_wei, l1_block);
        let signature = BidSignature::from(signer.sign_hash_sync(&digest)?);
        let address = signature.recover(&digest)?;
        Ok(Self {
            amount_wei,
            l1_block,
            address,
            signature,
        })
    }

    /// Assembles a bid from its parts without checking the signature.
    pub fn from_parts(
        amount_wei: BigUint,
        l1_block: u64,
        address: Address,
        signature: BidSignature,
    ) -> Self {
        Self {
            amount_wei,
            l1_block,
            address,
            signature,
        }
    }

    /// Whether the signature over the bid's terms recovers to the bid's
    /// address. Malformed signatures are simply invalid.
    pub fn verify(&self) -> bool {
        let digest = digest(&self.amount_wei, self.l1_block);
        self.signature
            .recover(&digest)
            .is_ok_and(|signer| signer == self.address)
    }

    /// Canonical wire encoding, e.g.
    /// `{"amountWei":677,"l1Block":1234567,"address":"0x..","signature":"0x.."}`.
    pub fn encode(&self) -> String {
        // Only fails for raw values that aren't valid JSON which a decimal
        // integer always is.
        serde_json::to_string(self).expect("bid encoding is infallible")
    }

    /// Parses the canonical wire encoding. Anything that deviates from it is
    /// rejected, the signature is not checked.
    pub fn decode(encoded: &str) -> Result<Self, MalformedBid> {
        Ok(serde_json::from_str(encoded)?)
    }

    pub fn amount_wei(&self) -> &BigUint {
        &self.amount_wei
    }

    pub fn l1_block(&self) -> u64 {
        self.l1_block
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signature(&self) -> &BidSignature {
        &self.signature
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed bid: {0}")]
pub struct MalformedBid(#[from] serde_json::Error);

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("failed to sign bid digest")]
    Sign(#[from] alloy::signers::Error),
    #[error("failed to recover signer of bid")]
    Recover(#[from] RecoveryError),
}

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("recovery id must be 0 or 1 but is {0}")]
    RecoveryId(u8),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// A recoverable secp256k1 signature ordered as r, s, v where v is the
/// recovery id (0 or 1).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BidSignature(pub [u8; 65]);

impl BidSignature {
    /// Recovers the address that produced this signature for `digest`.
    pub fn recover(&self, digest: &B256) -> Result<Address, RecoveryError> {
        let y_parity = match self.0[64] {
            0 => false,
            1 => true,
            v => return Err(RecoveryError::RecoveryId(v)),
        };
        let signature = Signature::new(
            U256::from_be_slice(&self.0[..32]),
            U256::from_be_slice(&self.0[32..64]),
            y_parity,
        );
        Ok(signature.recover_address_from_prehash(digest)?)
    }
}

impl From<Signature> for BidSignature {
    fn from(signature: Signature) -> Self {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
        bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
        bytes[64] = u8::from(signature.v());
        Self(bytes)
    }
}

impl Debug for BidSignature {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("BidSignature")
            .field(&lower_hex::encode(&self.0))
            .finish()
    }
}

impl Serialize for BidSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&lower_hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for BidSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer
            .deserialize_str(lower_hex::FixedVisitor::<65> {
                what: "the ecdsa signature ordered as r, s, v",
            })
            .map(Self)
    }
}

/// An internal type used for deriving the canonical `serde` implementation of
/// [`SignedBid`]. Field order is the wire order.
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct JsonBid {
    #[serde(with = "decimal_integer")]
    amount_wei: BigUint,
    l1_block: u64,
    #[serde(with = "lower_hex::address")]
    address: Address,
    signature: BidSignature,
}

impl From<SignedBid> for JsonBid {
    fn from(bid: SignedBid) -> Self {
        Self {
            amount_wei: bid.amount_wei,
            l1_block: bid.l1_block,
            address: bid.address,
            signature: bid.signature,
        }
    }
}

impl From<JsonBid> for SignedBid {
    fn from(json: JsonBid) -> Self {
        Self::from_parts(json.amount_wei, json.l1_block, json.address, json.signature)
    }
}

/// Arbitrary precision unsigned integers as plain JSON numbers.
mod decimal_integer {
    use super::*;

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        RawValue::from_string(value.to_string())
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        let digits = raw.get();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(de::Error::custom(format!(
                "{digits} is not an unsigned decimal integer"
            )));
        }
        BigUint::parse_bytes(digits.as_bytes(), 10)
            .ok_or_else(|| de::Error::custom(format!("failed to parse {digits} as integer")))
    }
}
