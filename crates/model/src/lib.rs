//! Contains models that are shared between the auction engine, the API and
//! the bidders.

pub mod bid;
mod lower_hex;

pub use bid::{BidSignature, MalformedBid, RecoveryError, SignedBid, SigningError, digest};
