//! Well-known bidder keys.

use alloy::{
    primitives::{Address, B256, U256, address, b256},
    signers::local::PrivateKeySigner,
};

/// Private key of the bidder the reference bid vectors were produced with.
pub const ALICE_KEY: B256 =
    b256!("27ba389e95214192690a05d46716c5e8a1a91922441f29da3bdfbf5c57bcb494");

/// Address of [`ALICE_KEY`].
pub const ALICE: Address = address!("defea225c9e43f1a4ccb561867be9c9bf3142a98");

pub const BOB_KEY: B256 =
    b256!("1a51d1c8b33281390cc59928fde876d0577fce196cb66edcf944c4e6b875e980");

pub fn alice() -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&ALICE_KEY).unwrap()
}

pub fn bob() -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&BOB_KEY).unwrap()
}

/// Deterministic throwaway bidder. Distinct indices yield distinct keys.
pub fn nth(index: u64) -> PrivateKeySigner {
    let key = B256::from((U256::from(index) + U256::from(1)).to_be_bytes::<32>());
    PrivateKeySigner::from_bytes(&key).unwrap()
}
