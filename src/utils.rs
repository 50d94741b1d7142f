//! Utility functions for identifier minting

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id from a uuid7 then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Human-readable prefixes for each entity family. Keys in the store carry
/// these so a raw dump stays legible.
pub mod hrp {
    pub const EMPLOYEE: &str = "emp_";
    pub const ROLE: &str = "role_";
    pub const CATEGORY: &str = "cat_";
    pub const ITEM: &str = "item_";
    pub const REQUEST: &str = "req_";
    pub const NOTIFICATION: &str = "note_";
}
