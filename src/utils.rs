//! Identifier helpers

use super::error::PersistenceError;
use bech32::Bech32m;
use uuid7::uuid7;

pub const REQUEST_HRP: &str = "req_";
pub const ITEM_HRP: &str = "item_";

// construct a unique, time ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, PersistenceError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| PersistenceError::Identifier(e.to_string()))?;
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| PersistenceError::Identifier(e.to_string()))
}

pub fn new_request_id() -> Result<String, PersistenceError> {
    new_uuid_to_bech32(REQUEST_HRP)
}

pub fn new_item_id() -> Result<String, PersistenceError> {
    new_uuid_to_bech32(ITEM_HRP)
}

/// `{scope}/` followed by the big-endian sequence number, so that a prefix
/// scan over `scope` yields entries in insertion order.
pub(crate) fn scoped_key(scope: &str, seq: u64) -> Vec<u8> {
    let mut key = scope_prefix(scope);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

pub(crate) fn scope_prefix(scope: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(scope.len() + 9);
    prefix.extend_from_slice(scope.as_bytes());
    prefix.push(b'/');
    prefix
}
