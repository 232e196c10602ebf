//! Identifier generation and digests for persisted records

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::{IdError, StoreError};

// construct a unique id then encode using bech32m under the given prefix
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, IdError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| IdError::Prefix(e.to_string()))?;
    let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| IdError::Encoding(e.to_string()))?;
    Ok(encoded)
}

/// Encodes a record into cbor and returns it alongside its sha256 digest.
pub fn encode_with_digest<T: minicbor::Encode<()>>(
    value: &T,
) -> Result<(String, Vec<u8>), StoreError> {
    let cbor = to_cbor(value)?;
    let hash = sha256::digest(&cbor);
    Ok((hash, cbor))
}

pub fn to_cbor<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(value).map_err(|e| StoreError::Encode(e.to_string()))
}
