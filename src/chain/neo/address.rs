//! Neo address <-> script hash conversion (Base58Check, version 0x17)

use crate::error::{BridgeError, BridgeResult};

use sha2::{Digest, Sha256};

const ADDRESS_VERSION: u8 = 0x17;

fn checksum(payload: &[u8]) -> [u8; 4] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut out = [0u8; 4];
    out.copy_from_slice(&second[..4]);
    out
}

/// Address for a script hash in its serialized (little-endian) byte order
pub fn script_hash_to_address(script_hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(25);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(script_hash);
    let check = checksum(&payload);
    payload.extend_from_slice(&check);
    bs58::encode(payload).into_string()
}

pub fn address_to_script_hash(address: &str) -> BridgeResult<[u8; 20]> {
    let invalid = |reason: &str| BridgeError::Config(format!("Invalid Neo address {}: {}", address, reason));

    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|_| invalid("not base58"))?;
    if bytes.len() != 25 || bytes[0] != ADDRESS_VERSION {
        return Err(invalid("wrong length or version"));
    }
    if checksum(&bytes[..21]) != bytes[21..] {
        return Err(invalid("bad checksum"));
    }

    let mut script_hash = [0u8; 20];
    script_hash.copy_from_slice(&bytes[1..21]);
    Ok(script_hash)
}

/// Parse a script hash written in display order (`0x`-prefixed, big-endian)
pub fn parse_script_hash(display: &str) -> BridgeResult<[u8; 20]> {
    let digits = display.strip_prefix("0x").unwrap_or(display);
    let mut bytes: [u8; 20] = hex::decode(digits)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| BridgeError::Config(format!("Invalid script hash {}", display)))?;
    bytes.reverse();
    Ok(bytes)
}

/// Normalized display form used to compare contract hashes from RPC output
pub fn display_script_hash(script_hash: &[u8; 20]) -> String {
    let mut reversed = *script_hash;
    reversed.reverse();
    hex::encode(reversed)
}
