//! Minimal ERC-20 encoding: `transfer` calldata and `Transfer` log decoding

use crate::error::{BridgeError, BridgeResult};

use ethers::types::{Address, Bytes, Log, H256, U256};
use sha3::{Digest, Keccak256};

pub const TRANSFER_SIGNATURE: &str = "transfer(address,uint256)";
pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn transfer_topic() -> H256 {
    H256(keccak256(TRANSFER_EVENT.as_bytes()))
}

/// Left-pad an address into a 32-byte topic / ABI word
pub fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    let mut data = Vec::with_capacity(68);
    data.extend_from_slice(&keccak256(TRANSFER_SIGNATURE.as_bytes())[..4]);
    data.extend_from_slice(&address_word(&to));
    let mut value = [0u8; 32];
    amount.to_big_endian(&mut value);
    data.extend_from_slice(&value);
    Bytes::from(data)
}

/// (from, to, value) of a `Transfer` log, if it is one
pub fn decode_transfer_log(log: &Log) -> Option<(Address, Address, U256)> {
    if log.topics.len() != 3 || log.topics[0] != transfer_topic() || log.data.len() != 32 {
        return None;
    }
    let from = Address::from_slice(&log.topics[1].as_bytes()[12..]);
    let to = Address::from_slice(&log.topics[2].as_bytes()[12..]);
    Some((from, to, U256::from_big_endian(&log.data)))
}

pub fn parse_address(s: &str) -> BridgeResult<Address> {
    s.parse::<Address>()
        .map_err(|e| BridgeError::Config(format!("Invalid Ethereum address {}: {}", s, e)))
}

/// Full lowercase `0x` form used for every Ethereum address the bridge stores
pub fn format_address(address: &Address) -> String {
    format!("{:?}", address)
}
