//! Calldata encoding for the handful of contract calls the bridge makes,
//! plus the decoding Import needs to read a withdraw amount back out.

use num_bigint::BigUint;

use super::error::BridgeError;

/// `withdraw(uint256)` on the child token
pub const WITHDRAW_SELECTOR: &str = "2e1a7d4d";
/// `transfer(address,uint256)`
pub const TRANSFER_SELECTOR: &str = "a9059cbb";
/// `depositFor(address,address,bytes)` on the root chain manager
pub const DEPOSIT_FOR_SELECTOR: &str = "e3dec8fb";
/// `approve(address,uint256)`
pub const APPROVE_SELECTOR: &str = "095ea7b3";
/// `allowance(address,address)`
pub const ALLOWANCE_SELECTOR: &str = "dd62ed3e";
/// `lastStateId()` on the child-chain state receiver
pub const LAST_STATE_ID_SELECTOR: &str = "5407ca67";

/// Hex characters in one 32-byte ABI word
const WORD_HEX_LEN: usize = 64;

/// `0x` + 40 hex digits
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(body) => body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Lower-case address body without its `0x` prefix
pub fn strip_address(address: &str) -> String {
    address.trim_start_matches("0x").to_lowercase()
}

fn ensure_address(address: &str) -> Result<(), BridgeError> {
    if is_valid_address(address) {
        Ok(())
    } else {
        Err(BridgeError::InvalidAddress(address.to_string()))
    }
}

fn encode_address(address: &str) -> Result<String, BridgeError> {
    ensure_address(address)?;
    Ok(format!("{:0>64}", strip_address(address)))
}

fn encode_uint(value: &BigUint) -> String {
    format!("{:0>64}", value.to_str_radix(16))
}

fn encode_usize(value: usize) -> String {
    format!("{:064x}", value)
}

pub fn encode_withdraw(amount: &BigUint) -> String {
    format!("0x{}{}", WITHDRAW_SELECTOR, encode_uint(amount))
}

pub fn encode_transfer(to: &str, amount: &BigUint) -> Result<String, BridgeError> {
    Ok(format!(
        "0x{}{}{}",
        TRANSFER_SELECTOR,
        encode_address(to)?,
        encode_uint(amount)
    ))
}

pub fn encode_approve(spender: &str, amount: &BigUint) -> Result<String, BridgeError> {
    Ok(format!(
        "0x{}{}{}",
        APPROVE_SELECTOR,
        encode_address(spender)?,
        encode_uint(amount)
    ))
}

pub fn encode_allowance(owner: &str, spender: &str) -> Result<String, BridgeError> {
    Ok(format!(
        "0x{}{}{}",
        ALLOWANCE_SELECTOR,
        encode_address(owner)?,
        encode_address(spender)?
    ))
}

/// `depositFor(user, rootToken, abi.encode(amount))`
///
/// Head: user, token, offset of the dynamic `bytes` (3 words). Tail: byte
/// length (32) followed by the amount word.
pub fn encode_deposit_for(user: &str, root_token: &str, amount: &BigUint) -> Result<String, BridgeError> {
    Ok(format!(
        "0x{}{}{}{}{}{}",
        DEPOSIT_FOR_SELECTOR,
        encode_address(user)?,
        encode_address(root_token)?,
        encode_usize(3 * 32),
        encode_usize(32),
        encode_uint(amount)
    ))
}

pub fn encode_last_state_id() -> String {
    format!("0x{}", LAST_STATE_ID_SELECTOR)
}

/// Hex-digit offset of `selector` inside `input`, searched at byte-aligned
/// positions so nested (relayed) calls are found too.
pub fn find_selector(input: &str, selector: &str) -> Option<usize> {
    let body = input.trim_start_matches("0x").to_lowercase();
    let selector = selector.to_lowercase();
    (0..body.len().saturating_sub(selector.len() - 1))
        .step_by(2)
        .find(|&i| body.as_bytes()[i..].starts_with(selector.as_bytes()))
}

/// The 32-byte word that starts right after `offset + len` hex digits
pub fn decode_word_after(input: &str, offset: usize, len: usize) -> Option<BigUint> {
    let body = input.trim_start_matches("0x");
    let start = offset + len;
    let word = body.get(start..start + WORD_HEX_LEN)?;
    let bytes = hex::decode(word).ok()?;
    Some(BigUint::from_bytes_be(&bytes))
}

/// Whether `input` carries `address` anywhere in its payload
pub fn input_mentions_address(input: &str, address: &str) -> bool {
    input.to_lowercase().contains(&strip_address(address))
}
