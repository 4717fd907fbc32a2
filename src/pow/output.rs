use serde_json::Value;

use crate::types::{Hash32, Solution};

/// Number of consecutive `'0'` characters at the start of a hex hash.
pub fn leading_zeros(hash_hex: &str) -> u32 {
    hash_hex.chars().take_while(|c| *c == '0').count() as u32
}

/// Parse the pow program's result line: a JSON pair `[nonce, hash]` where
/// the nonce is a decimal string (or a plain number) and the hash is 32 bytes
/// of hex. Anything else is `None`.
pub fn parse_solution(line: &str) -> Option<Solution> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let pair = value.as_array()?;
    if pair.len() != 2 {
        return None;
    }

    let nonce = match &pair[0] {
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        Value::Number(n) => n.as_u64()?,
        _ => return None,
    };

    let hash_hex = pair[1].as_str()?;
    let bytes = hex::decode(hash_hex).ok()?;
    let hash = Hash32::try_from(bytes.as_slice()).ok()?;

    Some(Solution {
        nonce,
        hash,
        zeros: leading_zeros(hash_hex),
    })
}
