//! Length-prefixed key encoding for LMDB storage, and node key generation.
//!
//! Edge keys are encoded as: [len1][bytes1][len2][bytes2]...
//! - No delimiters, no escaping, any bytes allowed
//! - O(1) parsing per part (just read length byte)
//! - A key built from the first N parts is a scan prefix for all longer keys

use crate::error::{GraphError, Result};

/// Build a length-prefixed key from parts. Every part must be at most 255 bytes.
#[inline]
pub fn build_key(parts: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = parts.iter().map(|p| 1 + p.len()).sum();
    let mut key = Vec::with_capacity(total_len);
    for part in parts {
        debug_assert!(part.len() <= u8::MAX as usize);
        key.push(part.len() as u8);
        key.extend_from_slice(part);
    }
    key
}

/// Build a prefix for scanning (same as build_key, just clearer intent)
#[inline]
pub fn build_prefix(parts: &[&[u8]]) -> Vec<u8> {
    build_key(parts)
}

/// Get the Nth part from a key without allocating
#[inline]
pub fn get_part(bytes: &[u8], n: usize) -> Option<&[u8]> {
    let mut i = 0;
    let mut count = 0;
    while i < bytes.len() {
        let len = bytes[i] as usize;
        if i + 1 + len > bytes.len() {
            return None;
        }
        if count == n {
            return Some(&bytes[i + 1..i + 1 + len]);
        }
        i += 1 + len;
        count += 1;
    }
    None
}

/// Split a three-part edge key `[collection][from][to]`
pub fn parse_edge_key(bytes: &[u8]) -> Result<(&[u8], &[u8], &[u8])> {
    match (get_part(bytes, 0), get_part(bytes, 1), get_part(bytes, 2)) {
        (Some(c), Some(a), Some(b)) => Ok((c, a, b)),
        _ => Err(GraphError::StoreUnavailable(format!(
            "corrupt edge key ({} bytes)",
            bytes.len()
        ))),
    }
}

/// Generate a random node key (16 bytes, hex encoded)
pub fn generate_key() -> Result<String> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| GraphError::StoreUnavailable(format!("random source failed: {}", e)))?;
    Ok(hex_encode(&bytes))
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_parse() {
        let key = build_key(&[b"Permissions", b"from", b"to"]);
        let (c, a, b) = parse_edge_key(&key).unwrap();
        assert_eq!(c, b"Permissions");
        assert_eq!(a, b"from");
        assert_eq!(b, b"to");
    }

    #[test]
    fn test_get_part() {
        let key = build_key(&[b"aaa", b"bbb", b"ccc"]);
        assert_eq!(get_part(&key, 0), Some(&b"aaa"[..]));
        assert_eq!(get_part(&key, 2), Some(&b"ccc"[..]));
        assert_eq!(get_part(&key, 3), None);
    }

    #[test]
    fn test_prefix() {
        let key = build_key(&[b"Children", b"ns", b"obj"]);
        assert!(key.starts_with(&build_prefix(&[b"Children", b"ns"])));
        assert!(!key.starts_with(&build_prefix(&[b"Children", b"n"])));
        assert!(!key.starts_with(&build_prefix(&[b"Permissions"])));
    }

    #[test]
    fn test_binary_parts() {
        // Parts may themselves contain length bytes and slashes
        let key = build_key(&[&[3, b'a', b'/', b'b'], b"x"]);
        assert_eq!(get_part(&key, 0), Some(&[3, b'a', b'/', b'b'][..]));
    }

    #[test]
    fn test_truncated_key() {
        let mut key = build_key(&[b"Children", b"ns", b"obj"]);
        key.truncate(key.len() - 1);
        assert!(parse_edge_key(&key).is_err());
    }

    #[test]
    fn test_generate_key() {
        let a = generate_key().unwrap();
        let b = generate_key().unwrap();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
