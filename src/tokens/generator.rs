use rand::rngs::OsRng;
use rand::RngCore;

/// Generate `num_bytes` of OS entropy, hex encoded (2 chars per byte).
///
/// Fails only when the operating system's random source is unavailable.
pub fn generate_hex(num_bytes: usize) -> Result<String, rand::Error> {
    let mut bytes = vec![0u8; num_bytes];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hex_length() {
        let token = generate_hex(64).unwrap();
        assert_eq!(token.len(), 128); // 64 bytes * 2 hex chars
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generate_hex_randomness() {
        let token = generate_hex(32).unwrap();
        let token2 = generate_hex(32).unwrap();
        assert_ne!(token, token2);
    }

    #[test]
    fn test_generate_hex_empty() {
        assert_eq!(generate_hex(0).unwrap(), "");
    }
}
