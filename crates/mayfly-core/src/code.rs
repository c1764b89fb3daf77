//! Session codes — minting and validating the codes sessions are keyed by.

use rand::Rng;

/// Characters used in minted codes. 0/O and 1/I left out so codes survive
/// being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const CODE_LEN: usize = 6;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("Code is required.")]
    Empty,
}

/// Mint a fresh session code.
pub fn mint() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalize a user-entered code. Codes are opaque keys: anything non-empty
/// is accepted verbatim, and joining an unknown code starts an empty session.
pub fn parse(input: &str) -> Result<String, CodeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CodeError::Empty);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_shape() {
        let code = mint();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_mint_varies() {
        let codes: std::collections::HashSet<String> = (0..10).map(|_| mint()).collect();
        assert!(codes.len() > 1);
    }

    #[test]
    fn test_parse_trims() {
        assert_eq!(parse("  ABC234 ").unwrap(), "ABC234");
    }

    #[test]
    fn test_parse_preserves_foreign_codes() {
        // Codes from other clients may not match our alphabet; they still key
        // a session.
        assert_eq!(parse("room-42!").unwrap(), "room-42!");
    }

    #[test]
    fn test_parse_empty_rejected() {
        assert_eq!(parse("").unwrap_err(), CodeError::Empty);
        assert_eq!(parse("   ").unwrap_err(), CodeError::Empty);
    }
}
