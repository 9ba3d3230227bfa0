// src/utils/token.rs

use rand::SeedableRng;
use rand::distributions::{Alphanumeric, Distribution};
use rand::rngs::StdRng;

use crate::config::SESSION_TOKEN_LENGTH;

/// Generates the unguessable access token handed to a candidate for the
/// written sub-flow. Alphanumeric so it survives URLs and copy-paste.
pub fn generate_session_token() -> String {
    let mut rng = StdRng::from_entropy();
    (0..SESSION_TOKEN_LENGTH)
        .map(|_| Alphanumeric.sample(&mut rng) as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_and_distinct() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), SESSION_TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
