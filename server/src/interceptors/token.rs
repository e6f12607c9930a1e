use crate::services::ApiError;
use sha2::{Digest, Sha256};
use std::fmt;

/// Checks the shared deploy token.
///
/// Only a digest of the secret is kept, and presented tokens are compared digest against digest
/// without an early exit, so response timing does not depend on how much of the token matched.
#[derive(Clone)]
pub struct TokenGuard {
    digest: [u8; 32],
}

impl TokenGuard {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: digest(secret),
        }
    }

    pub fn check(&self, presented: Option<&str>) -> Result<(), ApiError> {
        let presented = presented.ok_or_else(|| ApiError::Forbidden("missing token".into()))?;
        let diff = digest(presented)
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(())
        } else {
            Err(ApiError::Forbidden("invalid token".into()))
        }
    }
}

impl fmt::Debug for TokenGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenGuard(..)")
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_the_exact_token() {
        let guard = TokenGuard::new("s3cret");
        assert!(guard.check(Some("s3cret")).is_ok());
        assert!(guard.check(Some("s3cret ")).is_err());
        assert!(guard.check(Some("S3CRET")).is_err());
        assert!(guard.check(Some("")).is_err());
        assert!(guard.check(None).is_err());
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let guard = TokenGuard::new("s3cret");
        assert!(!format!("{guard:?}").contains("s3cret"));
    }
}
