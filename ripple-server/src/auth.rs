use sha2::{Digest, Sha256};

use crate::error::{ChatError, ChatResult};

/// Signed bearer tokens of the form `<user_id>.<hex signature>`.
///
/// The signature is a keyed hash over the user id, so a token can be
/// verified statelessly by anything holding the shared secret. Identity is
/// always derived from the token, never from request bodies.
fn signature(secret: &str, user_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(user_id.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn issue_token(secret: &str, user_id: &str) -> String {
    format!("{}.{}", user_id, signature(secret, user_id))
}

/// Verify a token and return the user id it was issued for.
pub fn verify_token(secret: &str, token: &str) -> ChatResult<String> {
    let (user_id, sig) = token
        .rsplit_once('.')
        .ok_or_else(|| ChatError::Authentication("malformed token".to_string()))?;

    if user_id.is_empty() {
        return Err(ChatError::Authentication("malformed token".to_string()));
    }

    if sig != signature(secret, user_id) {
        return Err(ChatError::Authentication("invalid signature".to_string()));
    }

    Ok(user_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let token = issue_token("secret", "alice");
        assert_eq!(verify_token("secret", &token).unwrap(), "alice");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token("secret", "alice");
        assert!(verify_token("other", &token).is_err());
    }

    #[test]
    fn test_tampered_user_rejected() {
        let token = issue_token("secret", "alice");
        let sig = token.rsplit_once('.').unwrap().1;
        let forged = format!("bob.{}", sig);
        assert!(verify_token("secret", &forged).is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(verify_token("secret", "no-separator").is_err());
        assert!(verify_token("secret", ".abcdef").is_err());
        assert!(verify_token("secret", "").is_err());
    }

    #[test]
    fn test_user_id_with_dots_survives() {
        let token = issue_token("secret", "alice.smith");
        assert_eq!(verify_token("secret", &token).unwrap(), "alice.smith");
    }
}
