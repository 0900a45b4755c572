//! Authentication policy and credential validation.
//!
//! Method selection is driven by configuration: username/password (RFC 1929)
//! is required unless anonymous access is explicitly enabled.

use crate::protocol::{AUTH_NONE, AUTH_USERPASS};

/// Validates a username/password pair.
///
/// Process-wide and read-only after startup; all sessions share one provider.
pub trait CredentialProvider: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// A single statically configured credential pair.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        username.as_bytes() == self.username.as_bytes()
            && password.as_bytes() == self.password.as_bytes()
    }
}

/// Pick the authentication method for a client-offered method list.
///
/// Username/password wins when offered; anonymous access is only selected
/// when enabled and the client did not offer username/password.
pub fn select_method(offered: &[u8], allow_anonymous: bool) -> Option<u8> {
    if offered.contains(&AUTH_USERPASS) {
        Some(AUTH_USERPASS)
    } else if allow_anonymous && offered.contains(&AUTH_NONE) {
        Some(AUTH_NONE)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_credentials_match_exactly() {
        let provider = StaticCredentials::new("user", "password");
        assert!(provider.verify("user", "password"));
        assert!(!provider.verify("user", "Password"));
        assert!(!provider.verify("", ""));
    }

    #[test]
    fn empty_credentials_are_comparable() {
        let provider = StaticCredentials::new("", "");
        assert!(provider.verify("", ""));
        assert!(!provider.verify("user", ""));
    }

    #[test]
    fn userpass_is_required_by_default() {
        assert_eq!(select_method(&[AUTH_USERPASS], false), Some(AUTH_USERPASS));
        assert_eq!(
            select_method(&[AUTH_NONE, AUTH_USERPASS], false),
            Some(AUTH_USERPASS)
        );
        assert_eq!(select_method(&[AUTH_NONE], false), None);
        assert_eq!(select_method(&[], false), None);
    }

    #[test]
    fn anonymous_mode_accepts_no_auth() {
        assert_eq!(select_method(&[AUTH_NONE], true), Some(AUTH_NONE));
        // Username/password still wins when both are offered.
        assert_eq!(
            select_method(&[AUTH_NONE, AUTH_USERPASS], true),
            Some(AUTH_USERPASS)
        );
        assert_eq!(select_method(&[0x01], true), None);
    }
}
