//! Shared-password access gate for the API

use crate::error::{CostError, CostResult};
use subtle::ConstantTimeEq;

/// Request header carrying the access key
pub const ACCESS_KEY_HEADER: &str = "x-access-key";

/// Message returned on a failed check
pub const ACCESS_DENIED_MESSAGE: &str = "비밀번호가 올바르지 않습니다.";

/// Checks presented keys against the configured password. No lockout.
#[derive(Clone)]
pub struct AccessGate {
    key: String,
}

impl AccessGate {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// `true` only for an exact match; comparison time does not depend on where keys differ
    pub fn permits(&self, presented: &str) -> bool {
        bool::from(self.key.as_bytes().ct_eq(presented.as_bytes()))
    }

    /// A missing key is denied like a wrong one
    pub fn check(&self, presented: Option<&str>) -> CostResult<()> {
        match presented {
            Some(key) if self.permits(key) => Ok(()),
            _ => Err(CostError::AccessDenied(ACCESS_DENIED_MESSAGE.to_string())),
        }
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate").field("key", &"***").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_key_permitted() {
        let gate = AccessGate::new("ssep2025");
        assert!(gate.permits("ssep2025"));
        assert!(gate.check(Some("ssep2025")).is_ok());
    }

    #[test]
    fn test_wrong_or_missing_key_denied() {
        let gate = AccessGate::new("ssep2025");
        assert!(!gate.permits("ssep2024"));
        assert!(!gate.permits("ssep20255"));
        assert!(!gate.permits(""));
        assert!(matches!(gate.check(None), Err(CostError::AccessDenied(_))));
        assert!(matches!(gate.check(Some("nope")), Err(CostError::AccessDenied(_))));
    }

    #[test]
    fn test_debug_hides_key() {
        let gate = AccessGate::new("ssep2025");
        assert!(!format!("{gate:?}").contains("ssep2025"));
    }
}
