//! Access tokens for upstream calls.
//!
//! The credential exchange itself happens outside the bridge; it only has to
//! hand over the resulting token.

use parking_lot::RwLock;

/// Supplies the token attached to every upstream request.
pub trait AccessTokenProvider: Send + Sync {
    /// Current token, or `None` when not (yet) authenticated.
    fn access_token(&self) -> Option<String>;
}

/// Token fixed at construction; replaceable by the credential collaborator.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: RwLock<Option<String>>,
}

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|t| !t.is_empty())),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token.filter(|t| !t.is_empty());
    }
}

impl AccessTokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_counts_as_missing() {
        let provider = StaticToken::new(Some(String::new()));
        assert_eq!(provider.access_token(), None);
        provider.set(Some("abc".into()));
        assert_eq!(provider.access_token().as_deref(), Some("abc"));
    }
}
