//! Bearer credentials for API calls.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// Source of the bearer token attached to every request
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` when the user is signed out
    async fn access_token(&self) -> Option<SecretString>;
}

/// Fixed token, e.g. from configuration
#[derive(Clone)]
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

impl From<SecretString> for StaticToken {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Option<SecretString> {
        if self.0.expose_secret().trim().is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

/// Provider for sessions without a signed-in user
pub struct NoToken;

#[async_trait]
impl TokenProvider for NoToken {
    async fn access_token(&self) -> Option<SecretString> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blank_static_token_is_absent() {
        assert!(StaticToken::new("  ").access_token().await.is_none());
        let token = StaticToken::new("abc").access_token().await.unwrap();
        assert_eq!(token.expose_secret(), "abc");
        assert!(NoToken.access_token().await.is_none());
    }
}
