//! Caller authentication.
//!
//! Identity is resolved from the bearer credential by a pluggable
//! authenticator; request headers naming a user are never trusted.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authenticated caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
    pub org_type: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>, org_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            org_type: org_type.into(),
        }
    }
}

/// Authentication failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication required")]
    Missing,

    #[error("Invalid credentials")]
    Invalid,
}

/// Resolves a bearer credential to an actor.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `bearer` is the token from `Authorization: Bearer <token>`, if any.
    async fn authenticate(&self, bearer: Option<&str>) -> Result<Actor, AuthError>;
}

/// Authenticator backed by a static token table.
#[derive(Debug, Clone, Default)]
pub struct TokenAuthenticator {
    tokens: HashMap<String, Actor>,
}

impl TokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for an actor.
    pub fn with_token(mut self, token: impl Into<String>, actor: Actor) -> Self {
        self.tokens.insert(token.into(), actor);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, bearer: Option<&str>) -> Result<Actor, AuthError> {
        let token = bearer.map(str::trim).filter(|t| !t.is_empty()).ok_or(AuthError::Missing)?;
        self.tokens.get(token).cloned().ok_or(AuthError::Invalid)
    }
}

/// Development authenticator: every caller is the same actor.
#[derive(Debug, Clone)]
pub struct FixedActorAuthenticator {
    actor: Actor,
}

impl FixedActorAuthenticator {
    pub fn new(actor: Actor) -> Self {
        tracing::warn!(
            "Authentication disabled: all requests act as '{}'",
            actor.id
        );
        Self { actor }
    }
}

#[async_trait]
impl Authenticator for FixedActorAuthenticator {
    async fn authenticate(&self, _bearer: Option<&str>) -> Result<Actor, AuthError> {
        Ok(self.actor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_authenticator() {
        let auth = TokenAuthenticator::new()
            .with_token("secret", Actor::new("exec_001", "executive", "internal"));

        let actor = auth.authenticate(Some("secret")).await.unwrap();
        assert_eq!(actor.id, "exec_001");

        assert_eq!(auth.authenticate(None).await, Err(AuthError::Missing));
        assert_eq!(auth.authenticate(Some("  ")).await, Err(AuthError::Missing));
        assert_eq!(auth.authenticate(Some("nope")).await, Err(AuthError::Invalid));
    }

    #[tokio::test]
    async fn test_fixed_actor_ignores_credentials() {
        let auth = FixedActorAuthenticator::new(Actor::new("dev", "admin", "internal"));
        assert_eq!(auth.authenticate(None).await.unwrap().id, "dev");
        assert_eq!(auth.authenticate(Some("x")).await.unwrap().id, "dev");
    }
}
