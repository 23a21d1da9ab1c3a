//! Identity authority trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ServiceError;

const SERVICE: &str = "identity";

/// Claims carried by a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub username: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

/// A registered user as returned by the identity authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub is_active: bool,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            id,
            email: format!("{username}@example.com"),
            username,
            first_name: String::new(),
            last_name: String::new(),
            role: "user".to_string(),
            is_active: true,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Answer to a token validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    Valid(Claims),
    Invalid { reason: String },
}

/// Answer to a user lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Found(User),
    NotFound,
}

/// Trait for identity authority operations.
///
/// An `Err` means the authority could not answer; callers deny access.
#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    /// Validates a bearer token.
    async fn validate_token(&self, token: &str) -> Result<TokenValidation, ServiceError>;

    /// Looks up a user by ID.
    async fn get_user(&self, user_id: UserId) -> Result<UserLookup, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryIdentityState {
    users: HashMap<UserId, User>,
    tokens: HashMap<String, Claims>,
}

/// In-memory identity authority for testing and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityAuthority {
    state: Arc<RwLock<InMemoryIdentityState>>,
    fail_on_call: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
}

impl InMemoryIdentityAuthority {
    /// Creates an authority with no users.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user.
    pub async fn add_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Issues a token for a registered user, valid for `ttl`.
    pub async fn issue_token(&self, user_id: UserId, ttl: Duration) -> Option<String> {
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        let mut state = self.state.write().await;
        let user = state.users.get(&user_id)?.clone();
        let expires_at = Utc::now() + ttl;
        let token = format!("token-{}-{}", user.id, state.tokens.len() + 1);
        state.tokens.insert(
            token.clone(),
            Claims {
                user_id: user.id,
                username: user.username,
                role: user.role,
                expires_at,
            },
        );
        Some(token)
    }

    /// Registers a token with explicit claims.
    pub async fn insert_token(&self, token: impl Into<String>, claims: Claims) {
        self.state.write().await.tokens.insert(token.into(), claims);
    }

    /// Makes every call fail until switched off again.
    pub fn set_fail_on_call(&self, fail: bool) {
        self.fail_on_call.store(fail, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn simulate_call(&self) -> Result<(), ServiceError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_on_call.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable {
                service: SERVICE,
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityAuthority for InMemoryIdentityAuthority {
    async fn validate_token(&self, token: &str) -> Result<TokenValidation, ServiceError> {
        self.simulate_call().await?;

        let state = self.state.read().await;
        let Some(claims) = state.tokens.get(token) else {
            return Ok(TokenValidation::Invalid {
                reason: "unknown token".to_string(),
            });
        };
        if claims.expires_at <= Utc::now() {
            return Ok(TokenValidation::Invalid {
                reason: "token expired".to_string(),
            });
        }
        Ok(TokenValidation::Valid(claims.clone()))
    }

    async fn get_user(&self, user_id: UserId) -> Result<UserLookup, ServiceError> {
        self.simulate_call().await?;

        Ok(match self.state.read().await.users.get(&user_id) {
            Some(user) => UserLookup::Found(user.clone()),
            None => UserLookup::NotFound,
        })
    }
}
