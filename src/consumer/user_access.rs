// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request-scoped user-access handle.
//!
//! When the gateway carried both the profile and the ACL details, the handle
//! is pre-seeded from the envelope and never calls the provider for the
//! profile; otherwise the first `get_profile` fetches lazily through the
//! provider. The pre-seed is the mechanism that avoids a duplicate profile
//! lookup across the two processes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::context::UserAccess;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("user profile store unavailable: {0}")]
    Unavailable(String),
    #[error("no profile for user {0}")]
    NotFound(String),
}

/// Profile/ACL lookup contract.
#[async_trait]
pub trait UserAccessProvider: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<Value, ProviderError>;
    async fn fetch_acl(&self, user_id: &str) -> Result<Option<Value>, ProviderError>;
    async fn fetch_acl_all_env(&self, user_id: &str) -> Result<Option<Value>, ProviderError>;
}

/// Per-request handle over the carried identity.
#[derive(Clone)]
pub struct UserAccessHandle {
    identity: UserAccess,
    provider: Arc<dyn UserAccessProvider>,
    profile: Arc<OnceCell<Value>>,
}

impl UserAccessHandle {
    /// Wrap the carried identity. With `preseed` set and a carried profile
    /// available, the profile cache is filled from the envelope.
    pub fn new(identity: UserAccess, provider: Arc<dyn UserAccessProvider>, preseed: bool) -> Self {
        let profile = OnceCell::new();
        if preseed {
            if let Some(carried) = identity.profile.clone() {
                // Cell is freshly created; this set cannot fail.
                let _ = profile.set(carried);
            }
        }
        Self {
            identity,
            provider,
            profile: Arc::new(profile),
        }
    }

    pub fn identity(&self) -> &UserAccess {
        &self.identity
    }

    /// The user's profile: cached (pre-seeded or previously fetched) or
    /// fetched once through the provider.
    pub async fn get_profile(&self) -> Result<Value, ProviderError> {
        self.profile
            .get_or_try_init(|| self.provider.fetch_profile(&self.identity.id))
            .await
            .cloned()
    }

    /// The user's ACL: carried value when present, provider lookup otherwise.
    pub async fn get_acl(&self) -> Result<Option<Value>, ProviderError> {
        match &self.identity.acl {
            Some(acl) => Ok(Some(acl.clone())),
            None => self.provider.fetch_acl(&self.identity.id).await,
        }
    }

    /// Environment-independent ACL, same carried-or-fetched policy.
    pub async fn get_acl_all_env(&self) -> Result<Option<Value>, ProviderError> {
        match &self.identity.acl_all_env {
            Some(acl) => Ok(Some(acl.clone())),
            None => self.provider.fetch_acl_all_env(&self.identity.id).await,
        }
    }
}

/// Provider that never resolves anything. Demo wiring for deployments
/// without a user-profile backend.
pub struct NoUserAccessProvider;

#[async_trait]
impl UserAccessProvider for NoUserAccessProvider {
    async fn fetch_profile(&self, user_id: &str) -> Result<Value, ProviderError> {
        Err(ProviderError::NotFound(user_id.to_string()))
    }

    async fn fetch_acl(&self, _user_id: &str) -> Result<Option<Value>, ProviderError> {
        Ok(None)
    }

    async fn fetch_acl_all_env(&self, _user_id: &str) -> Result<Option<Value>, ProviderError> {
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that counts profile fetches.
    pub struct CountingProvider {
        pub profile_fetches: AtomicUsize,
        pub profile: Value,
    }

    impl CountingProvider {
        pub fn new(profile: Value) -> Self {
            Self {
                profile_fetches: AtomicUsize::new(0),
                profile,
            }
        }

        pub fn fetch_count(&self) -> usize {
            self.profile_fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UserAccessProvider for CountingProvider {
        async fn fetch_profile(&self, _user_id: &str) -> Result<Value, ProviderError> {
            self.profile_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.profile.clone())
        }

        async fn fetch_acl(&self, _user_id: &str) -> Result<Option<Value>, ProviderError> {
            Ok(None)
        }

        async fn fetch_acl_all_env(&self, _user_id: &str) -> Result<Option<Value>, ProviderError> {
            Ok(None)
        }
    }
}
