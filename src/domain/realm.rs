use async_trait::async_trait;

use crate::common::error::AuthcResult;
use crate::domain::account::Account;
use crate::domain::token::{AuthenticationToken, TokenKind};

/// Contract every pluggable credential store implements.
///
/// Realms are process-lifetime singletons and own their storage,
/// caching, and per-identifier concurrency discipline; the engine only
/// sequences calls into them.
#[async_trait]
pub trait Realm: Send + Sync {
    /// Unique name within the engine.
    fn name(&self) -> &str;

    fn supported_token_kinds(&self) -> &[TokenKind];

    fn supports(&self, token: &AuthenticationToken) -> bool {
        self.supported_token_kinds().contains(&token.kind())
    }

    /// Looks up and verifies the account for a token. `Ok(None)` means
    /// no account exists in this store for the token's identifier.
    async fn authenticate_account(
        &self,
        token: &AuthenticationToken,
    ) -> AuthcResult<Option<Account>>;

    /// Drops any cached authentication info for the identifier.
    async fn clear_cached_authc_info(&self, identifier: &str);

    /// Locking capability. The first realm returning `Some` at init
    /// becomes the engine's locking realm.
    fn account_locker(&self) -> Option<&dyn AccountLocker> {
        None
    }
}

/// Marker capability for the realm designated to lock accounts. The
/// engine's lock call is advisory; the realm owns the persistent
/// locked flag.
#[async_trait]
pub trait AccountLocker: Send + Sync {
    async fn lock_account(&self, identifier: &str);
}

/// External service that delivers the second-factor challenge to the
/// user (SMS, email, push). Optional; absence is handled silently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MfaChallenger: Send + Sync {
    async fn send_challenge(&self, identifier: &str) -> AuthcResult<()>;
}
