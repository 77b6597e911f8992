//! The authentication engine core.
//!
//! Sequences one credential submission through realm dispatch, verdict
//! combination, the lock check, and the MFA gate, publishing lifecycle
//! events along the way. The engine is a pure coordinator: it performs
//! no I/O of its own beyond the realms and the event bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::authc::strategy::{AuthenticationAttempt, AuthenticationStrategy};
use crate::common::config::AuthcConfig;
use crate::common::error::{AuthcError, AuthcResult};
use crate::common::metrics::{record_account_lock, record_authc_attempt};
use crate::domain::account::{IdentifierCollection, ResolvedAccount};
use crate::domain::realm::{MfaChallenger, Realm};
use crate::domain::token::{standard_registry, AuthenticationToken, TokenKind, TokenRegistry};
use crate::infrastructure::event_bus::{topics, Event, EventBus, EventHandler};

/// Result of a completed engine pass over one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationOutcome {
    /// Every stored factor has been verified; the caller may establish
    /// the subject.
    Authenticated(IdentifierCollection),
    /// This factor verified but higher tiers remain. The caller
    /// persists the identifiers (never credentials) and submits the
    /// next factor with them.
    AdditionalFactorRequired(IdentifierCollection),
}

impl AuthenticationOutcome {
    pub fn identifiers(&self) -> &IdentifierCollection {
        match self {
            Self::Authenticated(identifiers) => identifiers,
            Self::AdditionalFactorRequired(identifiers) => identifiers,
        }
    }
}

enum DispatchOutcome {
    Complete(ResolvedAccount),
    AdditionalFactorRequired(ResolvedAccount),
}

/// Static map from token kind to the realms able to verify it, built
/// once at init. Realm order is the caller's, so strategy outcomes are
/// reproducible.
struct TokenRealmResolver {
    map: HashMap<TokenKind, Vec<Arc<dyn Realm>>>,
}

impl std::fmt::Debug for TokenRealmResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRealmResolver")
            .field("kinds", &self.map.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TokenRealmResolver {
    fn new(realms: &[Arc<dyn Realm>]) -> Self {
        let mut map: HashMap<TokenKind, Vec<Arc<dyn Realm>>> = HashMap::new();
        for realm in realms {
            for kind in realm.supported_token_kinds() {
                map.entry(*kind).or_default().push(realm.clone());
            }
        }
        Self { map }
    }

    fn realms_for(&self, kind: TokenKind) -> &[Arc<dyn Realm>] {
        self.map.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Clears per-realm cached authc info when a session ends.
struct CacheClearListener {
    realms: Vec<Arc<dyn Realm>>,
}

#[async_trait]
impl EventHandler for CacheClearListener {
    async fn handle(&self, topic: &str, event: &Event) {
        let Some(identifiers) = &event.identifiers else {
            warn!(
                topic,
                "session event carried no identifiers, cannot clear authc caches"
            );
            return;
        };
        for realm in &self.realms {
            if let Some(identifier) = identifiers.from_source(realm.name()) {
                debug!(realm = realm.name(), "clearing cached authc info");
                realm.clear_cached_authc_info(identifier).await;
            }
        }
    }
}

/// Two-step construction: the builder collects collaborators and
/// settings, `build` wires the realms and returns the immutable
/// engine.
pub struct AuthenticatorBuilder {
    config: AuthcConfig,
    strategy: AuthenticationStrategy,
    event_bus: Option<Arc<dyn EventBus>>,
    mfa_challenger: Option<Arc<dyn MfaChallenger>>,
    token_registry: TokenRegistry,
}

impl AuthenticatorBuilder {
    pub fn new(config: AuthcConfig) -> Self {
        Self {
            config,
            strategy: AuthenticationStrategy::default(),
            event_bus: None,
            mfa_challenger: None,
            token_registry: standard_registry().clone(),
        }
    }

    pub fn strategy(mut self, strategy: AuthenticationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn mfa_challenger(mut self, challenger: Arc<dyn MfaChallenger>) -> Self {
        self.mfa_challenger = Some(challenger);
        self
    }

    pub fn token_registry(mut self, registry: TokenRegistry) -> Self {
        self.token_registry = registry;
        self
    }

    /// Wires the realms into the engine: builds the token resolver,
    /// designates the locking realm, and registers the cache-clear
    /// listener on the bus.
    pub async fn build(self, realms: Vec<Arc<dyn Realm>>) -> AuthcResult<Authenticator> {
        let token_realm_resolver = TokenRealmResolver::new(&realms);

        let locking_limit = self.config.account_lock_threshold;
        let locking_realm = match locking_limit {
            Some(_) => {
                // The first realm exposing the locking capability
                // locks all accounts.
                let realm = realms
                    .iter()
                    .find(|realm| realm.account_locker().is_some())
                    .cloned();
                match realm {
                    Some(realm) => Some(realm),
                    None => {
                        return Err(AuthcError::configuration(
                            "account_lock_threshold is set but no realm exposes account locking",
                        ))
                    }
                }
            }
            None => None,
        };

        let authenticator = Authenticator {
            realms,
            token_realm_resolver,
            locking_realm,
            locking_limit,
            event_bus: self.event_bus,
            strategy: self.strategy,
            mfa_challenger: self.mfa_challenger,
            token_registry: self.token_registry,
        };
        authenticator.register_cache_clear_listener().await;
        Ok(authenticator)
    }
}

/// The engine itself. Immutable once built; independent calls may run
/// concurrently while realms are consulted sequentially within each
/// call.
pub struct Authenticator {
    realms: Vec<Arc<dyn Realm>>,
    token_realm_resolver: TokenRealmResolver,
    locking_realm: Option<Arc<dyn Realm>>,
    locking_limit: Option<u32>,
    event_bus: Option<Arc<dyn EventBus>>,
    strategy: AuthenticationStrategy,
    mfa_challenger: Option<Arc<dyn MfaChallenger>>,
    token_registry: TokenRegistry,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("realms", &self.realms.len())
            .field("token_realm_resolver", &self.token_realm_resolver)
            .field("locking_realm", &self.locking_realm.is_some())
            .field("locking_limit", &self.locking_limit)
            .field("event_bus", &self.event_bus.is_some())
            .field("strategy", &self.strategy)
            .field("mfa_challenger", &self.mfa_challenger.is_some())
            .field("token_registry", &self.token_registry)
            .finish()
    }
}

impl Authenticator {
    /// Public entry point: validates the submission sequence, attaches
    /// token metadata, dispatches across realms, and post-processes
    /// the verdict into events and an outcome.
    #[instrument(skip(self, prior_identifiers, token), fields(request_id = %Uuid::new_v4()))]
    pub async fn authenticate_account(
        &self,
        prior_identifiers: Option<&IdentifierCollection>,
        mut token: AuthenticationToken,
    ) -> AuthcResult<AuthenticationOutcome> {
        let start = Instant::now();
        let result = self
            .process_authentication(prior_identifiers, &mut token)
            .await;

        let status = match &result {
            Ok(AuthenticationOutcome::Authenticated(_)) => "success",
            Ok(AuthenticationOutcome::AdditionalFactorRequired(_)) => "progress",
            Err(_) => "failure",
        };
        record_authc_attempt(status, start.elapsed());

        match &result {
            Ok(outcome) => info!(
                identifier = ?outcome.identifiers().primary_identifier(),
                status, "authentication processed"
            ),
            Err(err) => warn!(error = %err, "authentication failed"),
        }
        result
    }

    async fn process_authentication(
        &self,
        prior_identifiers: Option<&IdentifierCollection>,
        token: &mut AuthenticationToken,
    ) -> AuthcResult<AuthenticationOutcome> {
        debug!(token = %token, "authentication submission received");

        // A token without an identifier is only legal as an MFA
        // follow-up carrying the prior round's identifiers.
        if token.identifier().is_none() {
            match prior_identifiers.and_then(|ids| ids.primary_identifier()) {
                Some(identifier) => token.set_identifier(identifier),
                None => return Err(AuthcError::InvalidSequence),
            }
        }

        token.attach_metadata(&self.token_registry)?;

        let identifier = token.identifier().unwrap_or_default().to_string();

        match self.do_authenticate_account(token).await {
            Ok(Some(DispatchOutcome::Complete(account))) => {
                let account_id = account.account_id();
                if let Some(primary) = account_id.primary_identifier() {
                    self.notify_event(primary, topics::AUTHENTICATION_SUCCEEDED)
                        .await;
                }
                Ok(AuthenticationOutcome::Authenticated(account_id))
            }
            Ok(Some(DispatchOutcome::AdditionalFactorRequired(account))) => {
                self.notify_event(&identifier, topics::AUTHENTICATION_PROGRESS)
                    .await;
                self.send_mfa_challenge(&identifier).await;
                Ok(AuthenticationOutcome::AdditionalFactorRequired(
                    account.account_id(),
                ))
            }
            Ok(None) => {
                self.notify_event(&identifier, topics::AUTHENTICATION_ACCOUNT_NOT_FOUND)
                    .await;
                Err(AuthcError::account(format!(
                    "no account returned by any configured realm for token [{}]",
                    token
                )))
            }
            Err(AuthcError::Account(message)) => {
                self.notify_event(&identifier, topics::AUTHENTICATION_ACCOUNT_NOT_FOUND)
                    .await;
                Err(AuthcError::Account(message))
            }
            Err(AuthcError::LockedAccount {
                identifier: locked_identifier,
            }) => {
                self.notify_event(&identifier, topics::AUTHENTICATION_FAILED)
                    .await;
                self.notify_event(&identifier, topics::AUTHENTICATION_ACCOUNT_LOCKED)
                    .await;
                Err(AuthcError::LockedAccount {
                    identifier: locked_identifier,
                })
            }
            Err(AuthcError::IncorrectCredentials { failed_attempts }) => {
                self.notify_event(&identifier, topics::AUTHENTICATION_FAILED)
                    .await;
                // May escalate to a locked account, which takes
                // precedence over the credential failure.
                self.validate_locked(token, &failed_attempts).await?;
                Err(AuthcError::IncorrectCredentials { failed_attempts })
            }
            Err(other) => Err(other),
        }
    }

    /// Dispatches the token to its realms and applies the lock check
    /// and MFA gate to the returned account. `Ok(None)` means no realm
    /// produced an account.
    async fn do_authenticate_account(
        &self,
        token: &AuthenticationToken,
    ) -> AuthcResult<Option<DispatchOutcome>> {
        let candidates = self.token_realm_resolver.realms_for(token.kind());
        if candidates.is_empty() {
            return Err(AuthcError::UnsupportedToken(token.kind()));
        }

        // Single-realm deployments bypass strategy selection. The gate
        // is the total realm count, not the candidate count.
        let account = if self.realms.len() == 1 {
            candidates[0]
                .authenticate_account(token)
                .await?
                .map(ResolvedAccount::Single)
        } else {
            let attempt = AuthenticationAttempt::new(token, &self.realms);
            self.strategy.execute(&attempt).await?
        };

        let Some(account) = account else {
            return Ok(None);
        };

        let info = token
            .token_info()
            .ok_or_else(|| AuthcError::internal("token metadata not attached before dispatch"))?;

        let failed_attempts = account.failed_attempts(&info.cred_type).to_vec();
        self.validate_locked(token, &failed_attempts).await?;

        // The account uses MFA when it stores more credential types
        // than this token's tier.
        if account.factor_count() as u32 > info.tier {
            if let Some(identifier) = token.identifier() {
                self.notify_event(identifier, topics::AUTHENTICATION_PROGRESS)
                    .await;
            }
            return Ok(Some(DispatchOutcome::AdditionalFactorRequired(account)));
        }

        Ok(Some(DispatchOutcome::Complete(account)))
    }

    /// Locks the account through the designated realm once the failed
    /// attempt count strictly exceeds the threshold.
    async fn validate_locked(
        &self,
        token: &AuthenticationToken,
        failed_attempts: &[DateTime<Utc>],
    ) -> AuthcResult<()> {
        let Some(limit) = self.locking_limit else {
            return Ok(());
        };
        if failed_attempts.len() as u32 <= limit {
            return Ok(());
        }

        let identifier = token.identifier().unwrap_or_default().to_string();
        if let Some(locker) = self
            .locking_realm
            .as_ref()
            .and_then(|realm| realm.account_locker())
        {
            locker.lock_account(&identifier).await;
        }
        record_account_lock();
        warn!(
            identifier = %identifier,
            "authentication attempts breached threshold, account is now locked"
        );
        self.notify_event(&identifier, topics::AUTHENTICATION_ACCOUNT_LOCKED)
            .await;
        Err(AuthcError::LockedAccount { identifier })
    }

    async fn register_cache_clear_listener(&self) {
        let Some(bus) = &self.event_bus else {
            debug!("no event bus configured, skipping cache-clear registration");
            return;
        };
        let listener = Arc::new(CacheClearListener {
            realms: self.realms.clone(),
        });
        bus.subscribe(topics::SESSION_EXPIRE, listener.clone()).await;
        bus.subscribe(topics::SESSION_STOP, listener).await;
    }

    /// Publication is best-effort: an absent bus or a failing publish
    /// degrades to a warning, never a failure of the call.
    async fn notify_event(&self, identifier: &str, topic: &str) {
        match &self.event_bus {
            Some(bus) => {
                if let Err(err) = bus.publish(topic, Event::with_identifier(identifier)).await {
                    warn!(topic, error = %err, "could not publish event");
                }
            }
            None => warn!(topic, "event bus not configured, dropping event"),
        }
    }

    async fn send_mfa_challenge(&self, identifier: &str) {
        let Some(challenger) = &self.mfa_challenger else {
            return;
        };
        if let Err(err) = challenger.send_challenge(identifier).await {
            warn!(identifier, error = %err, "could not deliver MFA challenge");
        }
    }
}
