use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::common::error::{AuthcError, AuthcResult};
use crate::domain::account::{Account, CompositeAccount, ResolvedAccount};
use crate::domain::realm::Realm;
use crate::domain::token::AuthenticationToken;

/// Immutable pairing of a token with the realms a strategy iterates.
pub struct AuthenticationAttempt<'a> {
    token: &'a AuthenticationToken,
    realms: &'a [Arc<dyn Realm>],
}

impl<'a> AuthenticationAttempt<'a> {
    pub fn new(token: &'a AuthenticationToken, realms: &'a [Arc<dyn Realm>]) -> Self {
        Self { token, realms }
    }

    pub fn token(&self) -> &AuthenticationToken {
        self.token
    }

    pub fn realms(&self) -> &[Arc<dyn Realm>] {
        self.realms
    }
}

/// Policy for folding multiple realms' verdicts into one outcome.
///
/// All three consult realms sequentially in the order given at init,
/// skipping realms that do not support the token's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticationStrategy {
    /// Every supporting realm must succeed. The first raised error
    /// aborts the attempt immediately; later realms are not consulted,
    /// avoiding unnecessary backend I/O.
    AllRealmsSuccessful,
    /// Any single success wins; per-realm errors are collected and
    /// only surface when no realm succeeded.
    AtLeastOneRealmSuccessful,
    /// The first realm to return an account wins outright and ends the
    /// iteration.
    #[default]
    FirstRealmSuccessful,
}

impl AuthenticationStrategy {
    pub async fn execute(
        &self,
        attempt: &AuthenticationAttempt<'_>,
    ) -> AuthcResult<Option<ResolvedAccount>> {
        match self {
            Self::AllRealmsSuccessful => all_realms_successful(attempt).await,
            Self::AtLeastOneRealmSuccessful => at_least_one_realm_successful(attempt).await,
            Self::FirstRealmSuccessful => first_realm_successful(attempt).await,
        }
    }
}

/// Collects per-realm successes, promoting to a composite on the
/// second one.
struct AccountAggregator {
    first: Option<(String, Account)>,
    composite: Option<CompositeAccount>,
}

impl AccountAggregator {
    fn new() -> Self {
        Self {
            first: None,
            composite: None,
        }
    }

    fn push(&mut self, realm_name: &str, account: Account) {
        let Some((first_name, first_account)) = &self.first else {
            self.first = Some((realm_name.to_string(), account));
            return;
        };
        let composite = self.composite.get_or_insert_with(CompositeAccount::new);
        if composite.sub_accounts().is_empty() {
            composite.append_realm_account(first_name.clone(), first_account.clone());
        }
        composite.append_realm_account(realm_name, account);
    }

    fn succeeded(&self) -> bool {
        self.first.is_some()
    }

    fn finish(self) -> Option<ResolvedAccount> {
        match self.composite {
            Some(composite) => Some(ResolvedAccount::Composite(composite)),
            None => self.first.map(|(_, account)| ResolvedAccount::Single(account)),
        }
    }
}

async fn all_realms_successful(
    attempt: &AuthenticationAttempt<'_>,
) -> AuthcResult<Option<ResolvedAccount>> {
    let token = attempt.token();
    let mut aggregator = AccountAggregator::new();

    for realm in attempt.realms() {
        if !realm.supports(token) {
            continue;
        }
        // Any error short-circuits the whole attempt.
        if let Some(account) = realm.authenticate_account(token).await? {
            aggregator.push(realm.name(), account);
        }
    }

    Ok(aggregator.finish())
}

async fn at_least_one_realm_successful(
    attempt: &AuthenticationAttempt<'_>,
) -> AuthcResult<Option<ResolvedAccount>> {
    let token = attempt.token();
    let mut realm_errors: HashMap<String, AuthcError> = HashMap::new();
    let mut aggregator = AccountAggregator::new();

    for realm in attempt.realms() {
        if !realm.supports(token) {
            continue;
        }
        match realm.authenticate_account(token).await {
            Ok(Some(account)) => aggregator.push(realm.name(), account),
            Ok(None) => {}
            Err(err) => {
                debug!(realm = realm.name(), error = %err, "realm consultation failed");
                realm_errors.insert(realm.name().to_string(), err);
            }
        }
    }

    if aggregator.succeeded() {
        // Errors from the other realms are dropped on any success.
        return Ok(aggregator.finish());
    }
    if !realm_errors.is_empty() {
        return Err(AuthcError::MultiRealm(realm_errors));
    }
    Ok(None)
}

async fn first_realm_successful(
    attempt: &AuthenticationAttempt<'_>,
) -> AuthcResult<Option<ResolvedAccount>> {
    let token = attempt.token();
    let mut realm_errors: HashMap<String, AuthcError> = HashMap::new();

    for realm in attempt.realms() {
        if !realm.supports(token) {
            continue;
        }
        match realm.authenticate_account(token).await {
            Ok(Some(account)) => return Ok(Some(ResolvedAccount::Single(account))),
            Ok(None) => {}
            Err(err) => {
                debug!(realm = realm.name(), error = %err, "realm consultation failed");
                realm_errors.insert(realm.name().to_string(), err);
            }
        }
    }

    let mut drained = realm_errors.into_iter();
    match (drained.next(), drained.next()) {
        (None, _) => Ok(None),
        (Some((_, err)), None) => {
            if err.is_authentication_failure() {
                Err(err)
            } else {
                Err(AuthcError::Authentication {
                    message: "Unable to authenticate realm account".to_string(),
                    source: Box::new(err),
                })
            }
        }
        (Some((name_a, err_a)), Some((name_b, err_b))) => {
            let mut bundled: HashMap<String, AuthcError> = drained.collect();
            bundled.insert(name_a, err_a);
            bundled.insert(name_b, err_b);
            Err(AuthcError::MultiRealm(bundled))
        }
    }
}
