use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::token::TokenKind;

/// Failure taxonomy of the authentication engine.
///
/// Every kind is distinguishable by the caller; the owning security
/// manager matches on the variant to decide what to persist, retry, or
/// surface to the user.
#[derive(Debug, Error)]
pub enum AuthcError {
    /// A token without an identifier was submitted outside of an MFA
    /// follow-up round.
    #[error("authentication must be performed in expected sequence")]
    InvalidSequence,

    /// The token kind is not registered, or no realm supports it.
    #[error("unsupported token kind: {0:?}")]
    UnsupportedToken(TokenKind),

    /// Credentials were rejected by the verifier. Carries the failed
    /// attempt timestamps the realm observed for this credential type
    /// so the lock check needs no second lookup.
    #[error("incorrect credentials submitted")]
    IncorrectCredentials {
        failed_attempts: Vec<DateTime<Utc>>,
    },

    /// The account is locked, either read from the realm or locked
    /// just now by the engine.
    #[error("account is locked for: {identifier}")]
    LockedAccount { identifier: String },

    /// No realm returned an account, or stored credentials were
    /// missing from the account's authentication info.
    #[error("account error: {0}")]
    Account(String),

    /// Two or more realms raised while a strategy consulted them.
    /// Bundles the per-realm failures keyed by realm name.
    #[error("authentication failed in {} realm(s)", .0.len())]
    MultiRealm(HashMap<String, AuthcError>),

    /// A non-authentication realm failure wrapped during strategy
    /// aggregation.
    #[error("{message}")]
    Authentication {
        message: String,
        #[source]
        source: Box<AuthcError>,
    },

    /// The engine or verifier was mis-configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A realm-internal fault (backend I/O, storage corruption).
    #[error("internal realm error: {0}")]
    Internal(String),
}

impl AuthcError {
    pub fn incorrect_credentials(failed_attempts: Vec<DateTime<Utc>>) -> Self {
        Self::IncorrectCredentials { failed_attempts }
    }

    pub fn account(message: impl Into<String>) -> Self {
        Self::Account(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this failure is an authentication verdict, as opposed
    /// to an infrastructure fault a strategy must wrap before
    /// re-raising.
    pub fn is_authentication_failure(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

pub type AuthcResult<T> = Result<T, AuthcError>;
