//! Core authentication engine of a pluggable security framework.
//!
//! The engine takes a submitted credential token, dispatches it across
//! one or more pluggable credential stores (realms), folds their
//! verdicts with a configurable combination strategy, coordinates
//! multi-factor progression, enforces account locking on repeated
//! failure, and publishes lifecycle events. It is a pure coordinator:
//! credential storage, hash libraries' policy, challenge delivery, and
//! the bus transport stay behind the contracts in [`domain`] and
//! [`infrastructure`].

pub mod authc;
pub mod common;
pub mod domain;
pub mod infrastructure;

pub use authc::{
    AuthenticationOutcome, AuthenticationStrategy, Authenticator, AuthenticatorBuilder,
    CredentialsVerifier, DefaultCredentialsVerifier,
};
pub use common::config::AuthcConfig;
pub use common::error::{AuthcError, AuthcResult};
pub use domain::account::{
    Account, CompositeAccount, CredentialRecord, IdentifierCollection, ResolvedAccount,
};
pub use domain::realm::{AccountLocker, MfaChallenger, Realm};
pub use domain::token::{
    standard_registry, AuthenticationToken, TokenError, TokenKind, TokenMetadata, TokenRegistry,
};
pub use infrastructure::event_bus::{topics, Event, EventBus, EventHandler, InMemoryEventBus};
