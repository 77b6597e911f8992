pub mod authenticator;
pub mod strategy;
pub mod verifier;


pub use authenticator::{AuthenticationOutcome, Authenticator, AuthenticatorBuilder};
pub use strategy::{AuthenticationAttempt, AuthenticationStrategy};
pub use verifier::{CredentialsVerifier, DefaultCredentialsVerifier};
