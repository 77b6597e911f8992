use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::common::error::{AuthcError, AuthcResult};

/// Discriminant for the credential kinds the engine can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    UsernamePassword,
    Totp,
}

/// Engine metadata attached to a token immediately before dispatch.
///
/// `tier` orders MFA factors (1 = primary); `cred_type` names the
/// credential column stored in an account's authentication info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub tier: u32,
    pub cred_type: String,
}

impl TokenMetadata {
    pub fn new(tier: u32, cred_type: impl Into<String>) -> Self {
        Self {
            tier,
            cred_type: cred_type.into(),
        }
    }
}

/// Per-kind metadata table. One process-wide standard instance exists;
/// builders may substitute their own for tests or custom kinds.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    entries: HashMap<TokenKind, TokenMetadata>,
}

impl TokenRegistry {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The standard table: passwords are the primary factor, TOTP the
    /// second.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(TokenKind::UsernamePassword, TokenMetadata::new(1, "password"));
        registry.register(TokenKind::Totp, TokenMetadata::new(2, "totp_key"));
        registry
    }

    pub fn register(&mut self, kind: TokenKind, metadata: TokenMetadata) {
        self.entries.insert(kind, metadata);
    }

    pub fn metadata(&self, kind: TokenKind) -> Option<&TokenMetadata> {
        self.entries.get(&kind)
    }
}

static STANDARD_REGISTRY: Lazy<TokenRegistry> = Lazy::new(TokenRegistry::standard);

pub fn standard_registry() -> &'static TokenRegistry {
    &STANDARD_REGISTRY
}

/// A token construction failure; raised before the engine is involved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("username must be defined")]
    EmptyIdentifier,
    #[error("TOTP code must be a 6-digit integer, got: {0}")]
    InvalidTotpCode(u32),
}

/// The submitted credential payload, normalized at construction.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// UTF-8 password bytes.
    Password(Vec<u8>),
    /// A 6-digit TOTP code in `[100_000, 999_999]`.
    TotpCode(u32),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never render the payload itself.
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::TotpCode(_) => f.write_str("TotpCode(<redacted>)"),
        }
    }
}

/// A typed credential submission: identifier, opaque credentials,
/// remember-me flag, optional originating host, and the engine-attached
/// [`TokenMetadata`].
#[derive(Debug, Clone)]
pub struct AuthenticationToken {
    identifier: Option<String>,
    credentials: Credentials,
    remember_me: bool,
    host: Option<String>,
    token_info: Option<TokenMetadata>,
}

impl AuthenticationToken {
    /// Builds a username/password submission. The username must be
    /// non-empty; the password is normalized to its UTF-8 bytes.
    pub fn username_password(
        username: impl Into<String>,
        password: impl Into<Vec<u8>>,
        remember_me: bool,
        host: Option<String>,
    ) -> Result<Self, TokenError> {
        let username = username.into();
        if username.is_empty() {
            return Err(TokenError::EmptyIdentifier);
        }
        Ok(Self {
            identifier: Some(username),
            credentials: Credentials::Password(password.into()),
            remember_me,
            host,
            token_info: None,
        })
    }

    /// Builds a TOTP follow-up submission. The identifier is attached
    /// by the engine from the prior round's identifiers.
    pub fn totp(code: u32, remember_me: bool) -> Result<Self, TokenError> {
        if !(100_000..=999_999).contains(&code) {
            return Err(TokenError::InvalidTotpCode(code));
        }
        Ok(Self {
            identifier: None,
            credentials: Credentials::TotpCode(code),
            remember_me,
            host: None,
            token_info: None,
        })
    }

    pub fn kind(&self) -> TokenKind {
        match self.credentials {
            Credentials::Password(_) => TokenKind::UsernamePassword,
            Credentials::TotpCode(_) => TokenKind::Totp,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_remember_me(&self) -> bool {
        self.remember_me
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Metadata attached by the engine; `None` until dispatch.
    pub fn token_info(&self) -> Option<&TokenMetadata> {
        self.token_info.as_ref()
    }

    pub(crate) fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = Some(identifier.into());
    }

    /// Resolves and attaches registry metadata for this token's kind.
    pub(crate) fn attach_metadata(&mut self, registry: &TokenRegistry) -> AuthcResult<()> {
        let metadata = registry
            .metadata(self.kind())
            .ok_or(AuthcError::UnsupportedToken(self.kind()))?;
        self.token_info = Some(metadata.clone());
        Ok(())
    }
}

impl fmt::Display for AuthenticationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} - {}, remember_me={}",
            self.kind(),
            self.identifier.as_deref().unwrap_or("<unidentified>"),
            self.remember_me
        )?;
        if let Some(host) = &self.host {
            write!(f, ", ({})", host)?;
        }
        Ok(())
    }
}
