use std::collections::HashMap;

use argon2::password_hash::PasswordHash;
use argon2::{Algorithm, Argon2, Params, PasswordVerifier, Version};
use base32::Alphabet;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::common::config::AuthcConfig;
use crate::common::error::{AuthcError, AuthcResult};
use crate::domain::account::CredentialRecord;
use crate::domain::token::{AuthenticationToken, Credentials};

const TOTP_STEP_SECONDS: i64 = 30;
const TOTP_MODULUS: u32 = 1_000_000;

/// Realm-internal collaborator that compares a submitted credential
/// payload against the stored form for the token's credential type.
pub trait CredentialsVerifier: Send + Sync {
    fn verify_credentials(
        &self,
        token: &AuthenticationToken,
        authc_info: &HashMap<String, CredentialRecord>,
    ) -> AuthcResult<()>;
}

/// Verification backends for the built-in token kinds: Argon2 password
/// hashes and RFC 6238 TOTP codes.
#[derive(Debug)]
pub struct DefaultCredentialsVerifier {
    password_context: Argon2<'static>,
    totp_window: u64,
}

impl DefaultCredentialsVerifier {
    /// Builds the password crypt context from the configured preferred
    /// algorithm and its cost parameters.
    pub fn from_config(config: &AuthcConfig) -> AuthcResult<Self> {
        let algorithm = match config.preferred_algorithm.as_str() {
            "argon2d" => Algorithm::Argon2d,
            "argon2i" => Algorithm::Argon2i,
            "argon2id" => Algorithm::Argon2id,
            other => {
                return Err(AuthcError::configuration(format!(
                    "unsupported password hash scheme: {}",
                    other
                )))
            }
        };

        let context = &config.preferred_algorithm_context;
        let params = Params::new(
            context.memory_cost,
            context.time_cost,
            context.parallelism,
            None,
        )
        .map_err(|e| {
            AuthcError::configuration(format!("invalid password hash parameters: {}", e))
        })?;

        Ok(Self {
            password_context: Argon2::new(algorithm, Version::V0x13, params),
            totp_window: config.totp_window,
        })
    }

    fn stored_credential<'a>(
        token: &AuthenticationToken,
        authc_info: &'a HashMap<String, CredentialRecord>,
    ) -> AuthcResult<&'a CredentialRecord> {
        let cred_type = token
            .token_info()
            .map(|info| info.cred_type.as_str())
            .ok_or_else(|| AuthcError::internal("token metadata not attached before dispatch"))?;

        authc_info.get(cred_type).ok_or_else(|| {
            AuthcError::account(format!(
                "{} is required but unavailable from authc_info",
                cred_type
            ))
        })
    }

    fn verify_password(&self, submitted: &[u8], record: &CredentialRecord) -> AuthcResult<()> {
        let parsed = PasswordHash::new(&record.credential)
            .map_err(|_| AuthcError::incorrect_credentials(record.failed_attempts.clone()))?;

        self.password_context
            .verify_password(submitted, &parsed)
            .map_err(|_| AuthcError::incorrect_credentials(record.failed_attempts.clone()))
    }

    fn verify_totp(&self, code: u32, record: &CredentialRecord) -> AuthcResult<()> {
        self.verify_totp_at(code, record, Utc::now().timestamp())
    }

    fn verify_totp_at(&self, code: u32, record: &CredentialRecord, now: i64) -> AuthcResult<()> {
        let rejected = || AuthcError::incorrect_credentials(record.failed_attempts.clone());

        let secret = base32::decode(Alphabet::RFC4648 { padding: false }, &record.credential)
            .ok_or_else(rejected)?;
        if secret.is_empty() {
            return Err(rejected());
        }

        let step = (now / TOTP_STEP_SECONDS) as u64;
        for drift in 0..=self.totp_window {
            if hotp(&secret, step.wrapping_add(drift)) == code {
                return Ok(());
            }
            if drift > 0 && hotp(&secret, step.saturating_sub(drift)) == code {
                return Ok(());
            }
        }
        Err(rejected())
    }
}

impl CredentialsVerifier for DefaultCredentialsVerifier {
    fn verify_credentials(
        &self,
        token: &AuthenticationToken,
        authc_info: &HashMap<String, CredentialRecord>,
    ) -> AuthcResult<()> {
        let record = Self::stored_credential(token, authc_info)?;
        match token.credentials() {
            Credentials::Password(submitted) => self.verify_password(submitted, record),
            Credentials::TotpCode(code) => self.verify_totp(*code, record),
        }
    }
}

/// RFC 4226 dynamic truncation over HMAC-SHA1, reduced to six digits.
fn hotp(secret: &[u8], counter: u64) -> u32 {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[19] & 0x0f) as usize;
    let binary = u32::from(digest[offset] & 0x7f) << 24
        | u32::from(digest[offset + 1]) << 16
        | u32::from(digest[offset + 2]) << 8
        | u32::from(digest[offset + 3]);

    binary % TOTP_MODULUS
}
