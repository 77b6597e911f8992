use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ordered set of `(source, identifier)` pairs carried across MFA
/// rounds. The primary identifier is the first-inserted pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierCollection {
    sources: Vec<(String, String)>,
}

impl IdentifierCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-source collection, the common case for one realm.
    pub fn with(source: impl Into<String>, identifier: impl Into<String>) -> Self {
        let mut collection = Self::new();
        collection.add(source, identifier);
        collection
    }

    /// Adds a pair, preserving insertion order. A source already
    /// present keeps its original identifier.
    pub fn add(&mut self, source: impl Into<String>, identifier: impl Into<String>) {
        let source = source.into();
        if self.from_source(&source).is_none() {
            self.sources.push((source, identifier.into()));
        }
    }

    pub fn primary_identifier(&self) -> Option<&str> {
        self.sources.first().map(|(_, identifier)| identifier.as_str())
    }

    pub fn from_source(&self, source: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, identifier)| identifier.as_str())
    }

    pub fn merge(&mut self, other: &IdentifierCollection) {
        for (source, identifier) in &other.sources {
            self.add(source.clone(), identifier.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sources
            .iter()
            .map(|(source, identifier)| (source.as_str(), identifier.as_str()))
    }
}

/// One stored credential entry plus its failure history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Stored form: a PHC hash string for passwords, a base32 shared
    /// key for TOTP.
    pub credential: String,
    #[serde(default)]
    pub failed_attempts: Vec<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            failed_attempts: Vec::new(),
        }
    }

    pub fn with_failed_attempts(mut self, failed_attempts: Vec<DateTime<Utc>>) -> Self {
        self.failed_attempts = failed_attempts;
        self
    }
}

/// A realm's verdict record for a token: identity, stored credentials
/// keyed by credential type, and failure history. The number of
/// entries in `authc_info` is the account's MFA depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: IdentifierCollection,
    pub authc_info: HashMap<String, CredentialRecord>,
}

impl Account {
    pub fn new(account_id: IdentifierCollection) -> Self {
        Self {
            account_id,
            authc_info: HashMap::new(),
        }
    }

    pub fn with_credential(
        mut self,
        cred_type: impl Into<String>,
        record: CredentialRecord,
    ) -> Self {
        self.authc_info.insert(cred_type.into(), record);
        self
    }

    pub fn failed_attempts(&self, cred_type: &str) -> &[DateTime<Utc>] {
        self.authc_info
            .get(cred_type)
            .map(|record| record.failed_attempts.as_slice())
            .unwrap_or(&[])
    }
}

/// Per-realm sub-accounts accumulated when two or more realms return
/// accounts for the same token. Exists only with at least two entries,
/// all with distinct realm names.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeAccount {
    sub_accounts: Vec<(String, Account)>,
}

impl CompositeAccount {
    pub(crate) fn new() -> Self {
        Self {
            sub_accounts: Vec::new(),
        }
    }

    pub(crate) fn append_realm_account(&mut self, realm_name: impl Into<String>, account: Account) {
        let realm_name = realm_name.into();
        debug_assert!(
            self.sub_accounts.iter().all(|(name, _)| *name != realm_name),
            "duplicate realm name in composite account"
        );
        self.sub_accounts.push((realm_name, account));
    }

    pub fn sub_accounts(&self) -> &[(String, Account)] {
        &self.sub_accounts
    }

    /// Union of the sub-accounts' identifiers in realm order.
    pub fn account_id(&self) -> IdentifierCollection {
        let mut merged = IdentifierCollection::new();
        for (_, account) in &self.sub_accounts {
            merged.merge(&account.account_id);
        }
        merged
    }

    fn credential_types(&self) -> impl Iterator<Item = &str> {
        let mut seen = Vec::new();
        for (_, account) in &self.sub_accounts {
            for cred_type in account.authc_info.keys() {
                if !seen.contains(&cred_type.as_str()) {
                    seen.push(cred_type.as_str());
                }
            }
        }
        seen.into_iter()
    }
}

/// The account a strategy hands back: a single realm's verdict, or a
/// composite across several.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAccount {
    Single(Account),
    Composite(CompositeAccount),
}

impl ResolvedAccount {
    pub fn account_id(&self) -> IdentifierCollection {
        match self {
            Self::Single(account) => account.account_id.clone(),
            Self::Composite(composite) => composite.account_id(),
        }
    }

    /// Failure history for one credential type; empty when missing.
    /// For a composite the first sub-account carrying the type wins.
    pub fn failed_attempts(&self, cred_type: &str) -> &[DateTime<Utc>] {
        match self {
            Self::Single(account) => account.failed_attempts(cred_type),
            Self::Composite(composite) => composite
                .sub_accounts
                .iter()
                .find_map(|(_, account)| account.authc_info.get(cred_type))
                .map(|record| record.failed_attempts.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// MFA depth: the number of distinct credential types stored for
    /// the account.
    pub fn factor_count(&self) -> usize {
        match self {
            Self::Single(account) => account.authc_info.len(),
            Self::Composite(composite) => composite.credential_types().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn account_for(realm: &str, identifier: &str) -> Account {
        Account::new(IdentifierCollection::with(realm, identifier))
            .with_credential("password", CredentialRecord::new("$argon2id$stub"))
    }

    #[test]
    fn primary_identifier_is_first_inserted() {
        let mut identifiers = IdentifierCollection::with("R1", "alice");
        identifiers.add("R2", "alice@x");

        assert_eq!(identifiers.primary_identifier(), Some("alice"));
        assert_eq!(identifiers.from_source("R2"), Some("alice@x"));
        assert_eq!(identifiers.from_source("R3"), None);
    }

    #[test]
    fn duplicate_source_keeps_original_identifier() {
        let mut identifiers = IdentifierCollection::with("R1", "alice");
        identifiers.add("R1", "impostor");

        assert_eq!(identifiers.len(), 1);
        assert_eq!(identifiers.from_source("R1"), Some("alice"));
    }

    #[test]
    fn composite_merges_identifiers_in_realm_order() {
        let mut composite = CompositeAccount::new();
        composite.append_realm_account("R1", account_for("R1", "alice"));
        composite.append_realm_account("R2", account_for("R2", "alice@x"));

        let merged = composite.account_id();
        assert_eq!(merged.primary_identifier(), Some("alice"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn composite_factor_count_spans_sub_accounts() {
        let mut composite = CompositeAccount::new();
        composite.append_realm_account("R1", account_for("R1", "alice"));
        composite.append_realm_account(
            "R2",
            Account::new(IdentifierCollection::with("R2", "alice@x"))
                .with_credential("totp_key", CredentialRecord::new("JBSWY3DPEHPK3PXP")),
        );

        let resolved = ResolvedAccount::Composite(composite);
        assert_eq!(resolved.factor_count(), 2);
    }

    #[test]
    fn missing_credential_type_has_no_failed_attempts() {
        let resolved = ResolvedAccount::Single(account_for("R1", "alice"));
        assert!(resolved.failed_attempts("totp_key").is_empty());
    }
}
