use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

/// Cost parameters for the preferred password hash scheme.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlgorithmContext {
    #[serde(default = "default_memory_cost")]
    pub memory_cost: u32,
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for AlgorithmContext {
    fn default() -> Self {
        Self {
            memory_cost: default_memory_cost(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
        }
    }
}

fn default_memory_cost() -> u32 {
    19456 // KiB
}

fn default_time_cost() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

/// Settings consumed by the authentication engine.
///
/// `account_lock_threshold` left unset disables account locking
/// entirely; a positive value is the number of failed attempts an
/// account may accumulate before the engine locks it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthcConfig {
    #[serde(default)]
    pub account_lock_threshold: Option<u32>,
    #[serde(default = "default_preferred_algorithm")]
    pub preferred_algorithm: String,
    #[serde(default)]
    pub preferred_algorithm_context: AlgorithmContext,
    /// Accepted TOTP time-step drift in each direction.
    #[serde(default = "default_totp_window")]
    pub totp_window: u64,
}

impl Default for AuthcConfig {
    fn default() -> Self {
        Self {
            account_lock_threshold: None,
            preferred_algorithm: default_preferred_algorithm(),
            preferred_algorithm_context: AlgorithmContext::default(),
            totp_window: default_totp_window(),
        }
    }
}

fn default_preferred_algorithm() -> String {
    "argon2id".to_string()
}

fn default_totp_window() -> u64 {
    1
}

impl AuthcConfig {
    /// Loads the engine configuration with the usual layering: coded
    /// defaults first, then `config/authc.{run_mode}.toml`, then
    /// `AUTHC__`-prefixed environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "dev".into());
        let defaults = Self::default();

        let mut builder = Config::builder();

        builder = builder
            .set_default(
                "preferred_algorithm",
                defaults.preferred_algorithm.as_str(),
            )?
            .set_default(
                "preferred_algorithm_context.memory_cost",
                defaults.preferred_algorithm_context.memory_cost,
            )?
            .set_default(
                "preferred_algorithm_context.time_cost",
                defaults.preferred_algorithm_context.time_cost,
            )?
            .set_default(
                "preferred_algorithm_context.parallelism",
                defaults.preferred_algorithm_context.parallelism,
            )?
            .set_default("totp_window", defaults.totp_window)?;

        let config_file = format!("config/authc.{}.toml", run_mode);
        builder = builder.add_source(File::with_name(&config_file).required(false));

        builder = builder.add_source(
            Environment::with_prefix("AUTHC")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var("RUN_MODE");
        env::remove_var("AUTHC__ACCOUNT_LOCK_THRESHOLD");
        env::remove_var("AUTHC__PREFERRED_ALGORITHM");
        env::remove_var("AUTHC__TOTP_WINDOW");
    }

    #[test]
    #[serial]
    fn defaults_disable_locking() {
        clear_env();

        let config = AuthcConfig::load().unwrap();
        assert_eq!(config.account_lock_threshold, None);
        assert_eq!(config.preferred_algorithm, "argon2id");
        assert_eq!(config.preferred_algorithm_context.memory_cost, 19456);
        assert_eq!(config.preferred_algorithm_context.time_cost, 2);
        assert_eq!(config.preferred_algorithm_context.parallelism, 1);
        assert_eq!(config.totp_window, 1);
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        clear_env();

        env::set_var("AUTHC__ACCOUNT_LOCK_THRESHOLD", "3");
        env::set_var("AUTHC__PREFERRED_ALGORITHM", "argon2i");
        let config = AuthcConfig::load().unwrap();
        assert_eq!(config.account_lock_threshold, Some(3));
        assert_eq!(config.preferred_algorithm, "argon2i");

        clear_env();
    }
}
