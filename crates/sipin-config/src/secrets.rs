//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"MEDIAHAVEN_PASSWORD"`).
//! - At startup, callers invoke [`resolve_secrets`] once and pass the result
//!   into client constructors; `std::env::var` is not scattered elsewhere.
//! - `Debug` impls on all secret-containing structs **redact** values.
//! - Error messages reference the env var **NAME**, never the value.

use anyhow::{bail, Result};

use crate::AppConfig;

/// MediaHaven ROPC grant credentials. **Values are redacted in `Debug` output.**
#[derive(Clone, PartialEq, Eq)]
pub struct MediaHavenCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for MediaHavenCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHavenCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// All runtime-resolved secrets for one process.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Postgres connection URL (embeds credentials).
    pub database_url: String,
    pub mediahaven: MediaHavenCredentials,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url", &"<REDACTED>")
            .field("mediahaven", &self.mediahaven)
            .finish()
    }
}

/// Resolve a named environment variable.
/// Returns `None` if the variable is unset or its value is blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve every secret named by `cfg` from the process environment.
///
/// # Errors
/// Returns `Err` with the **env var NAME** of the first missing variable.
pub fn resolve_secrets(cfg: &AppConfig) -> Result<ResolvedSecrets> {
    resolve_secrets_with(cfg, resolve_env)
}

/// [`resolve_secrets`] with an injectable lookup, so tests never mutate the
/// process environment.
pub fn resolve_secrets_with<F>(cfg: &AppConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let require = |var: &str, what: &str| -> Result<String> {
        match lookup(var) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => bail!(
                "SECRETS_MISSING: required env var '{}' ({}) is not set or empty",
                var,
                what
            ),
        }
    };

    let keys = &cfg.mediahaven.keys_env;
    Ok(ResolvedSecrets {
        database_url: require(&cfg.db.url_env, "database url")?,
        mediahaven: MediaHavenCredentials {
            client_id: require(&keys.client_id, "mediahaven client_id")?,
            client_secret: require(&keys.client_secret, "mediahaven client_secret")?,
            username: require(&keys.username, "mediahaven username")?,
            password: require(&keys.password, "mediahaven password")?,
        },
    })
}
