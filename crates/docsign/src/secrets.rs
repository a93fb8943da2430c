//! Stage password resolution.
//!
//! Every approval stage is gated by a password. Deployments supply it in one
//! of three ways, checked in this order:
//!
//! 1. **Direct value** in the config file (`password: "..."`), for local testing
//! 2. **File reference** (`passwordFile: /run/secrets/stage-02a`), for mounted secrets
//! 3. **Env var reference** (`passwordEnvVar: PASSWORD_02A`), the production default

use secrecy::{ExposeSecret, SecretString};
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from a direct value, a file, or an environment variable,
/// in that priority order. Empty sources are skipped.
///
/// ```ignore
/// use docsign::secrets::resolve_secret;
///
/// let password = resolve_secret(None, None, Some("PASSWORD_02A"))?;
/// ```
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return fs::read_to_string(&expanded)
            .map(|content| SecretString::from(content.trim().to_string()))
            .map_err(|e| SecretError::FileReadError {
                path: expanded,
                source: e,
            });
    }

    if let Some(var_name) = env_var.filter(|n| !n.is_empty()) {
        return read_env(var_name).map(SecretString::from);
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but a stage with no configured source yields `None`.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Resolves a non-secret setting (such as a store folder id) from a direct
/// value or an environment variable.
pub fn resolve_setting(direct: Option<&str>, env_var: Option<&str>) -> Result<Option<String>> {
    if let Some(value) = direct.filter(|v| !v.trim().is_empty()) {
        return Ok(Some(value.trim().to_string()));
    }
    match env_var.filter(|n| !n.is_empty()) {
        Some(name) => read_env(name).map(Some),
        None => Ok(None),
    }
}

/// Compares an entered password against the stage secret without
/// short-circuiting on the first differing byte.
pub fn secret_matches(expected: &SecretString, candidate: &str) -> bool {
    let expected = expected.expose_secret().as_bytes();
    let candidate = candidate.as_bytes();
    if expected.len() != candidate.len() {
        return false;
    }
    expected
        .iter()
        .zip(candidate)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn read_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        // Env vars may carry a trailing newline from secret managers
        Ok(value) => Ok(value.trim().to_string()),
        Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
            name: name.to_string(),
        }),
        Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
            name: name.to_string(),
        }),
    }
}

/// Expands a leading `~` to the user's home directory (HOME, then
/// USERPROFILE). `~user/...` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
