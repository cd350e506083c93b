//! API key lookup for the upload endpoints.
//!
//! An endpoint names its key in one of three ways, checked in this order:
//! an inline `api_key`, an `api_key_file` (`~/` allowed), or an
//! `api_key_env` variable. The first one that is set wins, even when reading
//! it fails; later sources are not consulted as a fallback.

use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No API key source configured (api_key, api_key_file or api_key_env)")]
    NoSourceProvided,

    #[error("Failed to read API key file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("API key file '{path}' is empty")]
    EmptyFile { path: PathBuf },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' is not valid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where an endpoint's key comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeySource<'a> {
    Inline(&'a str),
    File(&'a str),
    Env(&'a str),
}

impl<'a> KeySource<'a> {
    fn pick(
        direct: Option<&'a str>,
        file_path: Option<&'a str>,
        env_var: Option<&'a str>,
    ) -> Option<Self> {
        let set = |v: Option<&'a str>| v.filter(|s| !s.trim().is_empty());
        set(direct)
            .map(KeySource::Inline)
            .or_else(|| set(file_path).map(KeySource::File))
            .or_else(|| set(env_var).map(KeySource::Env))
    }

    fn read(self) -> Result<SecretString> {
        let value = match self {
            KeySource::Inline(value) => value.to_string(),
            KeySource::File(path) => {
                let path = expand_home(path);
                let content = fs::read_to_string(&path).map_err(|e| SecretError::FileReadError {
                    path: path.clone(),
                    source: e,
                })?;
                let key = content.trim();
                if key.is_empty() {
                    return Err(SecretError::EmptyFile { path });
                }
                key.to_string()
            }
            KeySource::Env(name) => match std::env::var(name) {
                Ok(value) => value.trim().to_string(),
                Err(std::env::VarError::NotPresent) => {
                    return Err(SecretError::EnvVarNotSet {
                        name: name.to_string(),
                    })
                }
                Err(std::env::VarError::NotUnicode(_)) => {
                    return Err(SecretError::EnvVarNotUnicode {
                        name: name.to_string(),
                    })
                }
            },
        };
        Ok(SecretString::from(value))
    }
}

/// Reads the key from the first configured source.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    KeySource::pick(direct, file_path, env_var)
        .ok_or(SecretError::NoSourceProvided)?
        .read()
}

/// Like [`resolve_secret`], but an endpoint with no source at all yields
/// `None` (it is called without credentials).
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    KeySource::pick(direct, file_path, env_var)
        .map(KeySource::read)
        .transpose()
}

/// `~` and `~/..` are relative to the home directory; `~user` is left alone.
fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => Some(""),
        Some(rest) => rest.strip_prefix('/'),
        None => None,
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
