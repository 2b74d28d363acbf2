//! Credential discovery.
//!
//! Encapsulates the ambient-environment credentials lookup as an
//! alternative to passing a key/secret pair directly to the configuration
//! builder.

use std::env;

use crate::constants::{ENV_KEY_ID, ENV_SECRET_KEY};
use crate::error::{Result, StreamError};

/// An API key/secret pair used for the `auth` handshake step.
#[derive(Clone)]
pub struct Credentials {
    pub(crate) key: String,
    pub(crate) secret: String,
}

impl Credentials {
    /// Build credentials directly from a key and secret.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// Discover credentials from the process environment.
    ///
    /// Looks up `DATA_PROXY_KEY` and `DATA_PROXY_SECRET`. Returns
    /// [`StreamError::InvalidArgument`] if either is missing or empty.
    pub fn from_env() -> Result<Self> {
        let key = env::var(ENV_KEY_ID)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                StreamError::InvalidArgument(format!("{ENV_KEY_ID} is not set"))
            })?;
        let secret = env::var(ENV_SECRET_KEY)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                StreamError::InvalidArgument(format!("{ENV_SECRET_KEY} is not set"))
            })?;
        Ok(Self { key, secret })
    }

    /// The API key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The API secret.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn from_env_reads_both_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var(ENV_KEY_ID, "k1");
            env::set_var(ENV_SECRET_KEY, "s1");
        }
        let creds = Credentials::from_env().unwrap();
        assert_eq!(creds.key(), "k1");
        assert_eq!(creds.secret(), "s1");
        unsafe {
            env::remove_var(ENV_KEY_ID);
            env::remove_var(ENV_SECRET_KEY);
        }
    }

    #[test]
    fn from_env_fails_when_missing() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var(ENV_KEY_ID);
            env::remove_var(ENV_SECRET_KEY);
        }
        assert!(Credentials::from_env().is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = Credentials::new("key", "verysecret");
        let out = format!("{creds:?}");
        assert!(!out.contains("verysecret"));
    }
}
