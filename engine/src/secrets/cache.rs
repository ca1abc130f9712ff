use crate::secrets::string::SecretString;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory cache of provider API keys, keyed by environment variable name.
///
/// Keys are resolved from the process environment on first use. Tests and
/// embedders can seed values with [`SecretCache::insert`].
#[derive(Clone, Default)]
pub struct SecretCache {
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the secret stored under `env_var`.
    pub fn get_secret(&self, env_var: &str) -> Result<SecretString, EngineError> {
        if let Ok(cache) = self.cache.read() {
            if let Some(secret) = cache.get(env_var) {
                return Ok(secret.clone());
            }
        }

        let raw = std::env::var(env_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                EngineError::LLMProvider(format!("Environment variable {} is not set", env_var))
            })?;
        let secret = SecretString::new(raw);

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(env_var.to_string(), secret.clone());
        }

        Ok(secret)
    }

    /// Seed a secret without touching the environment
    pub fn insert(&self, env_var: impl Into<String>, secret: SecretString) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(env_var.into(), secret);
        }
    }

    pub fn has_secret(&self, env_var: &str) -> bool {
        self.get_secret(env_var).is_ok()
    }
}
