//! Warehouse password lookup.
//!
//! Passwords come from configuration or the environment first, then from the
//! OS keyring. Secrets are only ever read here; storing them is left to the
//! platform's own keyring tooling.

use crate::config::WarehouseConfig;
use crate::error::{AtlasError, Result};
use crate::warehouse::WarehouseBackend;
use keyring::Entry;
use tracing::{debug, warn};

pub const SERVICE_NAME: &str = "sales-atlas";

/// Read-only access to secrets in the OS keyring.
#[derive(Debug, Clone)]
pub struct SecretStorage {
    service: String,
}

impl Default for SecretStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStorage {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Uses a different keyring service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Retrieves a secret from the keyring.
    ///
    /// A missing entry or an unusable keyring both yield `None`; the latter
    /// is logged.
    pub fn retrieve(&self, key: &str) -> Option<String> {
        let entry = match Entry::new(&self.service, key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to access keyring: {e}");
                return None;
            }
        };

        match entry.get_password() {
            Ok(secret) => Some(secret),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!("Failed to retrieve secret from keyring: {e}");
                None
            }
        }
    }

    /// Generates the keyring key for a warehouse login.
    pub fn warehouse_password_key(config: &WarehouseConfig) -> String {
        let scope = match config.backend {
            WarehouseBackend::Snowflake => config.account.as_deref().unwrap_or("default"),
            WarehouseBackend::Postgres => config.host.as_deref().unwrap_or("localhost"),
        };
        let user = config.user.as_deref().unwrap_or("default");
        format!("warehouse:{scope}:{user}")
    }

    /// Masks a secret for display, showing only the last 4 characters.
    pub fn mask_secret(secret: &str) -> String {
        let len = secret.chars().count();
        if len <= 4 {
            "*".repeat(len)
        } else {
            let tail: String = secret.chars().skip(len - 4).collect();
            format!("{}...{tail}", "*".repeat(4))
        }
    }
}

/// Resolves the warehouse password.
///
/// Snowflake always needs one; PostgreSQL may authenticate without it.
pub fn resolve_password(
    config: &WarehouseConfig,
    storage: &SecretStorage,
) -> Result<Option<String>> {
    if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
        debug!(
            "Using configured password {}",
            SecretStorage::mask_secret(password)
        );
        return Ok(Some(password.to_string()));
    }

    let key = SecretStorage::warehouse_password_key(config);
    if let Some(password) = storage.retrieve(&key) {
        debug!("Using keyring password for {key}");
        return Ok(Some(password));
    }

    match config.backend {
        WarehouseBackend::Snowflake => Err(AtlasError::config(format!(
            "no password for {}: set SNOWFLAKE_PASSWORD or add keyring entry '{key}' under service '{}'",
            config.display_string(),
            storage.service
        ))),
        WarehouseBackend::Postgres => Ok(None),
    }
}
