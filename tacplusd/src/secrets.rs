//! Mapping from client addresses to pre-shared keys and root handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ConfigHandle;
use crate::handlers::{Handler, StartHandler};

/// Everything the connection driver needs for one accepted connection.
pub struct ConnectionPolicy {
    /// The scope name, for logging.
    pub scope: String,

    /// The scope's pre-shared key.
    pub secret: Vec<u8>,

    /// The root handler installed for every new session on the connection.
    pub handler: Arc<dyn Handler>,
}

/// Resolves an accepted connection's remote address to its connection policy.
///
/// Called exactly once per accepted connection, before any packet is read.
/// Returning `None` drops the connection. Lookups are read-mostly and must
/// not block; the config-backed implementation reads an atomic snapshot.
pub trait SecretProvider: Send + Sync {
    /// Looks up the policy for a connection from `remote_address`.
    fn get(&self, remote_address: SocketAddr) -> Option<ConnectionPolicy>;
}

/// The standard provider: scope lookup over the loaded configuration.
pub struct ConfigSecretProvider {
    config: ConfigHandle,
}

impl ConfigSecretProvider {
    /// Creates a provider over a swappable configuration handle.
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }
}

impl SecretProvider for ConfigSecretProvider {
    fn get(&self, remote_address: SocketAddr) -> Option<ConnectionPolicy> {
        // load() takes the current snapshot; a concurrent reload does not
        // affect connections that are already running
        let snapshot = self.config.load();
        let scope = snapshot.scope_for(remote_address.ip())?;

        Some(ConnectionPolicy {
            scope: scope.name.clone(),
            secret: scope.secret.clone(),
            handler: Arc::new(StartHandler::new(scope)),
        })
    }
}
