//! Server configuration: scopes, shared secrets, and per-user policy.
//!
//! A *scope* groups the client devices that share one pre-shared key;
//! usernames are unique within a scope. The loaded configuration is held
//! behind an [`arc_swap::ArcSwap`] so an out-of-band reloader can replace the
//! whole map atomically while connection tasks keep reading the snapshot they
//! started with.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;
use thiserror::Error;

use crate::policy::{
    Accounter, Authenticator, Authorizer, CleartextAuthenticator, LogAccounter, PrefixAuthorizer,
};

/// Errors raised while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML did not match the expected schema.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A scope declared no secret.
    #[error("scope {0:?} has an empty secret")]
    EmptySecret(String),

    /// Two scopes share a name.
    #[error("duplicate scope name {0:?}")]
    DuplicateScope(String),

    /// Two users in one scope share a name.
    #[error("duplicate user {user:?} in scope {scope:?}")]
    DuplicateUser {
        /// The scope holding the duplicate entry.
        scope: String,
        /// The duplicated username.
        user: String,
    },
}

/// Top-level configuration file schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The scopes this server answers for, in lookup order.
    pub scopes: Vec<ScopeConfig>,
}

/// One scope: a shared secret, the clients it covers, and its users.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    /// Scope name, used in logs and for uniqueness.
    pub name: String,

    /// The pre-shared key for obfuscation on this scope's connections.
    pub secret: String,

    /// Client addresses this scope covers: exact IPs, or prefixes ending in
    /// `.`/`:` that are matched against the textual remote IP. An empty list
    /// matches every client, which makes the scope a catch-all.
    #[serde(default)]
    pub clients: Vec<String>,

    /// The users known to this scope.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// Per-user policy configuration. Every capability is optional; a missing
/// capability yields a default-deny verdict for the corresponding AAA flavor.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// Username, unique within its scope.
    pub name: String,

    /// How the user authenticates, if they may.
    #[serde(default)]
    pub authenticator: Option<AuthenticatorConfig>,

    /// What the user is authorized to do, if anything.
    #[serde(default)]
    pub authorizer: Option<AuthorizerConfig>,

    /// Where the user's accounting records go, if anywhere.
    #[serde(default)]
    pub accounter: Option<AccounterConfig>,
}

/// Authenticator backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum AuthenticatorConfig {
    /// Compare against a cleartext password stored in the config file.
    Cleartext {
        /// The expected password.
        password: String,
    },
}

/// Authorizer configuration: prefix rules over `name=value` argument encodings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizerConfig {
    /// Arguments matching any of these prefixes are denied outright.
    #[serde(default)]
    pub deny: Vec<String>,

    /// When non-empty, every mandatory argument must match one of these prefixes.
    #[serde(default)]
    pub permit: Vec<String>,

    /// Verdict when `permit` is empty: permit everything not denied.
    #[serde(default)]
    pub default_permit: bool,
}

/// Accounter backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum AccounterConfig {
    /// Emit each record as a structured log line.
    Log,
}

impl Config {
    /// Reads and validates a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut scope_names = std::collections::HashSet::new();

        for scope in &self.scopes {
            if scope.secret.is_empty() {
                return Err(ConfigError::EmptySecret(scope.name.clone()));
            }
            if !scope_names.insert(scope.name.as_str()) {
                return Err(ConfigError::DuplicateScope(scope.name.clone()));
            }

            let mut user_names = std::collections::HashSet::new();
            for user in &scope.users {
                if !user_names.insert(user.name.as_str()) {
                    return Err(ConfigError::DuplicateUser {
                        scope: scope.name.clone(),
                        user: user.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// A user's resolved policy delegates.
pub struct UserPolicy {
    /// Username.
    pub name: String,

    /// Authentication backend, if the user may authenticate.
    pub authenticator: Option<Arc<dyn Authenticator>>,

    /// Authorization backend, if the user may be authorized.
    pub authorizer: Option<Arc<dyn Authorizer>>,

    /// Accounting backend, if the user's records are accepted.
    pub accounter: Option<Arc<dyn Accounter>>,
}

/// How a scope decides whether a client address belongs to it.
#[derive(Debug, Clone)]
enum ClientMatcher {
    Exact(IpAddr),
    Prefix(String),
}

impl ClientMatcher {
    fn parse(entry: &str) -> Self {
        match entry.parse() {
            Ok(address) => Self::Exact(address),
            Err(_) => Self::Prefix(entry.to_string()),
        }
    }

    fn matches(&self, address: IpAddr) -> bool {
        match self {
            Self::Exact(expected) => *expected == address,
            Self::Prefix(prefix) => address.to_string().starts_with(prefix.as_str()),
        }
    }
}

/// A scope with its policy objects built, ready for per-connection lookup.
pub struct RuntimeScope {
    /// Scope name.
    pub name: String,

    /// The scope's pre-shared key.
    pub secret: Vec<u8>,

    clients: Vec<ClientMatcher>,

    users: HashMap<String, Arc<UserPolicy>>,
}

impl RuntimeScope {
    /// Whether this scope covers the given client address.
    pub fn covers(&self, address: IpAddr) -> bool {
        self.clients.is_empty() || self.clients.iter().any(|matcher| matcher.matches(address))
    }

    /// Looks up a user by name within this scope.
    pub fn user(&self, name: &str) -> Option<Arc<UserPolicy>> {
        self.users.get(name).cloned()
    }
}

/// The loaded configuration in its runtime shape.
pub struct RuntimeConfig {
    scopes: Vec<Arc<RuntimeScope>>,
}

impl RuntimeConfig {
    /// Builds the runtime lookup structures from a validated [`Config`].
    pub fn build(config: &Config) -> Self {
        let scopes = config
            .scopes
            .iter()
            .map(|scope| {
                let users = scope
                    .users
                    .iter()
                    .map(|user| {
                        let policy = UserPolicy {
                            name: user.name.clone(),
                            authenticator: user.authenticator.as_ref().map(|authenticator| {
                                match authenticator {
                                    AuthenticatorConfig::Cleartext { password } => {
                                        Arc::new(CleartextAuthenticator::new(password.clone()))
                                            as Arc<dyn Authenticator>
                                    }
                                }
                            }),
                            authorizer: user.authorizer.as_ref().map(|authorizer| {
                                Arc::new(PrefixAuthorizer::new(
                                    authorizer.deny.clone(),
                                    authorizer.permit.clone(),
                                    authorizer.default_permit,
                                )) as Arc<dyn Authorizer>
                            }),
                            accounter: user.accounter.as_ref().map(|accounter| match accounter {
                                AccounterConfig::Log => {
                                    Arc::new(LogAccounter::default()) as Arc<dyn Accounter>
                                }
                            }),
                        };

                        (user.name.clone(), Arc::new(policy))
                    })
                    .collect();

                Arc::new(RuntimeScope {
                    name: scope.name.clone(),
                    secret: scope.secret.clone().into_bytes(),
                    clients: scope.clients.iter().map(|entry| ClientMatcher::parse(entry)).collect(),
                    users,
                })
            })
            .collect();

        Self { scopes }
    }

    /// Returns the first scope covering the given client address.
    pub fn scope_for(&self, address: IpAddr) -> Option<Arc<RuntimeScope>> {
        self.scopes
            .iter()
            .find(|scope| scope.covers(address))
            .cloned()
    }
}

/// Shared handle to the current configuration; reloads swap the inner arc.
pub type ConfigHandle = Arc<ArcSwap<RuntimeConfig>>;

/// Wraps a built [`RuntimeConfig`] into a swappable handle.
pub fn config_handle(runtime: RuntimeConfig) -> ConfigHandle {
    Arc::new(ArcSwap::from_pointee(runtime))
}
