//! Driver
//!
//! Entry point of the client API: parses the server address, resolves the
//! encryption settings once, and hands out sessions from a bounded pool.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bolt::codec::DEFAULT_MAX_MESSAGE_SIZE;
use crate::bolt::AuthToken;

use super::connection::{connect, ConnectOptions, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_USER_AGENT};
use super::error::{DriverError, DriverResult};
use super::pool::{PoolMetrics, SessionPool};
use super::session::Session;
#[cfg(feature = "tls")]
use super::tls::TlsConnector;

/// The only URL scheme the driver accepts.
pub const BOLT_SCHEME: &str = "bolt";

/// Port used when the URL names none.
pub const DEFAULT_PORT: u16 = 7687;

/// Default upper bound on idle pooled sessions.
pub const DEFAULT_MAX_POOL_SIZE: usize = 50;

// ============================================================================
// TrustStrategy
// ============================================================================

/// How server certificates are checked on encrypted connections.
///
/// Variants are ordered from least to most strict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustStrategy {
    /// Accept any certificate
    #[default]
    TrustAllCertificates,
    /// Require a certificate signed by a trusted authority
    TrustSignedCertificates,
}

// ============================================================================
// ServerAddress
// ============================================================================

/// Host and port of the database server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `bolt://host[:port][/path]`.
    ///
    /// Any other scheme is a protocol error. IPv6 hosts are written in
    /// brackets (`bolt://[::1]:7687`). A path, query or fragment is ignored.
    pub fn parse_url(url: &str) -> DriverResult<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| DriverError::configuration(format!("Invalid URL '{}'", url)))?;
        if scheme != BOLT_SCHEME {
            return Err(DriverError::protocol(format!(
                "Unsupported URI scheme: {} in url: {}. Only '{}' is supported.",
                scheme, url, BOLT_SCHEME
            )));
        }

        let authority = match rest.find(|c: char| matches!(c, '/' | '?' | '#')) {
            Some(end) => &rest[..end],
            None => rest,
        };
        let (host, port) = match authority.strip_prefix('[') {
            Some(bracketed) => {
                let (host, after) = bracketed.split_once(']').ok_or_else(|| {
                    DriverError::configuration(format!("Unclosed '[' in url: {}", url))
                })?;
                match after {
                    "" => (host, None),
                    _ => match after.strip_prefix(':') {
                        Some(port) => (host, Some(port)),
                        None => {
                            return Err(DriverError::configuration(format!(
                                "Unexpected '{}' after host in url: {}",
                                after, url
                            )))
                        }
                    },
                }
            }
            None => match authority.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            },
        };

        let port = match port {
            Some(port) => port.parse().map_err(|_| {
                DriverError::configuration(format!("Invalid port '{}' in url: {}", port, url))
            })?,
            None => DEFAULT_PORT,
        };
        if host.is_empty() {
            return Err(DriverError::configuration(format!("Missing host in url: {}", url)));
        }

        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ============================================================================
// DriverConfig
// ============================================================================

/// Driver settings.
///
/// Everything except the credentials can be loaded with serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Encrypt connections. Unset means plaintext, with a one-time warning.
    pub encrypted: Option<bool>,
    pub trust: TrustStrategy,
    /// Most idle sessions kept for reuse
    pub max_pool_size: usize,
    #[serde(skip)]
    pub auth: AuthToken,
    pub user_agent: String,
    pub connection_timeout: Duration,
    /// Largest reply message accepted, in bytes
    pub max_message_size: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            encrypted: None,
            trust: TrustStrategy::default(),
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            auth: AuthToken::none(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl DriverConfig {
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }
}

/// Consuming builder for [`DriverConfig`].
#[derive(Debug, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.config.encrypted = Some(encrypted);
        self
    }

    pub fn with_trust(mut self, trust: TrustStrategy) -> Self {
        self.config.trust = trust;
        self
    }

    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.config.max_pool_size = size;
        self
    }

    pub fn with_auth(mut self, auth: AuthToken) -> Self {
        self.config.auth = auth;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn build(self) -> DriverConfig {
        self.config
    }
}

static INSECURE_DEFAULT_WARNED: AtomicBool = AtomicBool::new(false);

/// Emits the plaintext-default notice once per process. Returns whether this
/// call emitted it.
fn warn_insecure_default() -> bool {
    if INSECURE_DEFAULT_WARNED.swap(true, Ordering::SeqCst) {
        return false;
    }
    tracing::warn!(
        "Encryption not configured; connections will be unencrypted. \
         Set `encrypted` explicitly to silence this warning."
    );
    true
}

/// Turns the config into connection settings, failing early on anything
/// that would only break at first connect.
fn resolve_options(config: &DriverConfig) -> DriverResult<ConnectOptions> {
    let encrypted = match config.encrypted {
        Some(encrypted) => encrypted,
        None => {
            warn_insecure_default();
            false
        }
    };

    let options = ConnectOptions {
        auth: config.auth.clone(),
        user_agent: config.user_agent.clone(),
        connection_timeout: config.connection_timeout,
        max_message_size: config.max_message_size,
        #[cfg(feature = "tls")]
        tls: if encrypted {
            Some(TlsConnector::new(config.trust)?)
        } else {
            None
        },
    };

    #[cfg(not(feature = "tls"))]
    if encrypted {
        return Err(DriverError::configuration(
            "Encryption requested but TLS support is not available; \
             enable the `tls` feature or set `encrypted` to false",
        ));
    }

    Ok(options)
}

// ============================================================================
// Driver
// ============================================================================

/// Hands out sessions to one server and keeps the idle ones for reuse.
pub struct Driver {
    address: ServerAddress,
    options: ConnectOptions,
    pool: Arc<SessionPool>,
}

impl Driver {
    pub fn new(url: &str, config: DriverConfig) -> DriverResult<Self> {
        let address = ServerAddress::parse_url(url)?;
        let options = resolve_options(&config)?;
        tracing::debug!(%address, max_pool_size = config.max_pool_size, "driver created");
        Ok(Self {
            address,
            options,
            pool: Arc::new(SessionPool::new(config.max_pool_size)),
        })
    }

    /// Returns a ready session.
    ///
    /// Idle sessions are tried most recent first. Unhealthy ones and ones
    /// that fail to reset are discarded. A new connection is opened when
    /// none is left.
    pub async fn session(&self) -> DriverResult<Session> {
        if self.pool.is_closed() {
            return Err(DriverError::protocol("Driver is closed"));
        }

        while let Some(session) = self.pool.pop() {
            if !session.is_healthy() {
                tracing::debug!(connection_id = session.connection_id(), "discarding unhealthy session");
                continue;
            }
            match session.reset().await {
                Ok(()) => {
                    tracing::debug!(connection_id = session.connection_id(), "reusing pooled session");
                    return Ok(session);
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = session.connection_id(),
                        error = %e,
                        "reset of pooled session failed; discarding"
                    );
                    session.close_connection().await;
                }
            }
        }

        let connection = connect(&self.address, &self.options).await?;
        Ok(Session::new(connection, Arc::downgrade(&self.pool)))
    }

    /// Closes every idle session's connection and empties the pool.
    ///
    /// Sessions still in use have their connection closed when handed back.
    pub async fn close(&self) {
        if self.pool.is_closed() {
            return;
        }
        for session in self.pool.close() {
            session.close_connection().await;
        }
        tracing::debug!(address = %self.address, "driver closed");
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Sessions waiting in the pool.
    pub fn idle_sessions(&self) -> usize {
        self.pool.len()
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }

    pub fn is_open(&self) -> bool {
        !self.pool.is_closed()
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("address", &self.address)
            .field("pool", &self.pool)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Builds a [`Driver`] for `url`.
pub fn driver(url: &str, config: DriverConfig) -> DriverResult<Driver> {
    Driver::new(url, config)
}

/// Alternative entry point, `GraphDatabase::driver(url, config)`.
pub struct GraphDatabase;

impl GraphDatabase {
    pub fn driver(url: &str, config: DriverConfig) -> DriverResult<Driver> {
        Driver::new(url, config)
    }
}

// ============================================================================
// Tests
// ============================================================================
