//! Relay configuration module
//! Resolves listener, queue and delivery parameters from the environment

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_HOST, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT,
    DEFAULT_PUBSUB_ENDPOINT, DEFAULT_PULL_TIMEOUT_SECS, DEFAULT_SEND_BUFFER,
    DEFAULT_SEND_TIMEOUT_MS, DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_SUBSCRIPTION_ID, MAX_BATCH_SIZE,
};
use crate::error::{RelayError, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// How queue requests are authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubSubAuth {
    /// No Authorization header (emulator, local doubles)
    Anonymous,
    /// Fixed bearer token supplied by the operator. It is never refreshed.
    StaticToken(String),
    /// Tokens obtained and refreshed through Application Default Credentials
    ApplicationDefault,
}

/// Relay configuration parameters
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Google Cloud project owning the subscription
    pub project_id: String,
    pub subscription_id: String,
    /// Base URL of the Pub/Sub REST API
    pub pubsub_endpoint: String,
    pub auth: PubSubAuth,
    /// Maximum number of messages requested per pull
    pub batch_size: usize,
    /// Pause between two pulls
    pub poll_interval: Duration,
    /// Upper bound on a single pull request
    pub pull_timeout: Duration,
    /// Upper bound on a single per-connection send
    pub send_timeout: Duration,
    /// Outbound frames buffered per connection
    pub send_buffer: usize,
    /// How long shutdown waits for connections to drain
    pub shutdown_grace: Duration,
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("RELAY_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = lookup("RELAY_PORT")
            .or_else(|| lookup("PORT"))
            .map(|p| parse_value::<u16>("RELAY_PORT", &p))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let project_id = lookup("RELAY_PUBSUB_PROJECT")
            .or_else(|| lookup("GCP_PROJECT_ID"))
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                RelayError::ConfigError(
                    "RELAY_PUBSUB_PROJECT (or GCP_PROJECT_ID) environment variable is required"
                        .to_string(),
                )
            })?;

        let subscription_id = lookup("RELAY_PUBSUB_SUBSCRIPTION")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SUBSCRIPTION_ID.to_string());

        let emulator_host = lookup("PUBSUB_EMULATOR_HOST").filter(|h| !h.trim().is_empty());
        let pubsub_endpoint = match (lookup("RELAY_PUBSUB_ENDPOINT"), &emulator_host) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, Some(host)) => format!("http://{}", host.trim_end_matches('/')),
            (None, None) => DEFAULT_PUBSUB_ENDPOINT.to_string(),
        };

        let access_token = lookup("RELAY_PUBSUB_ACCESS_TOKEN")
            .or_else(|| lookup("GOOGLE_OAUTH_ACCESS_TOKEN"))
            .filter(|t| !t.trim().is_empty());

        let auth = match lookup("RELAY_PUBSUB_AUTH").as_deref().map(str::trim) {
            Some("adc") => PubSubAuth::ApplicationDefault,
            Some("none") => PubSubAuth::Anonymous,
            Some("token") => PubSubAuth::StaticToken(access_token.ok_or_else(|| {
                RelayError::ConfigError(
                    "RELAY_PUBSUB_AUTH=token requires RELAY_PUBSUB_ACCESS_TOKEN".to_string(),
                )
            })?),
            Some(other) => {
                return Err(RelayError::ConfigError(format!(
                    "RELAY_PUBSUB_AUTH must be one of adc, token, none; got '{}'",
                    other
                )))
            }
            None => match access_token {
                Some(token) => PubSubAuth::StaticToken(token),
                // Emulators and custom endpoints take anonymous requests
                None if emulator_host.is_some() || pubsub_endpoint != DEFAULT_PUBSUB_ENDPOINT => {
                    PubSubAuth::Anonymous
                }
                None => PubSubAuth::ApplicationDefault,
            },
        };

        let batch_size = lookup("RELAY_BATCH_SIZE")
            .map(|b| parse_value::<usize>("RELAY_BATCH_SIZE", &b))
            .transpose()?
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let poll_ms = lookup("RELAY_POLL_INTERVAL_MS")
            .map(|p| parse_value::<u64>("RELAY_POLL_INTERVAL_MS", &p))
            .transpose()?
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        let pull_secs = lookup("RELAY_PULL_TIMEOUT_SECS")
            .map(|p| parse_value::<u64>("RELAY_PULL_TIMEOUT_SECS", &p))
            .transpose()?
            .unwrap_or(DEFAULT_PULL_TIMEOUT_SECS);

        let send_ms = lookup("RELAY_SEND_TIMEOUT_MS")
            .map(|s| parse_value::<u64>("RELAY_SEND_TIMEOUT_MS", &s))
            .transpose()?
            .unwrap_or(DEFAULT_SEND_TIMEOUT_MS);

        let send_buffer = lookup("RELAY_SEND_BUFFER")
            .map(|s| parse_value::<usize>("RELAY_SEND_BUFFER", &s))
            .transpose()?
            .unwrap_or(DEFAULT_SEND_BUFFER);

        let grace_ms = lookup("RELAY_SHUTDOWN_GRACE_MS")
            .map(|g| parse_value::<u64>("RELAY_SHUTDOWN_GRACE_MS", &g))
            .transpose()?
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS);

        let config = Self {
            host,
            port,
            project_id,
            subscription_id,
            pubsub_endpoint,
            auth,
            batch_size,
            poll_interval: Duration::from_millis(poll_ms),
            pull_timeout: Duration::from_secs(pull_secs),
            send_timeout: Duration::from_millis(send_ms),
            send_buffer,
            shutdown_grace: Duration::from_millis(grace_ms),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(RelayError::ConfigError(format!(
                "RELAY_BATCH_SIZE must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }

        if self.send_buffer == 0 {
            return Err(RelayError::ConfigError(
                "RELAY_SEND_BUFFER must be at least 1".to_string(),
            ));
        }

        if self.pull_timeout.is_zero() {
            return Err(RelayError::ConfigError(
                "RELAY_PULL_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        url::Url::parse(&self.pubsub_endpoint).map_err(|e| {
            RelayError::ConfigError(format!(
                "Invalid Pub/Sub endpoint '{}': {}",
                self.pubsub_endpoint, e
            ))
        })?;

        Ok(())
    }

    /// Full resource name of the subscription
    pub fn subscription_path(&self) -> String {
        format!(
            "projects/{}/subscriptions/{}",
            self.project_id, self.subscription_id
        )
    }

    /// Address string the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the listen address. The host may be a name such as `localhost`.
    pub async fn resolve_listen_addr(&self) -> Result<SocketAddr> {
        let listen_addr = self.listen_addr();
        let resolved = tokio::net::lookup_host(listen_addr.as_str())
            .await
            .map_err(|e| {
                RelayError::ConfigError(format!(
                    "Cannot resolve listen address {}: {}",
                    listen_addr, e
                ))
            })?
            .next()
            .ok_or_else(|| {
                RelayError::ConfigError(format!("{} did not resolve to any address", listen_addr))
            });
        resolved
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| RelayError::ConfigError(format!("{} has an invalid value: '{}'", key, raw)))
}
