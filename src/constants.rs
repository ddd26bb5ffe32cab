// Listener defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const WS_PATH: &str = "ws";
pub const HEALTH_PATH: &str = "health";

// Queue defaults
pub const DEFAULT_SUBSCRIPTION_ID: &str = "rectangle-commands-sub";
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";
pub const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const MAX_BATCH_SIZE: usize = 1000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_PULL_TIMEOUT_SECS: u64 = 10;

// Delivery defaults
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_SEND_BUFFER: usize = 64;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;
