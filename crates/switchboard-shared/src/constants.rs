/// Name of the native (non-bridged) network
pub const NATIVE_NETWORK: &str = "MAS";

/// Courier endpoint of the IRC gateway
pub const GATEWAY_ENDPOINT: &str = "ircparser";

/// Courier endpoint of the native network backend
pub const LOOPBACK_ENDPOINT: &str = "loopbackparser";

/// Courier endpoint of the process owning the IRC sockets
pub const CONNECTION_MANAGER_ENDPOINT: &str = "connectionmanager";

/// Default number of backlog messages per window sent on session start
pub const DEFAULT_MAX_BACKLOG: usize = 100;

/// Characters that start a channel name (RFC 2812, section 1.3)
pub const CHANNEL_PREFIXES: [char; 4] = ['&', '#', '!', '+'];

/// Mode letters that consume a parameter
pub const MODES_WITH_PARAM: &str = "klbeIOov";

/// Reconnect delay for the first four attempts
pub const SHORT_BACKOFF_SECS: u64 = 30;

/// Reconnect delay for attempts four to seven
pub const MEDIUM_BACKOFF_SECS: u64 = 3 * 60;

/// Reconnect delay once attempts reach eight
pub const LONG_BACKOFF_SECS: u64 = 60 * 60;

/// Real name sent in the IRC USER command
pub const DEFAULT_REAL_NAME: &str = "Real Name (Switchboard v1.0)";
