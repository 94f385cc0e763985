use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for both the server and the broadcast relay.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
}

/// Configuration settings for the server.
///
/// Defines the bind address and the bearer-token parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_mins: u64,
}

/// Configuration settings for the relay.
///
/// `sink_capacity` bounds each subscriber's outbound queue; a subscriber whose
/// queue is full when a message is published gets disconnected.
/// `handshake_timeout_ms` caps how long an accepted socket may hold a
/// connection slot before completing the upgrade.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub max_connections: usize,
    pub sink_capacity: usize,
    pub max_message_bytes: usize,
    pub require_auth: bool,
    pub handshake_timeout_ms: u64,
}

/// Partial configuration settings loaded from files or environment.
///
/// Any field may be absent; `merge_with_defaults` fills the gaps.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub jwt_secret: Option<String>,
    pub token_ttl_mins: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialRelaySettings {
    pub max_connections: Option<usize>,
    pub sink_capacity: Option<usize>,
    pub max_message_bytes: Option<usize>,
    pub require_auth: Option<bool>,
    pub handshake_timeout_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                jwt_secret: "change-me".to_string(),
                token_ttl_mins: 30,
            },
            relay: RelaySettings::default(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            sink_capacity: 256,
            max_message_bytes: 64 * 1024,
            require_auth: false,
            handshake_timeout_ms: 10_000,
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let server = self.server;
        let relay = self.relay;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
                jwt_secret: server
                    .as_ref()
                    .and_then(|s| s.jwt_secret.clone())
                    .unwrap_or(default.server.jwt_secret),
                token_ttl_mins: server
                    .as_ref()
                    .and_then(|s| s.token_ttl_mins)
                    .unwrap_or(default.server.token_ttl_mins),
            },
            relay: RelaySettings {
                max_connections: relay
                    .as_ref()
                    .and_then(|r| r.max_connections)
                    .unwrap_or(default.relay.max_connections),
                sink_capacity: relay
                    .as_ref()
                    .and_then(|r| r.sink_capacity)
                    .unwrap_or(default.relay.sink_capacity),
                max_message_bytes: relay
                    .as_ref()
                    .and_then(|r| r.max_message_bytes)
                    .unwrap_or(default.relay.max_message_bytes),
                require_auth: relay
                    .as_ref()
                    .and_then(|r| r.require_auth)
                    .unwrap_or(default.relay.require_auth),
                handshake_timeout_ms: relay
                    .as_ref()
                    .and_then(|r| r.handshake_timeout_ms)
                    .unwrap_or(default.relay.handshake_timeout_ms),
            },
        }
    }
}
