use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the HTTP server, the broker and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the HTTP listener will bind to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the broker.
///
/// `queue_capacity` bounds each subscriber's private delivery queue and
/// `overflow` decides what happens once it is full.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub name: String,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub max_subscribers: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Policy applied when a subscriber's queue is full at publish time.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest undelivered message; the session is told how many it skipped.
    #[default]
    DropOldest,
    /// Evict the subscriber; its session drains what is queued and ends.
    Disconnect,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub name: Option<String>,
    pub queue_capacity: Option<usize>,
    pub overflow: Option<OverflowPolicy>,
    pub max_subscribers: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Settings {
    /// Fill every field missing from `partial` with the default value.
    pub fn merged(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server;
        let broker = partial.broker;
        let logging = partial.logging;

        Self {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                name: broker
                    .as_ref()
                    .and_then(|b| b.name.clone())
                    .unwrap_or(default.broker.name),
                queue_capacity: broker
                    .as_ref()
                    .and_then(|b| b.queue_capacity)
                    .unwrap_or(default.broker.queue_capacity),
                overflow: broker
                    .as_ref()
                    .and_then(|b| b.overflow)
                    .unwrap_or(default.broker.overflow),
                max_subscribers: broker
                    .as_ref()
                    .and_then(|b| b.max_subscribers)
                    .unwrap_or(default.broker.max_subscribers),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }

    /// Address string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            queue_capacity: 256,
            overflow: OverflowPolicy::DropOldest,
            max_subscribers: 10_000,
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            broker: BrokerSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
