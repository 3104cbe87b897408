use serde::Deserialize;

/// Top-level configuration settings for the relay.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub http: HttpSettings,
    pub hub: HubSettings,
    pub cache: CacheSettings,
    pub log: LogSettings,
    pub store: StoreSettings,
    pub consumer: ConsumerSettings,
    pub logging: LoggingSettings,
}

/// Address of the WebSocket listener.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Address of the HTTP submission and read endpoints.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

/// Connection hub behavior.
///
/// `send_buffer` bounds each connection's outbound delivery channel; a
/// connection whose buffer is full during a broadcast is evicted.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HubSettings {
    pub send_buffer: usize,
    pub exclude_sender: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub key_prefix: String,
}

/// Durable log topic and consumer group.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub topic: String,
    pub partition_key: String,
    pub group: String,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StoreSettings {
    pub data_dir: String,
    pub bootstrap_attempts: u32,
    pub bootstrap_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConsumerSettings {
    pub reconcile: bool,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub http: Option<PartialHttpSettings>,
    pub hub: Option<PartialHubSettings>,
    pub cache: Option<PartialCacheSettings>,
    pub log: Option<PartialLogSettings>,
    pub store: Option<PartialStoreSettings>,
    pub consumer: Option<PartialConsumerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHttpSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHubSettings {
    pub send_buffer: Option<usize>,
    pub exclude_sender: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialCacheSettings {
    pub ttl_secs: Option<u64>,
    pub key_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub topic: Option<String>,
    pub partition_key: Option<String>,
    pub group: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStoreSettings {
    pub data_dir: Option<String>,
    pub bootstrap_attempts: Option<u32>,
    pub bootstrap_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialConsumerSettings {
    pub reconcile: Option<bool>,
    pub retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let http = self.http.unwrap_or_default();
        let hub = self.hub.unwrap_or_default();
        let cache = self.cache.unwrap_or_default();
        let log = self.log.unwrap_or_default();
        let store = self.store.unwrap_or_default();
        let consumer = self.consumer.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            http: HttpSettings {
                host: http.host.unwrap_or(default.http.host),
                port: http.port.unwrap_or(default.http.port),
            },
            hub: HubSettings {
                send_buffer: hub.send_buffer.unwrap_or(default.hub.send_buffer),
                exclude_sender: hub.exclude_sender.unwrap_or(default.hub.exclude_sender),
            },
            cache: CacheSettings {
                ttl_secs: cache.ttl_secs.unwrap_or(default.cache.ttl_secs),
                key_prefix: cache.key_prefix.unwrap_or(default.cache.key_prefix),
            },
            log: LogSettings {
                topic: log.topic.unwrap_or(default.log.topic),
                partition_key: log.partition_key.unwrap_or(default.log.partition_key),
                group: log.group.unwrap_or(default.log.group),
                poll_interval_ms: log.poll_interval_ms.unwrap_or(default.log.poll_interval_ms),
            },
            store: StoreSettings {
                data_dir: store.data_dir.unwrap_or(default.store.data_dir),
                bootstrap_attempts: store
                    .bootstrap_attempts
                    .unwrap_or(default.store.bootstrap_attempts),
                bootstrap_delay_ms: store
                    .bootstrap_delay_ms
                    .unwrap_or(default.store.bootstrap_delay_ms),
            },
            consumer: ConsumerSettings {
                reconcile: consumer.reconcile.unwrap_or(default.consumer.reconcile),
                retry_backoff_ms: consumer
                    .retry_backoff_ms
                    .unwrap_or(default.consumer.retry_backoff_ms),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}

/// Provides default values for `Settings`.
///
/// The cache window (10 minutes), partition key and delivery buffer (256)
/// match the reference deployment.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8081,
            },
            http: HttpSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            hub: HubSettings {
                send_buffer: 256,
                exclude_sender: true,
            },
            cache: CacheSettings {
                ttl_secs: 600,
                key_prefix: "message:".to_string(),
            },
            log: LogSettings {
                topic: "chat-topic".to_string(),
                partition_key: "chat-key".to_string(),
                group: "chat-consumers".to_string(),
                poll_interval_ms: 500,
            },
            store: StoreSettings {
                data_dir: "chatrelay_db".to_string(),
                bootstrap_attempts: 5,
                bootstrap_delay_ms: 1000,
            },
            consumer: ConsumerSettings {
                reconcile: true,
                retry_backoff_ms: 1000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
