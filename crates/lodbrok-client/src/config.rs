//! Consumer configuration.
//!
//! Every recognized option is an explicit typed field with a default;
//! configuration is validated once, before any network activity. A string
//! key/value map (the shape configuration files usually arrive in) can be
//! converted with [`ConsumerConfig::from_map`], which rejects unknown keys
//! and mistyped values instead of failing later at use sites.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use lodbrok_common::{Error, Result};

/// Where committed offsets are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetsStorage {
    /// The broker's own offsets topic (OffsetCommit v2).
    #[default]
    Kafka,
    /// The external coordination service backing the old consumers
    /// (OffsetCommit v0); the service itself is not this client's concern.
    Zookeeper,
}

impl OffsetsStorage {
    /// The OffsetCommit request version this backend requires.
    pub fn commit_version(&self) -> i16 {
        match self {
            OffsetsStorage::Kafka => 2,
            OffsetsStorage::Zookeeper => 0,
        }
    }
}

impl FromStr for OffsetsStorage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kafka" => Ok(OffsetsStorage::Kafka),
            "zookeeper" => Ok(OffsetsStorage::Zookeeper),
            other => Err(Error::Configuration(format!(
                "offsets.storage must be kafka|zookeeper, `{}` is unknown",
                other
            ))),
        }
    }
}

impl fmt::Display for OffsetsStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetsStorage::Kafka => write!(f, "kafka"),
            OffsetsStorage::Zookeeper => write!(f, "zookeeper"),
        }
    }
}

/// Group consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Comma-separated host:port bootstrap list
    pub bootstrap_servers: String,
    /// Topic to consume
    pub topic: String,
    /// Consumer group id
    pub group_id: String,
    /// Client id sent in every request header; defaults to
    /// `{group.id}-{unix-millis}-{hostname}` when unset
    pub client_id: Option<String>,
    /// The coordinator considers this member dead after this many ms
    /// without a heartbeat
    pub session_timeout_ms: i32,
    /// Maximum time in ms the broker may block a fetch
    pub fetch_max_wait_ms: i32,
    /// Minimum bytes the broker should accumulate before answering a fetch
    pub fetch_min_bytes: i32,
    /// Maximum bytes fetched per partition per request
    pub max_partition_fetch_bytes: i32,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per-read timeout in seconds, 0 disables it; must stay strictly
    /// below the session timeout
    pub timeout_secs: u64,
    /// Interval between automatic offset commits in ms
    pub auto_commit_interval_ms: i32,
    /// Whether offsets are committed automatically
    pub auto_commit_enable: bool,
    /// Offset storage backend
    pub offsets_storage: OffsetsStorage,
}

impl ConsumerConfig {
    /// A configuration with defaults for everything but the required keys.
    pub fn new(bootstrap_servers: &str, topic: &str, group_id: &str) -> Self {
        ConsumerConfig {
            bootstrap_servers: bootstrap_servers.to_string(),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            client_id: None,
            session_timeout_ms: 30_000,
            fetch_max_wait_ms: 10_000,
            fetch_min_bytes: 1,
            max_partition_fetch_bytes: 10 * 1024 * 1024,
            connect_timeout_secs: 30,
            timeout_secs: 30,
            auto_commit_interval_ms: 60_000,
            auto_commit_enable: true,
            offsets_storage: OffsetsStorage::Kafka,
        }
    }

    /// Build a configuration from a string key/value map.
    ///
    /// Unknown keys and values that fail to parse are configuration errors.
    pub fn from_map(options: &HashMap<String, String>) -> Result<Self> {
        fn required<'a>(options: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
            options
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| Error::Configuration(format!("`{}` is required", key)))
        }

        fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| {
                Error::Configuration(format!("invalid value `{}` for `{}`", value, key))
            })
        }

        let mut config = ConsumerConfig::new(
            required(options, "bootstrap.servers")?,
            required(options, "topic")?,
            required(options, "group.id")?,
        );

        for (key, value) in options {
            match key.as_str() {
                "bootstrap.servers" | "topic" | "group.id" => {}
                "client.id" => config.client_id = Some(value.clone()),
                "session.timeout.ms" => config.session_timeout_ms = parse(key, value)?,
                "fetch.max.wait.ms" => config.fetch_max_wait_ms = parse(key, value)?,
                "fetch.min.bytes" => config.fetch_min_bytes = parse(key, value)?,
                "max.partition.fetch.bytes" => {
                    config.max_partition_fetch_bytes = parse(key, value)?
                }
                "connectTimeout" => config.connect_timeout_secs = parse(key, value)?,
                "timeout" => config.timeout_secs = parse(key, value)?,
                "auto.commit.interval.ms" => config.auto_commit_interval_ms = parse(key, value)?,
                "auto.commit.enable" => config.auto_commit_enable = parse(key, value)?,
                "offsets.storage" => config.offsets_storage = value.parse()?,
                unknown => {
                    return Err(Error::Configuration(format!(
                        "unrecognized option `{}`",
                        unknown
                    )))
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants; called once at consumer construction.
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(Error::Configuration("`bootstrap.servers` is required".into()));
        }
        if self.topic.is_empty() {
            return Err(Error::Configuration("`topic` is required".into()));
        }
        if self.group_id.is_empty() {
            return Err(Error::Configuration("`group.id` is required".into()));
        }
        if self.session_timeout_ms <= 0 {
            return Err(Error::Configuration(
                "`session.timeout.ms` must be positive".into(),
            ));
        }
        if self.timeout_secs.saturating_mul(1000) >= self.session_timeout_ms as u64 {
            return Err(Error::Configuration(
                "`timeout` must be strictly less than `session.timeout.ms`".into(),
            ));
        }
        if self.fetch_min_bytes < 0 || self.max_partition_fetch_bytes <= 0 {
            return Err(Error::Configuration("invalid fetch byte bounds".into()));
        }
        if self.auto_commit_enable && self.auto_commit_interval_ms <= 0 {
            return Err(Error::Configuration(
                "`auto.commit.interval.ms` must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The client id to put on the wire.
    pub fn effective_client_id(&self) -> String {
        if let Some(client_id) = &self.client_id {
            return client_id.clone();
        }

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        match hostname::get().ok().and_then(|h| h.into_string().ok()) {
            Some(host) => format!("{}-{}-{}", self.group_id, millis, host),
            None => format!("{}-{}", self.group_id, millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_map() -> HashMap<String, String> {
        [
            ("bootstrap.servers", "127.0.0.1:9092"),
            ("topic", "t"),
            ("group.id", "g"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ConsumerConfig::from_map(&base_map()).unwrap();
        assert_eq!(config.session_timeout_ms, 30_000);
        assert_eq!(config.fetch_max_wait_ms, 10_000);
        assert_eq!(config.fetch_min_bytes, 1);
        assert_eq!(config.max_partition_fetch_bytes, 10 * 1024 * 1024);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.auto_commit_interval_ms, 60_000);
        assert!(config.auto_commit_enable);
        assert_eq!(config.offsets_storage, OffsetsStorage::Kafka);
    }

    #[test]
    fn test_missing_required_key() {
        let mut options = base_map();
        options.remove("group.id");
        assert!(ConsumerConfig::from_map(&options).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut options = base_map();
        options.insert("fetch.max.bytes".into(), "1".into());
        assert!(ConsumerConfig::from_map(&options).is_err());
    }

    #[test]
    fn test_mistyped_value_rejected() {
        let mut options = base_map();
        options.insert("session.timeout.ms".into(), "soon".into());
        assert!(ConsumerConfig::from_map(&options).is_err());
    }

    #[test]
    fn test_bad_offsets_storage_rejected() {
        let mut options = base_map();
        options.insert("offsets.storage".into(), "etcd".into());
        assert!(ConsumerConfig::from_map(&options).is_err());

        options.insert("offsets.storage".into(), "zookeeper".into());
        let config = ConsumerConfig::from_map(&options).unwrap();
        assert_eq!(config.offsets_storage, OffsetsStorage::Zookeeper);
        assert_eq!(config.offsets_storage.commit_version(), 0);
    }

    #[test]
    fn test_timeout_must_stay_below_session_timeout() {
        let mut options = base_map();
        options.insert("timeout".into(), "30".into());
        options.insert("session.timeout.ms".into(), "30000".into());
        assert!(ConsumerConfig::from_map(&options).is_err());

        options.insert("session.timeout.ms".into(), "30001".into());
        assert!(ConsumerConfig::from_map(&options).is_ok());
    }

    #[test]
    fn test_default_client_id_mentions_group() {
        let config = ConsumerConfig::new("127.0.0.1:9092", "t", "billing");
        assert!(config.effective_client_id().starts_with("billing-"));

        let mut named = config.clone();
        named.client_id = Some("fixed".into());
        assert_eq!(named.effective_client_id(), "fixed");
    }
}
