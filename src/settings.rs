//! Connection, security and pipeline settings.
//!
//! Every field can be given on the command line or through a `KAFKA_*`
//! environment variable. Durations are milliseconds.
use crate::assembler::PoisonPolicy;
use crate::codec::TypeFilter;
use crate::error::SettingsError;
use crate::macros::selector;
use clap::Parser;
use std::time::Duration;

const DEFAULT_BATCH_BYTES: i64 = 1 << 20;

selector! {
    /// Where a consumer group starts when it has no committed offset.
    pub enum StartOffset {
        Earliest = "earliest" ["earliest", "first"],
        Latest = "latest" ["latest", "last"],
    }
    default = Latest;
}

selector! {
    /// Producer acknowledgement level.
    pub enum Acks {
        None = "0" ["none", "0"],
        Leader = "1" ["leader", "one", "1"],
        All = "all" ["all", "-1"],
    }
    default = All;
}

selector! {
    pub enum Compression {
        Gzip = "gzip" ["gzip"],
        Lz4 = "lz4" ["lz4"],
        Zstd = "zstd" ["zstd"],
        Snappy = "snappy" ["snappy"],
    }
    default = Snappy;
}

selector! {
    /// Partitioning strategy of the publisher. The value is the librdkafka
    /// partitioner used when the partition is left to the client.
    pub enum BalancerKind {
        LeastBytes = "consistent_random" ["least-bytes", "leastbytes"],
        RoundRobin = "consistent_random" ["round-robin", "roundrobin"],
        Crc32 = "consistent" ["crc32"],
        Murmur2 = "murmur2" ["murmur2"],
    }
    default = LeastBytes;
}

selector! {
    pub enum SaslMechanism {
        Plain = "PLAIN" ["plain"],
        ScramSha256 = "SCRAM-SHA-256" ["scram-sha-256"],
        ScramSha512 = "SCRAM-SHA-512" ["scram-sha-512"],
    }
    default = ScramSha256;
}

#[derive(Parser, Clone, Debug)]
#[clap(name = "smsproc", version, about = "SMS event publisher and batching consumer")]
#[clap(args_override_self = true)]
pub struct Settings {
    /// Comma separated list of bootstrap brokers.
    #[clap(long, env = "KAFKA_BROKERS")]
    pub brokers: String,
    #[clap(long, env = "KAFKA_CLIENT_ID")]
    pub client_id: String,
    #[clap(long, env = "KAFKA_PRODUCER_TOPIC")]
    pub producer_topic: String,
    #[clap(long, env = "KAFKA_CONSUMER_TOPIC")]
    pub consumer_topic: String,
    #[clap(long, env = "KAFKA_CONSUMER_GROUP_ID")]
    pub group_id: String,
    /// earliest | latest
    #[clap(long, env = "KAFKA_CONSUMER_START_OFFSET", default_value = "latest")]
    pub start_offset: String,

    /// none | leader | all
    #[clap(long, env = "KAFKA_PRODUCER_ACKS", default_value = "all")]
    pub acks: String,
    #[clap(long, env = "KAFKA_PRODUCER_LINGER_MS", default_value_t = 5)]
    pub linger_ms: u64,
    /// Values <= 0 fall back to 1 MiB.
    #[clap(long, env = "KAFKA_PRODUCER_BATCH_BYTES", default_value_t = DEFAULT_BATCH_BYTES, allow_hyphen_values = true)]
    pub batch_bytes: i64,
    /// gzip | lz4 | zstd | snappy
    #[clap(long, env = "KAFKA_PRODUCER_COMPRESSION", default_value = "snappy")]
    pub compression: String,
    /// Publish attempts, at least one.
    #[clap(long, env = "KAFKA_PRODUCER_RETRIES", default_value_t = 3, allow_hyphen_values = true)]
    pub retries: i32,
    /// least-bytes | round-robin | crc32 | murmur2
    #[clap(long, env = "KAFKA_PRODUCER_BALANCER", default_value = "least-bytes")]
    pub balancer: String,
    #[clap(long, env = "KAFKA_PRODUCER_AUTO_CREATE_TOPIC", default_value = "false", parse(try_from_str))]
    pub allow_auto_topic_creation: bool,

    #[clap(long, env = "KAFKA_CONSUMER_MIN_BYTES", default_value_t = 1)]
    pub min_bytes: u32,
    #[clap(long, env = "KAFKA_CONSUMER_MAX_BYTES", default_value_t = 10 << 20)]
    pub max_bytes: u32,
    /// Longest wait of a single fetch, also the first-message wait of a tick.
    #[clap(long, env = "KAFKA_CONSUMER_MAX_WAIT_MS", default_value_t = 500)]
    pub max_wait_ms: u64,
    #[clap(long, env = "KAFKA_CONSUMER_SESSION_TIMEOUT_MS", default_value_t = 10_000)]
    pub session_timeout_ms: u64,
    #[clap(long, env = "KAFKA_CONSUMER_HEARTBEAT_MS", default_value_t = 3_000)]
    pub heartbeat_ms: u64,
    #[clap(long, env = "KAFKA_CONSUMER_AUTO_COMMIT", default_value = "false", parse(try_from_str))]
    pub auto_commit: bool,
    #[clap(long, env = "KAFKA_CONSUMER_AUTO_COMMIT_INTERVAL_MS", default_value_t = 1_000)]
    pub auto_commit_interval_ms: u64,
    #[clap(long, env = "KAFKA_CONSUMER_BATCH_SIZE", default_value_t = 100)]
    pub batch_size: usize,
    #[clap(long, env = "KAFKA_CONSUMER_TICK_MS", default_value_t = 500)]
    pub tick_ms: u64,
    /// strict | lenient | off
    #[clap(long, env = "KAFKA_CONSUMER_TYPE_FILTER", default_value = "strict")]
    pub type_filter: String,
    /// drop | dead-letter
    #[clap(long, env = "KAFKA_CONSUMER_POISON_POLICY", default_value = "drop")]
    pub poison_policy: String,
    #[clap(long, env = "KAFKA_CONSUMER_DEAD_LETTER_TOPIC")]
    pub dead_letter_topic: Option<String>,

    #[clap(long, env = "KAFKA_TLS_ENABLE", default_value = "false", parse(try_from_str))]
    pub tls_enable: bool,
    #[clap(long, env = "KAFKA_TLS_INSECURE_SKIP_VERIFY", default_value = "false", parse(try_from_str))]
    pub tls_insecure_skip_verify: bool,
    #[clap(long, env = "KAFKA_SASL_ENABLE", default_value = "false", parse(try_from_str))]
    pub sasl_enable: bool,
    /// PLAIN | SCRAM-SHA-256 | SCRAM-SHA-512
    #[clap(long, env = "KAFKA_SASL_MECHANISM", default_value = "SCRAM-SHA-256")]
    pub sasl_mechanism: String,
    #[clap(long, env = "KAFKA_SASL_USERNAME", default_value = "")]
    pub sasl_username: String,
    #[clap(long, env = "KAFKA_SASL_PASSWORD", default_value = "", hide_env_values = true)]
    pub sasl_password: String,
}

impl Settings {
    /// Parses the broker list, dropping blank entries.
    pub fn broker_list(&self) -> Vec<String> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn start_offset(&self) -> StartOffset {
        StartOffset::from(self.start_offset.as_str())
    }

    pub fn acks(&self) -> Acks {
        Acks::from(self.acks.as_str())
    }

    pub fn compression(&self) -> Compression {
        Compression::from(self.compression.as_str())
    }

    pub fn balancer(&self) -> BalancerKind {
        BalancerKind::from(self.balancer.as_str())
    }

    pub fn sasl_mechanism(&self) -> SaslMechanism {
        SaslMechanism::from(self.sasl_mechanism.as_str())
    }

    pub fn type_filter(&self) -> TypeFilter {
        TypeFilter::from(self.type_filter.as_str())
    }

    pub fn poison_policy(&self) -> PoisonPolicy {
        PoisonPolicy::from(self.poison_policy.as_str())
    }

    pub fn batch_bytes(&self) -> i64 {
        if self.batch_bytes > 0 {
            self.batch_bytes
        } else {
            DEFAULT_BATCH_BYTES
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.retries.max(1) as usize
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Auto-commit interval handed to the client; zero means manual commits only.
    pub fn commit_interval(&self) -> Duration {
        if self.auto_commit {
            Duration::from_millis(self.auto_commit_interval_ms)
        } else {
            Duration::ZERO
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.broker_list().is_empty() {
            return Err(SettingsError::Missing("brokers"));
        }
        let required = [
            ("client-id", &self.client_id),
            ("producer-topic", &self.producer_topic),
            ("consumer-topic", &self.consumer_topic),
            ("group-id", &self.group_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(SettingsError::Missing(name));
            }
        }
        if self.batch_size == 0 {
            return Err(SettingsError::Invalid("batch-size must be positive".to_string()));
        }
        if self.tick_ms == 0 {
            return Err(SettingsError::Invalid("tick-ms must be positive".to_string()));
        }
        if self.heartbeat_ms >= self.session_timeout_ms {
            return Err(SettingsError::Invalid(format!(
                "heartbeat-ms ({}) must be lower than session-timeout-ms ({})",
                self.heartbeat_ms, self.session_timeout_ms
            )));
        }
        if self.min_bytes > self.max_bytes {
            return Err(SettingsError::Invalid(format!(
                "min-bytes ({}) exceeds max-bytes ({})",
                self.min_bytes, self.max_bytes
            )));
        }
        if self.sasl_enable && (self.sasl_username.is_empty() || self.sasl_password.is_empty()) {
            return Err(SettingsError::Invalid(
                "sasl requires both username and password".to_string(),
            ));
        }
        if self.poison_policy() == PoisonPolicy::DeadLetter
            && self.dead_letter_topic.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(SettingsError::Missing("dead-letter-topic"));
        }
        Ok(())
    }
}
