//! librdkafka client configuration derived from [`Settings`].
use crate::settings::Settings;
use log::debug;
use rdkafka::ClientConfig;

fn base_config(settings: &Settings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", settings.broker_list().join(","))
        .set("client.id", &settings.client_id)
        .set("socket.connection.setup.timeout.ms", "10000");
    apply_security(&mut config, settings);
    config
}

fn apply_security(config: &mut ClientConfig, settings: &Settings) {
    let protocol = match (settings.tls_enable, settings.sasl_enable) {
        (false, false) => "plaintext",
        (true, false) => "ssl",
        (false, true) => "sasl_plaintext",
        (true, true) => "sasl_ssl",
    };
    config.set("security.protocol", protocol);
    if settings.tls_enable && settings.tls_insecure_skip_verify {
        config
            .set("enable.ssl.certificate.verification", "false")
            .set("ssl.endpoint.identification.algorithm", "none");
    }
    if settings.sasl_enable {
        config
            .set("sasl.mechanism", settings.sasl_mechanism().as_str())
            .set("sasl.username", &settings.sasl_username)
            .set("sasl.password", &settings.sasl_password);
    }
}

/// Consumer-group subscription config. Offsets are never stored
/// automatically; auto-commit only runs when explicitly enabled.
pub(crate) fn consumer_config(settings: &Settings) -> ClientConfig {
    let mut config = base_config(settings);
    let commit_interval = settings.commit_interval();
    config
        .set("group.id", &settings.group_id)
        .set("auto.offset.reset", settings.start_offset().as_str())
        .set("fetch.min.bytes", settings.min_bytes.to_string())
        .set("fetch.max.bytes", settings.max_bytes.to_string())
        .set("fetch.wait.max.ms", settings.max_wait_ms.to_string())
        .set("session.timeout.ms", settings.session_timeout_ms.to_string())
        .set("heartbeat.interval.ms", settings.heartbeat_ms.to_string())
        .set("enable.auto.offset.store", "false")
        .set("enable.partition.eof", "false");
    if commit_interval.is_zero() {
        config.set("enable.auto.commit", "false");
    } else {
        config
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", commit_interval.as_millis().to_string());
    }
    debug!("consumer configuration: {:?}", redacted(&config));
    config
}

/// Producer config. Retries happen in the publisher, so the client
/// itself sends each message once.
pub(crate) fn producer_config(settings: &Settings) -> ClientConfig {
    let mut config = base_config(settings);
    config
        .set("acks", settings.acks().as_str())
        .set("linger.ms", settings.linger().as_millis().to_string())
        .set("batch.size", settings.batch_bytes().to_string())
        .set("compression.type", settings.compression().as_str())
        .set("partitioner", settings.balancer().as_str())
        .set("message.send.max.retries", "0")
        .set(
            "allow.auto.create.topics",
            settings.allow_auto_topic_creation.to_string(),
        );
    debug!("producer configuration: {:?}", redacted(&config));
    config
}

fn redacted(config: &ClientConfig) -> ClientConfig {
    let mut config = config.clone();
    if config.get("sasl.password").is_some() {
        config.set("sasl.password", "******");
    }
    config
}
