use clap::Parser;
use smsproc::prelude::*;
use uuid::Uuid;

pub const BROKERS: &str = "localhost:9092";

/// Settings against the local broker with a fresh topic and group per test.
pub fn create_settings(test_name: &str, extra: &[&str]) -> Settings {
    let suffix = Uuid::new_v4().simple().to_string();
    let topic = format!("{}-{}", test_name, suffix);
    let group = format!("{}-group-{}", test_name, suffix);
    let mut args = vec![
        "smsproc".to_string(),
        "--brokers".to_string(),
        BROKERS.to_string(),
        "--client-id".to_string(),
        test_name.to_string(),
        "--producer-topic".to_string(),
        topic.clone(),
        "--consumer-topic".to_string(),
        topic,
        "--group-id".to_string(),
        group,
        "--start-offset".to_string(),
        "earliest".to_string(),
        "--allow-auto-topic-creation".to_string(),
        "true".to_string(),
    ];
    args.extend(extra.iter().map(|a| a.to_string()));
    Settings::parse_from(args)
}
