//! Metric collector behavior: partial results and per-attribute retries

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fleetwatch::collector::MetricCollector;
use pretty_assertions::assert_eq;

use super::helpers::*;

fn attribute_set(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(name, key)| (name.to_string(), key.to_string()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_partial_collection_keeps_only_successes() {
    let agent = ScriptedAgent::new()
        .with_response("1.1", "first")
        .with_rejection("1.2")
        .with_response("1.3", "third")
        .with_rejection("1.4");

    let factory = ScriptedFactory::new(agent);
    let collector = MetricCollector::new(
        Arc::new(factory),
        attribute_set(&[("a", "1.1"), ("b", "1.2"), ("c", "1.3"), ("d", "1.4")]),
        Duration::from_secs(1),
        0,
    );

    let metrics = collector.collect(&make_device("dev", "10.0.0.1", true, true)).await;

    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics.get("a").unwrap(), "first");
    assert_eq!(metrics.get("c").unwrap(), "third");
    assert!(!metrics.contains_key("b"));
    assert!(!metrics.contains_key("d"));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovered_by_retry() {
    let agent = ScriptedAgent::new().with_flaky_response("1.1", "ok", 1);

    let factory = ScriptedFactory::new(agent);
    let shared = factory.agent.clone();

    let collector = MetricCollector::new(
        Arc::new(factory),
        attribute_set(&[("a", "1.1")]),
        Duration::from_secs(1),
        1,
    );

    let metrics = collector.collect(&make_device("dev", "10.0.0.1", true, true)).await;

    assert_eq!(metrics.get("a").unwrap(), "ok");
    assert_eq!(shared.attempts_for("1.1").await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_exhausted_independently_per_attribute() {
    // "b" needs two retries but only one is configured; "a" must still be
    // collected and "b" must have used every attempt
    let agent = ScriptedAgent::new()
        .with_response("1.1", "steady")
        .with_flaky_response("1.2", "never-reached", 2);

    let factory = ScriptedFactory::new(agent);
    let shared = factory.agent.clone();

    let collector = MetricCollector::new(
        Arc::new(factory),
        attribute_set(&[("a", "1.1"), ("b", "1.2")]),
        Duration::from_secs(1),
        1,
    );

    let metrics = collector.collect(&make_device("dev", "10.0.0.1", true, true)).await;

    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics.get("a").unwrap(), "steady");
    assert_eq!(shared.attempts_for("1.2").await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_attribute_bounded_by_timeout() {
    // no script for "1.2": the query hangs until the per-attempt timeout
    let agent = ScriptedAgent::new().with_response("1.1", "quick");

    let factory = ScriptedFactory::new(agent);
    let shared = factory.agent.clone();

    let collector = MetricCollector::new(
        Arc::new(factory),
        attribute_set(&[("a", "1.1"), ("b", "1.2")]),
        Duration::from_secs(1),
        1,
    );

    let metrics = collector.collect(&make_device("dev", "10.0.0.1", true, true)).await;

    assert_eq!(metrics.len(), 1);
    assert!(metrics.contains_key("a"));

    // a timed-out attempt counts as a failed attempt and is retried like
    // any other query error
    assert_eq!(shared.attempts_for("1.2").await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_unopenable_session_yields_empty_mapping() {
    struct ClosedFactory;

    #[async_trait::async_trait]
    impl fleetwatch::snmp::ProtocolFactory for ClosedFactory {
        async fn open(
            &self,
            _device: &fleetwatch::Device,
            _timeout: Duration,
        ) -> Result<Box<dyn fleetwatch::snmp::AttributeClient>, fleetwatch::error::QueryError>
        {
            Err(fleetwatch::error::QueryError::Session(
                "port filtered".to_string(),
            ))
        }
    }

    let collector = MetricCollector::new(
        Arc::new(ClosedFactory),
        attribute_set(&[("a", "1.1")]),
        Duration::from_secs(1),
        1,
    );

    let metrics = collector.collect(&make_device("dev", "10.0.0.1", true, true)).await;

    assert!(metrics.is_empty());
}
