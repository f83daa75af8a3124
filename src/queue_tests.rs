//! Tests for queue descriptors.

use super::*;
use crate::amqp::queue::{AMQP_HEADERS_EXPIRES, AMQP_HEADERS_MESSAGE_TTL};
use serde_json::json;

#[test]
fn test_normalized_defaults_topic_to_name() {
    let queue = Queue::new("orders");

    let normalized = queue.normalized().unwrap();

    assert_eq!(normalized.topic(), Some("orders"));
    assert_eq!(normalized.routing_key(), "orders");
    assert_eq!(normalized.exchange_type().as_deref(), Some("direct"));
}

#[test]
fn test_normalized_never_mutates_original() {
    let queue = Queue::new("orders").with_property(ROUTING_KEY_PROPERTY, "orders.created");
    let before = queue.clone();

    let _ = queue.normalized().unwrap();

    assert_eq!(queue, before);
    assert_eq!(queue.topic(), None);
    assert!(queue.property(ROUTING_KEY_PROPERTY).is_some());
}

#[test]
fn test_normalized_strips_reserved_routing_key() {
    let queue = Queue::new("orders")
        .with_topic("shop")
        .with_property(ROUTING_KEY_PROPERTY, "orders.created");

    let normalized = queue.normalized().unwrap();

    assert_eq!(normalized.topic(), Some("shop"));
    assert_eq!(normalized.routing_key(), "orders.created");
    assert!(normalized.property(ROUTING_KEY_PROPERTY).is_none());
}

#[test]
fn test_explicit_routing_key_wins_over_property() {
    let queue = Queue::new("orders")
        .with_routing_key("explicit")
        .with_property(ROUTING_KEY_PROPERTY, "from-property");

    assert_eq!(queue.routing_key(), "explicit");
}

#[test]
fn test_normalized_keeps_configured_exchange_type() {
    let queue = Queue::new("events").with_property(EXCHANGE_TYPE_PROPERTY, "topic");

    let normalized = queue.normalized().unwrap();

    assert_eq!(normalized.exchange_type().as_deref(), Some("topic"));
}

#[test]
fn test_normalized_forces_fanout_on_whole_dead_letter_chain() {
    let dead = Queue::new("orders.dead").with_property(EXCHANGE_TYPE_PROPERTY, "direct");
    let retry = Queue::new("orders.retry")
        .with_dead_letter_queue(dead)
        .unwrap();
    let queue = Queue::new("orders")
        .with_property(EXCHANGE_TYPE_PROPERTY, "topic")
        .with_dead_letter_queue(retry)
        .unwrap();

    let normalized = queue.normalized().unwrap();
    let kinds: Vec<_> = normalized
        .chain()
        .map(|q| q.exchange_type().unwrap_or_default())
        .collect();

    assert_eq!(kinds, vec!["topic", "fanout", "fanout"]);
    assert!(normalized.chain().all(|q| q.topic().is_some()));
}

#[test]
fn test_dead_letter_cycle_is_rejected() {
    let inner = Queue::new("orders.retry")
        .with_dead_letter_queue(Queue::new("orders"))
        .unwrap();

    let err = Queue::new("orders").with_dead_letter_queue(inner).unwrap_err();

    assert_eq!(err, MessagingError::DeadLetterCycle("orders".to_owned()));
}

#[test]
fn test_empty_name_is_rejected() {
    let err = Queue::new("").normalized().unwrap_err();

    assert!(matches!(err, MessagingError::InvalidQueue(_)));
}

#[test]
fn test_empty_topic_is_rejected() {
    let err = Queue::new("orders").with_topic("").validate().unwrap_err();

    assert!(matches!(err, MessagingError::InvalidQueue(_)));
}

#[test]
fn test_deserialized_cycle_is_caught_by_normalized() {
    let queue: Queue = serde_json::from_value(json!({
        "name": "a",
        "dead_letter_queue": { "name": "b", "dead_letter_queue": { "name": "a" } }
    }))
    .unwrap();

    assert_eq!(
        queue.normalized().unwrap_err(),
        MessagingError::DeadLetterCycle("a".to_owned())
    );
}

#[test]
fn test_non_string_routing_key_property_is_stringified() {
    let queue = Queue::new("orders").with_property(ROUTING_KEY_PROPERTY, 42);

    assert_eq!(queue.routing_key(), "42");
}

#[test]
fn test_non_integer_ttl_is_rejected() {
    let dlq = Queue::new("orders.dead").with_property(AMQP_HEADERS_MESSAGE_TTL, "5000");

    let err = Queue::new("orders").with_dead_letter_queue(dlq).unwrap_err();

    assert!(matches!(err, MessagingError::InvalidQueue(_)));
}

#[test]
fn test_non_integer_expires_is_rejected() {
    let err = Queue::new("orders")
        .with_property(AMQP_HEADERS_EXPIRES, 1.5)
        .validate()
        .unwrap_err();

    assert!(matches!(err, MessagingError::InvalidQueue(_)));
}

#[test]
fn test_integer_ttl_is_accepted() {
    let dlq = Queue::new("orders.dead").with_property(AMQP_HEADERS_MESSAGE_TTL, 5000);

    assert!(Queue::new("orders").with_dead_letter_queue(dlq).is_ok());
}
