// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Value Conversion
//!
//! Headers and queue properties are JSON values on the client side. This
//! module maps them to AMQP field values and splits message headers into the
//! AMQP basic properties and the custom headers table, and back.

use crate::message::{HEADER_CONTENT_TYPE, HEADER_DELIVERY_MODE, HEADER_MESSAGE_ID};
use lapin::{
    types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString},
    BasicProperties,
};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

pub const HEADER_CONTENT_ENCODING: &str = "content_encoding";
pub const HEADER_PRIORITY: &str = "priority";
pub const HEADER_CORRELATION_ID: &str = "correlation_id";
pub const HEADER_REPLY_TO: &str = "reply_to";
pub const HEADER_EXPIRATION: &str = "expiration";
pub const HEADER_TIMESTAMP: &str = "timestamp";
pub const HEADER_TYPE: &str = "type";
pub const HEADER_USER_ID: &str = "user_id";
pub const HEADER_APP_ID: &str = "app_id";
pub const HEADER_CLUSTER_ID: &str = "cluster_id";

/// Converts a JSON value to the closest AMQP field value.
pub fn to_amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AMQPValue::LongLongInt(i)
            } else {
                AMQPValue::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => AMQPValue::LongString(LongString::from(s.as_str())),
        Value::Array(values) => AMQPValue::FieldArray(FieldArray::from(
            values.iter().map(to_amqp_value).collect::<Vec<_>>(),
        )),
        Value::Object(map) => AMQPValue::FieldTable(to_field_table(map.iter())),
    }
}

/// Converts an AMQP field value back to JSON.
pub fn from_amqp_value(value: &AMQPValue) -> Value {
    #[allow(unreachable_patterns)]
    match value {
        AMQPValue::Boolean(b) => Value::Bool(*b),
        AMQPValue::ShortShortInt(v) => Value::from(*v),
        AMQPValue::ShortShortUInt(v) => Value::from(*v),
        AMQPValue::ShortInt(v) => Value::from(*v),
        AMQPValue::ShortUInt(v) => Value::from(*v),
        AMQPValue::LongInt(v) => Value::from(*v),
        AMQPValue::LongUInt(v) => Value::from(*v),
        AMQPValue::LongLongInt(v) => Value::from(*v),
        AMQPValue::Timestamp(v) => Value::from(*v),
        AMQPValue::Float(v) => float(f64::from(*v)),
        AMQPValue::Double(v) => float(*v),
        AMQPValue::DecimalValue(d) => {
            float(f64::from(d.value) / 10f64.powi(i32::from(d.scale)))
        }
        AMQPValue::ShortString(s) => Value::String(s.as_str().to_owned()),
        AMQPValue::LongString(s) => {
            Value::String(String::from_utf8_lossy(s.as_bytes()).into_owned())
        }
        AMQPValue::FieldArray(values) => {
            Value::Array(values.as_slice().iter().map(from_amqp_value).collect())
        }
        AMQPValue::FieldTable(table) => Value::Object(from_field_table(table)),
        AMQPValue::ByteArray(bytes) => {
            Value::Array(bytes.as_slice().iter().map(|b| Value::from(*b)).collect())
        }
        AMQPValue::Void => Value::Null,
        _ => Value::Null,
    }
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

/// Builds an AMQP table out of JSON key/value pairs.
pub fn to_field_table<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> FieldTable {
    let mut table = BTreeMap::new();
    for (key, value) in entries {
        table.insert(ShortString::from(key.as_str()), to_amqp_value(value));
    }
    FieldTable::from(table)
}

pub fn from_field_table(table: &FieldTable) -> Map<String, Value> {
    table
        .inner()
        .iter()
        .map(|(k, v)| (k.as_str().to_owned(), from_amqp_value(v)))
        .collect()
}

fn short_string(value: &Value) -> ShortString {
    match value {
        Value::String(s) => ShortString::from(s.as_str()),
        other => ShortString::from(other.to_string()),
    }
}

fn small_uint(value: &Value) -> Option<u8> {
    value.as_u64().and_then(|v| u8::try_from(v).ok())
}

/// Splits message headers into AMQP basic properties and the custom headers table.
///
/// Reserved keys (`content_type`, `delivery_mode`, `message_id`, ...) become
/// properties; every other header ends up in the headers table.
///
/// # Parameters
/// * `headers` - The outgoing message headers
///
/// # Returns
/// The basic properties to publish with
pub fn to_properties(headers: &BTreeMap<String, Value>) -> BasicProperties {
    let mut props = BasicProperties::default();
    let mut table = BTreeMap::new();

    for (key, value) in headers {
        props = match key.as_str() {
            HEADER_CONTENT_TYPE => props.with_content_type(short_string(value)),
            HEADER_CONTENT_ENCODING => props.with_content_encoding(short_string(value)),
            HEADER_CORRELATION_ID => props.with_correlation_id(short_string(value)),
            HEADER_REPLY_TO => props.with_reply_to(short_string(value)),
            HEADER_EXPIRATION => props.with_expiration(short_string(value)),
            HEADER_MESSAGE_ID => props.with_message_id(short_string(value)),
            HEADER_TYPE => props.with_type(short_string(value)),
            HEADER_USER_ID => props.with_user_id(short_string(value)),
            HEADER_APP_ID => props.with_app_id(short_string(value)),
            HEADER_CLUSTER_ID => props.with_cluster_id(short_string(value)),
            HEADER_DELIVERY_MODE if small_uint(value).is_some() => {
                props.with_delivery_mode(small_uint(value).unwrap_or_default())
            }
            HEADER_PRIORITY if small_uint(value).is_some() => {
                props.with_priority(small_uint(value).unwrap_or_default())
            }
            HEADER_TIMESTAMP if value.as_u64().is_some() => {
                props.with_timestamp(value.as_u64().unwrap_or_default())
            }
            _ => {
                table.insert(ShortString::from(key.as_str()), to_amqp_value(value));
                props
            }
        };
    }

    if table.is_empty() {
        props
    } else {
        props.with_headers(FieldTable::from(table))
    }
}

/// Flattens AMQP basic properties and the headers table into message headers.
///
/// # Parameters
/// * `props` - The properties of a delivery
///
/// # Returns
/// One header per property that is set, plus every custom header
pub fn from_properties(props: &BasicProperties) -> BTreeMap<String, Value> {
    let mut headers = BTreeMap::new();

    if let Some(table) = props.headers() {
        headers.extend(from_field_table(table));
    }

    let strings = [
        (HEADER_CONTENT_TYPE, props.content_type()),
        (HEADER_CONTENT_ENCODING, props.content_encoding()),
        (HEADER_CORRELATION_ID, props.correlation_id()),
        (HEADER_REPLY_TO, props.reply_to()),
        (HEADER_EXPIRATION, props.expiration()),
        (HEADER_MESSAGE_ID, props.message_id()),
        (HEADER_TYPE, props.kind()),
        (HEADER_USER_ID, props.user_id()),
        (HEADER_APP_ID, props.app_id()),
        (HEADER_CLUSTER_ID, props.cluster_id()),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            headers.insert(key.to_owned(), Value::String(value.as_str().to_owned()));
        }
    }

    if let Some(mode) = props.delivery_mode() {
        headers.insert(HEADER_DELIVERY_MODE.to_owned(), Value::from(*mode));
    }
    if let Some(priority) = props.priority() {
        headers.insert(HEADER_PRIORITY.to_owned(), Value::from(*priority));
    }
    if let Some(timestamp) = props.timestamp() {
        headers.insert(HEADER_TIMESTAMP.to_owned(), Value::from(*timestamp));
    }

    headers
}

#[cfg(test)]
#[path = "values_tests.rs"]
mod tests;
