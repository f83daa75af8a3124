// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration
//!
//! Trace context travels inside message headers: the publisher injects the
//! current context through the global text map propagator, the consumer
//! extracts it again and opens a consumer span for every delivery.

use opentelemetry::{
    global::{self, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, TraceContextExt, Tracer},
    Context,
};
use serde_json::Value;
use std::{borrow::Cow, collections::BTreeMap};

/// Name of the tracer used for consumer spans.
pub(crate) const TRACER_NAME: &str = "message-queue-client";

/// Adapter letting the propagator read and write message headers.
///
/// Keys are lowercased on injection. Only string headers are visible to
/// extraction.
pub(crate) struct HeaderPropagator<'a> {
    headers: &'a mut BTreeMap<String, Value>,
}

impl<'a> HeaderPropagator<'a> {
    /// Wraps a header map.
    ///
    /// # Parameters
    /// * `headers` - The message headers to read from or write into
    ///
    /// # Returns
    /// A new HeaderPropagator borrowing the headers
    pub(crate) fn new(headers: &'a mut BTreeMap<String, Value>) -> Self {
        Self { headers }
    }
}

impl Injector for HeaderPropagator<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(key.to_lowercase(), Value::String(value));
    }
}

impl Extractor for HeaderPropagator<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(Value::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(String::as_str).collect()
    }
}

/// Writes the current trace context into `headers`.
///
/// Uses the global text map propagator; with none installed the headers are
/// left unchanged.
///
/// # Parameters
/// * `headers` - The outgoing message headers
pub(crate) fn inject_current(headers: &mut BTreeMap<String, Value>) {
    let ctx = Context::current();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&ctx, &mut HeaderPropagator::new(headers))
    });
}

/// Returns the global tracer consumer spans are started with.
pub(crate) fn tracer() -> BoxedTracer {
    global::tracer(TRACER_NAME)
}

/// Starts a consumer span for a delivery, parented by the context carried in
/// its headers.
///
/// # Parameters
/// * `headers` - The delivery headers carrying the propagated context
/// * `tracer` - The tracer to start the span with
/// * `name` - The span name, the queue name for consumers
///
/// # Returns
/// The propagated context with the new span as its active span
pub(crate) fn new_span(
    headers: &BTreeMap<String, Value>,
    tracer: &BoxedTracer,
    name: &str,
) -> Context {
    let mut carrier = headers.clone();
    let ctx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderPropagator::new(&mut carrier))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    ctx.with_span(span)
}
