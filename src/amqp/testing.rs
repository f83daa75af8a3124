// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker recording every operation it receives.
//!
//! It routes messages like RabbitMQ does for direct and fanout exchanges,
//! pushes them to registered consumers, requeues and dead letters nacked
//! deliveries and rejects inequivalent redeclarations.

use crate::{
    amqp::{
        errors::AmqpError,
        exchange::{ExchangeDefinition, ExchangeKind},
        queue::{QueueBinding, QueueDefinition, AMQP_HEADERS_DEAD_LETTER_EXCHANGE},
        transport::{
            AmqpChannel, AmqpConnection, AmqpDialer, DeliveryAcker, DeliveryStream,
            InboundDelivery,
        },
        values::{from_properties, to_properties},
    },
    config::ConnectorConfig,
    errors::MessagingError,
    message::Message,
    uri::ConnectionUri,
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use lapin::BasicProperties;
use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Dial,
    CreateChannel(usize),
    DeclareQueue { channel: usize, queue: QueueDefinition },
    DeclareExchange { channel: usize, exchange: ExchangeDefinition },
    Bind { channel: usize, binding: QueueBinding },
    Qos { channel: usize, prefetch_count: u16 },
    Publish { channel: usize, exchange: String, routing_key: String },
    Consume { channel: usize, queue: String, consumer_tag: String },
    Cancel { channel: usize, consumer_tag: String },
    Ack(u64),
    Nack { delivery_tag: u64, requeue: bool },
    CloseChannel(usize),
    CloseConnection(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FailPoint {
    Dial,
    CreateChannel,
    DeclareQueue,
    DeclareExchange,
    Bind,
    Publish,
    Consume,
    Cancel,
    Ack,
    Nack,
    CloseChannel,
    CloseConnection,
}

type DeliverySender = mpsc::UnboundedSender<Result<InboundDelivery, AmqpError>>;

#[derive(Debug, Clone)]
struct Stored {
    exchange: String,
    routing_key: String,
    properties: BasicProperties,
    body: Vec<u8>,
    redelivered: bool,
}

struct Subscription {
    channel: usize,
    consumer_tag: String,
    sender: DeliverySender,
}

struct QueueState {
    def: QueueDefinition,
    ready: VecDeque<Stored>,
    consumer: Option<Subscription>,
}

#[derive(Default)]
struct BrokerState {
    ops: Vec<Op>,
    queues: BTreeMap<String, QueueState>,
    exchanges: BTreeMap<String, ExchangeDefinition>,
    bindings: Vec<QueueBinding>,
    failures: HashSet<FailPoint>,
    next_connection: usize,
    next_channel: usize,
    next_delivery_tag: u64,
}

impl BrokerState {
    fn check(&self, point: FailPoint, err: impl FnOnce() -> AmqpError) -> Result<(), AmqpError> {
        if self.failures.contains(&point) {
            Err(err())
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    pub(crate) fn new() -> FakeBroker {
        FakeBroker::default()
    }

    pub(crate) fn dialer(&self) -> Arc<dyn AmqpDialer> {
        Arc::new(FakeDialer {
            broker: self.clone(),
        })
    }

    pub(crate) fn connect(&self) -> Arc<dyn AmqpConnection> {
        let mut state = self.lock();
        state.ops.push(Op::Dial);
        state.next_connection += 1;

        Arc::new(FakeConnection {
            id: state.next_connection,
            broker: self.clone(),
            connected: AtomicBool::new(true),
        })
    }

    /// Makes every later call of the given kind fail.
    pub(crate) fn fail(&self, point: FailPoint) {
        self.lock().failures.insert(point);
    }

    pub(crate) fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    pub(crate) fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    /// Names of the declared queues, in declaration order, repeats included.
    pub(crate) fn queue_declarations(&self) -> Vec<String> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::DeclareQueue { queue, .. } => Some(queue.name.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn queue(&self, name: &str) -> Option<QueueDefinition> {
        self.lock().queues.get(name).map(|q| q.def.clone())
    }

    pub(crate) fn exchange(&self, name: &str) -> Option<ExchangeDefinition> {
        self.lock().exchanges.get(name).cloned()
    }

    pub(crate) fn bindings(&self) -> Vec<QueueBinding> {
        self.lock().bindings.clone()
    }

    /// Messages waiting in `queue` with no consumer to take them.
    pub(crate) fn ready(&self, queue: &str) -> Vec<Message> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(to_message).collect())
            .unwrap_or_default()
    }

    pub(crate) fn has_consumer(&self, queue: &str) -> bool {
        self.lock()
            .queues
            .get(queue)
            .is_some_and(|q| q.consumer.is_some())
    }

    pub(crate) fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.lock().ops.iter().filter(|op| pred(op)).count()
    }

    /// Publishes as another producer would, without recording an operation.
    pub(crate) fn inject(&self, exchange: &str, routing_key: &str, message: &Message) -> Result<(), AmqpError> {
        let mut state = self.lock();
        self.route(&mut state, exchange, routing_key, stored(exchange, routing_key, message))
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn route(
        &self,
        state: &mut BrokerState,
        exchange: &str,
        routing_key: &str,
        message: Stored,
    ) -> Result<(), AmqpError> {
        let Some(def) = state.exchanges.get(exchange) else {
            return Err(AmqpError::PublishingError(
                exchange.to_owned(),
                format!("NOT_FOUND - no exchange '{}'", exchange),
            ));
        };
        let fanout = def.kind == ExchangeKind::Fanout;

        let targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|b| b.exchange_name == exchange && (fanout || b.routing_key == routing_key))
            .map(|b| b.queue_name.clone())
            .collect();

        for queue in targets {
            self.enqueue(state, &queue, message.clone());
        }

        Ok(())
    }

    fn enqueue(&self, state: &mut BrokerState, queue: &str, message: Stored) {
        let Some(q) = state.queues.get_mut(queue) else {
            return;
        };

        if let Some(subscription) = &q.consumer {
            state.next_delivery_tag += 1;
            let delivery_tag = state.next_delivery_tag;
            let delivery = InboundDelivery {
                delivery_tag,
                redelivered: message.redelivered,
                exchange: message.exchange.clone(),
                routing_key: message.routing_key.clone(),
                message_count: None,
                message: to_message(&message),
                acker: Box::new(FakeAcker {
                    broker: self.clone(),
                    delivery_tag,
                    queue: queue.to_owned(),
                    message: message.clone(),
                }),
            };

            if subscription.sender.send(Ok(delivery)).is_ok() {
                return;
            }
            q.consumer = None;
        }

        q.ready.push_back(message);
    }

    fn drop_subscriptions(state: &mut BrokerState, matches: impl Fn(&Subscription) -> bool) {
        for q in state.queues.values_mut() {
            if q.consumer.as_ref().is_some_and(&matches) {
                q.consumer = None;
            }
        }
    }
}

fn stored(exchange: &str, routing_key: &str, message: &Message) -> Stored {
    Stored {
        exchange: exchange.to_owned(),
        routing_key: routing_key.to_owned(),
        properties: to_properties(message.headers()),
        body: message.body().to_vec(),
        redelivered: false,
    }
}

fn to_message(stored: &Stored) -> Message {
    Message::new(stored.body.clone()).with_headers(from_properties(&stored.properties))
}

struct FakeDialer {
    broker: FakeBroker,
}

#[async_trait]
impl AmqpDialer for FakeDialer {
    async fn dial(
        &self,
        uri: &ConnectionUri,
        _cfg: &ConnectorConfig,
    ) -> Result<Arc<dyn AmqpConnection>, MessagingError> {
        self.broker
            .lock()
            .check(FailPoint::Dial, || AmqpError::ConnectionError(format!("cannot reach {}", uri.host())))?;

        Ok(self.broker.connect())
    }
}

pub(crate) struct FakeConnection {
    id: usize,
    broker: FakeBroker,
    connected: AtomicBool,
}

#[async_trait]
impl AmqpConnection for FakeConnection {
    async fn create_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        if !self.is_connected() {
            return Err(AmqpError::ChannelError("connection is closed".to_owned()));
        }

        let mut state = self.broker.lock();
        state.check(FailPoint::CreateChannel, || {
            AmqpError::ChannelError("channel_max reached".to_owned())
        })?;

        state.next_channel += 1;
        let id = state.next_channel;
        state.ops.push(Op::CreateChannel(id));

        Ok(Arc::new(FakeChannel {
            id,
            broker: self.broker.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), AmqpError> {
        let mut state = self.broker.lock();
        state.ops.push(Op::CloseConnection(self.id));
        state.check(FailPoint::CloseConnection, || {
            AmqpError::CloseError("connection reset".to_owned())
        })?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeChannel {
    id: usize,
    broker: FakeBroker,
    closed: AtomicBool,
}

impl FakeChannel {
    fn ensure_open(&self) -> Result<(), AmqpError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(AmqpError::ChannelError(format!("channel {} is closed", self.id)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AmqpChannel for FakeChannel {
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        state.ops.push(Op::DeclareQueue {
            channel: self.id,
            queue: def.clone(),
        });
        state.check(FailPoint::DeclareQueue, || {
            AmqpError::DeclareQueueError(def.name.clone(), "access refused".to_owned())
        })?;

        let inequivalent = state
            .queues
            .get(&def.name)
            .map(|q| q.def.args != def.args || q.def.durable != def.durable);

        match inequivalent {
            Some(true) => Err(AmqpError::DeclareQueueError(
                def.name.clone(),
                "PRECONDITION_FAILED - inequivalent arg".to_owned(),
            )),
            Some(false) => Ok(()),
            None => {
                state.queues.insert(
                    def.name.clone(),
                    QueueState {
                        def: def.clone(),
                        ready: VecDeque::new(),
                        consumer: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        state.ops.push(Op::DeclareExchange {
            channel: self.id,
            exchange: def.clone(),
        });
        state.check(FailPoint::DeclareExchange, || {
            AmqpError::DeclareExchangeError(def.name.clone(), "access refused".to_owned())
        })?;

        let inequivalent = state.exchanges.get(&def.name).map(|e| e.kind != def.kind);

        match inequivalent {
            Some(true) => Err(AmqpError::DeclareExchangeError(
                def.name.clone(),
                "PRECONDITION_FAILED - inequivalent arg 'type'".to_owned(),
            )),
            Some(false) => Ok(()),
            None => {
                state.exchanges.insert(def.name.clone(), def.clone());
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        state.ops.push(Op::Bind {
            channel: self.id,
            binding: binding.clone(),
        });
        state.check(FailPoint::Bind, || {
            AmqpError::BindingExchangeToQueueError(
                binding.exchange_name.clone(),
                binding.queue_name.clone(),
                "access refused".to_owned(),
            )
        })?;

        if !state.queues.contains_key(&binding.queue_name)
            || !state.exchanges.contains_key(&binding.exchange_name)
        {
            return Err(AmqpError::BindingExchangeToQueueError(
                binding.exchange_name.clone(),
                binding.queue_name.clone(),
                "NOT_FOUND".to_owned(),
            ));
        }

        if !state.bindings.contains(binding) {
            state.bindings.push(binding.clone());
        }
        Ok(())
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        self.ensure_open()?;
        self.broker.lock().ops.push(Op::Qos {
            channel: self.id,
            prefetch_count,
        });
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, message: &Message) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        state.ops.push(Op::Publish {
            channel: self.id,
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        });
        state.check(FailPoint::Publish, || {
            AmqpError::PublishingError(exchange.to_owned(), "connection blocked".to_owned())
        })?;

        self.broker
            .route(&mut state, exchange, routing_key, stored(exchange, routing_key, message))
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        state.ops.push(Op::Consume {
            channel: self.id,
            queue: queue.to_owned(),
            consumer_tag: consumer_tag.to_owned(),
        });
        state.check(FailPoint::Consume, || {
            AmqpError::BindingConsumerError(queue.to_owned(), "access refused".to_owned())
        })?;

        let Some(q) = state.queues.get_mut(queue) else {
            return Err(AmqpError::BindingConsumerError(
                queue.to_owned(),
                format!("NOT_FOUND - no queue '{}'", queue),
            ));
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        q.consumer = Some(Subscription {
            channel: self.id,
            consumer_tag: consumer_tag.to_owned(),
            sender,
        });

        let waiting: Vec<Stored> = q.ready.drain(..).collect();
        for message in waiting {
            self.broker.enqueue(&mut state, queue, message);
        }

        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        })
        .boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        state.ops.push(Op::Cancel {
            channel: self.id,
            consumer_tag: consumer_tag.to_owned(),
        });
        state.check(FailPoint::Cancel, || {
            AmqpError::CancelConsumerError(consumer_tag.to_owned(), "channel error".to_owned())
        })?;

        FakeBroker::drop_subscriptions(&mut state, |s| s.consumer_tag == consumer_tag);
        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        let mut state = self.broker.lock();
        state.ops.push(Op::CloseChannel(self.id));
        state.check(FailPoint::CloseChannel, || {
            AmqpError::CloseError("channel already closed".to_owned())
        })?;

        self.closed.store(true, Ordering::SeqCst);
        let id = self.id;
        FakeBroker::drop_subscriptions(&mut state, |s| s.channel == id);
        Ok(())
    }
}

struct FakeAcker {
    broker: FakeBroker,
    delivery_tag: u64,
    queue: String,
    message: Stored,
}

#[async_trait]
impl DeliveryAcker for FakeAcker {
    async fn ack(&self) -> Result<(), AmqpError> {
        let mut state = self.broker.lock();
        state.ops.push(Op::Ack(self.delivery_tag));
        state.check(FailPoint::Ack, || AmqpError::AckMessageError("unknown delivery tag".to_owned()))
    }

    async fn nack(&self, requeue: bool) -> Result<(), AmqpError> {
        let mut state = self.broker.lock();
        state.ops.push(Op::Nack {
            delivery_tag: self.delivery_tag,
            requeue,
        });
        state.check(FailPoint::Nack, || {
            AmqpError::NackMessageError("unknown delivery tag".to_owned())
        })?;

        if requeue {
            let mut message = self.message.clone();
            message.redelivered = true;
            self.broker.enqueue(&mut state, &self.queue, message);
            return Ok(());
        }

        let dead_letter_exchange = state
            .queues
            .get(&self.queue)
            .and_then(|q| q.def.args.get(AMQP_HEADERS_DEAD_LETTER_EXCHANGE))
            .and_then(|v| v.as_str())
            .map(str::to_owned);

        if let Some(exchange) = dead_letter_exchange {
            let mut message = self.message.clone();
            message.exchange = exchange.clone();
            let routing_key = message.routing_key.clone();
            self.broker.route(&mut state, &exchange, &routing_key, message)?;
        }

        Ok(())
    }
}
