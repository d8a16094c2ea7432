//! Event dispatcher.
//!
//! One consumer per bound topic. Each consumer handles its messages one at a
//! time in arrival order, so ordering within a topic is preserved while the
//! topics themselves run independently of each other.
//!
//! Consumer lifecycle: `Created -> Subscribed -> Consuming -> Closed`.
//!
//! Every message is acknowledged once handling finishes, whatever the outcome.
//! What happens to a message whose handling failed is up to the
//! [`FailurePolicy`].

use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures_util::{StreamExt, stream::BoxStream};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    command::NotificationCommand,
    models::{
        error::NotificationError,
        message::{DlqMessage, InboundMessage, NotificationEvent, Topic},
        retry::FailurePolicy,
    },
    utils::retry_with_backoff,
};

/// Transport the dispatcher consumes from.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<BoxStream<'static, Result<InboundMessage, Error>>, Error>;

    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), Error>;

    async fn publish_dead_letter(&self, message: &DlqMessage) -> Result<(), Error>;

    async fn health_check(&self) -> Result<(), Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// The payload did not match the topic's shape (or the topic is unbound).
    Undecodable(String),
    Failed(NotificationError),
    DeadLettered(String),
}

pub struct Dispatcher {
    command: Arc<dyn NotificationCommand>,
    bus: Arc<dyn MessageBus>,
    bindings: HashMap<String, Topic>,
    policy: FailurePolicy,
}

impl Dispatcher {
    pub fn new(command: Arc<dyn NotificationCommand>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            command,
            bus,
            bindings: HashMap::new(),
            policy: FailurePolicy::default(),
        }
    }

    /// Routes messages arriving on `name` as `topic`-shaped payloads.
    pub fn bind(mut self, name: impl Into<String>, topic: Topic) -> Self {
        self.bindings.insert(name.into(), topic);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn failure_policy(&self) -> &FailurePolicy {
        &self.policy
    }

    /// Decodes one message and runs the matching pipeline operation.
    pub async fn dispatch(&self, message: &InboundMessage) -> DispatchOutcome {
        let span = info_span!(
            "message",
            topic = %message.topic,
            delivery_tag = message.delivery_tag,
            correlation_id = %Uuid::new_v4()
        );

        self.dispatch_inner(message).instrument(span).await
    }

    async fn dispatch_inner(&self, message: &InboundMessage) -> DispatchOutcome {
        let event = match self.decode(message) {
            Ok(event) => event,
            Err(reason) => {
                error!(
                    payload = %message.payload_lossy(),
                    reason = %reason,
                    "Failed to decode message"
                );
                return match self.policy {
                    FailurePolicy::DeadLetter => self.dead_letter(message, reason).await,
                    _ => DispatchOutcome::Undecodable(reason),
                };
            }
        };

        let result = match &self.policy {
            FailurePolicy::Retry(retry) => {
                retry_with_backoff(retry, NotificationError::is_transient, || {
                    self.handle(&event)
                })
                .await
            }
            FailurePolicy::Drop | FailurePolicy::DeadLetter => self.handle(&event).await,
        };

        match result {
            Ok(()) => {
                debug!("Message handled");
                DispatchOutcome::Delivered
            }
            Err(e) => {
                error!(
                    error = %e,
                    kind = e.kind(),
                    policy = self.policy.name(),
                    "Notification handling failed"
                );

                match self.policy {
                    FailurePolicy::DeadLetter => self.dead_letter(message, e.to_string()).await,
                    _ => DispatchOutcome::Failed(e),
                }
            }
        }
    }

    fn decode(&self, message: &InboundMessage) -> Result<NotificationEvent, String> {
        let topic = self
            .bindings
            .get(&message.topic)
            .ok_or_else(|| format!("no handler bound to topic {}", message.topic))?;

        NotificationEvent::decode(*topic, &message.payload).map_err(|e| e.to_string())
    }

    async fn handle(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        match event {
            NotificationEvent::RegisterOtp(otp) => self.command.send_registration_otp(otp).await,
            NotificationEvent::TicketRequested { order_id } => {
                self.command.send_ticket_email(order_id).await
            }
        }
    }

    async fn dead_letter(&self, message: &InboundMessage, reason: String) -> DispatchOutcome {
        let dlq_message = DlqMessage {
            topic: message.topic.clone(),
            original_payload: message.payload_lossy(),
            failure_reason: reason.clone(),
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        match self.bus.publish_dead_letter(&dlq_message).await {
            Ok(()) => {
                warn!(reason = %reason, "Message sent to dead letter queue");
                DispatchOutcome::DeadLettered(reason)
            }
            Err(e) => {
                error!(error = %e, reason = %reason, "Failed to publish to dead letter queue");
                DispatchOutcome::Failed(NotificationError::internal(reason))
            }
        }
    }

    /// Starts one consumer task per bound topic.
    pub fn spawn_consumers(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<Result<u64, Error>>> {
        self.topics()
            .map(|topic| {
                let mut consumer =
                    TopicConsumer::new(topic, Arc::clone(&self.bus), Arc::clone(self));
                let shutdown = shutdown.clone();

                tokio::spawn(async move { consumer.run(shutdown).await })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Created,
    Subscribed,
    Consuming,
    Closed,
}

pub struct TopicConsumer {
    topic: String,
    bus: Arc<dyn MessageBus>,
    dispatcher: Arc<Dispatcher>,
    state: ConsumerState,
}

impl TopicConsumer {
    pub fn new(topic: &str, bus: Arc<dyn MessageBus>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            topic: topic.to_string(),
            bus,
            dispatcher,
            state: ConsumerState::Created,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Consumes until the stream ends or `shutdown` flips to `true`.
    /// Returns the number of messages handled.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<u64, Error> {
        let mut stream = match self.bus.subscribe(&self.topic).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = ConsumerState::Closed;
                return Err(e);
            }
        };
        self.state = ConsumerState::Subscribed;

        info!(topic = %self.topic, "Consumer subscribed, waiting for messages");

        let mut processed = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => {
                            self.state = ConsumerState::Consuming;

                            let outcome = self.dispatcher.dispatch(&message).await;
                            debug!(topic = %self.topic, outcome = ?outcome, "Message processed");

                            if let Err(e) = self.bus.acknowledge(&message).await {
                                error!(topic = %self.topic, error = %e, "Failed to acknowledge message");
                            }

                            processed += 1;
                        }
                        Some(Err(e)) => {
                            error!(topic = %self.topic, error = %e, "Consumer stream failed");
                            self.state = ConsumerState::Closed;
                            return Err(e);
                        }
                        None => {
                            warn!(topic = %self.topic, "Consumer stream ended");
                            break;
                        }
                    }
                }
            }
        }

        self.state = ConsumerState::Closed;
        info!(topic = %self.topic, processed, "Consumer closed");

        Ok(processed)
    }
}
