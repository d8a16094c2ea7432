use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{
    StreamExt,
    stream::{self, BoxStream},
};
use serde_json::Value;
use ticket_notification::{
    clients::{
        database::{OrderQuery, OrderRepository, OrderStore},
        mail::MailSender,
        pdf::PdfRenderer,
        qr::{PngQrEncoder, QrEncoder},
        template::{HtmlRenderer, TemplateRenderer},
    },
    command::{NotificationCommand, NotificationPipeline, PipelineSettings},
    dispatcher::MessageBus,
    models::{
        error::NotificationError,
        mail::{MailRequest, Sender},
        message::{DlqMessage, InboundMessage, RegisterOtp},
        order::Order,
    },
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub fn sample_order(order_id: &str, ticket_number: &str) -> Order {
    Order {
        order_id: order_id.to_string(),
        payment_id: "P1".to_string(),
        full_name: "Alif Septian".to_string(),
        email: "a@x.com".to_string(),
        mobile_number: "08110000000".to_string(),
        event_name: "Concert".to_string(),
        event_time: None,
        event_place: "Jakarta".to_string(),
        ticket_number: ticket_number.to_string(),
        ticket_type: "VIP".to_string(),
        seat_number: 12,
        amount: 150,
        bank: "BCA".to_string(),
        order_time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        date_time: Utc.with_ymd_and_hms(2024, 2, 3, 19, 30, 0).unwrap(),
    }
}

pub fn sample_otp() -> RegisterOtp {
    RegisterOtp {
        user_id: "u1".to_string(),
        full_name: "Alif Septian".to_string(),
        email: "a@x.com".to_string(),
        otp: "123456".to_string(),
    }
}

pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("ticket-notification-{}", Uuid::new_v4()))
}

/// Order store backed by a map, optionally failing or slow.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
    failure: Option<String>,
    delay: Option<Duration>,
    lookups: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn with_orders(orders: Vec<Order>) -> Self {
        Self {
            orders: Mutex::new(
                orders
                    .into_iter()
                    .map(|order| (order.order_id.clone(), order))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration, orders: Vec<Order>) -> Self {
        Self {
            delay: Some(delay),
            ..Self::with_orders(orders)
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, Error> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = &self.failure {
            return Err(anyhow!("{}", reason));
        }

        Ok(self.orders.lock().unwrap().get(order_id).cloned())
    }

    async fn health_check(&self) -> Result<(), Error> {
        match &self.failure {
            Some(reason) => Err(anyhow!("{}", reason)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub request: MailRequest,
    /// Attachment content as it was on disk at send time.
    pub attachment: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    attempts: AtomicUsize,
    fail: bool,
    consume_attachments: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Delivers, then deletes the attachment so the sender's own cleanup
    /// finds nothing to remove.
    pub fn consuming() -> Self {
        Self {
            consume_attachments: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, mail: &MailRequest) -> Result<(), Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(anyhow!("SMTP delivery failed: 421 service not available"));
        }

        let attachment = match &mail.attachment {
            Some(path) => Some(tokio::fs::read(path).await?),
            None => None,
        };

        self.sent.lock().unwrap().push(SentMail {
            request: mail.clone(),
            attachment,
        });

        if self.consume_attachments {
            if let Some(path) = &mail.attachment {
                tokio::fs::remove_file(path).await?;
            }
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        if self.fail {
            return Err(anyhow!("SMTP server did not accept the connection"));
        }

        Ok(())
    }
}

/// Renders the real template and wraps the HTML in a fixed PDF header, so
/// output is deterministic and a broken view model still fails.
pub struct FakePdfRenderer {
    html: TemplateRenderer,
    calls: AtomicUsize,
    fail: bool,
}

impl FakePdfRenderer {
    pub fn new() -> Self {
        Self {
            html: TemplateRenderer::new().unwrap(),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PdfRenderer for FakePdfRenderer {
    async fn render_pdf(&self, template: &str, view: &Value) -> Result<Vec<u8>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(anyhow!("Headless browser exited with exit status: 1"));
        }

        let html = self.html.render_html(template, view)?;
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend_from_slice(html.as_bytes());

        Ok(pdf)
    }
}

pub struct FailingQrEncoder;

impl QrEncoder for FailingQrEncoder {
    fn encode(&self, _content: &str) -> Result<Vec<u8>, Error> {
        Err(anyhow!("data too long"))
    }
}

#[derive(Default)]
pub struct HarnessOptions {
    pub orders: Vec<Order>,
    pub order_query: Option<Arc<dyn OrderQuery>>,
    pub failing_store: Option<String>,
    pub failing_mail: bool,
    pub consuming_mail: bool,
    pub failing_pdf: bool,
    pub failing_qr: bool,
    pub retain_failed_artifacts: bool,
}

/// A pipeline wired to in-memory collaborators.
pub struct Harness {
    pub store: Arc<InMemoryOrderStore>,
    pub mailer: Arc<RecordingMailer>,
    pub pdf: Arc<FakePdfRenderer>,
    pub artifact_dir: PathBuf,
    pub pipeline: Arc<NotificationPipeline>,
}

impl Harness {
    pub fn with_orders(orders: Vec<Order>) -> Self {
        Self::with(HarnessOptions {
            orders,
            ..Default::default()
        })
    }

    pub fn with(options: HarnessOptions) -> Self {
        let store = Arc::new(match options.failing_store {
            Some(reason) => InMemoryOrderStore::failing(&reason),
            None => InMemoryOrderStore::with_orders(options.orders),
        });
        let mailer = Arc::new(if options.failing_mail {
            RecordingMailer::failing()
        } else if options.consuming_mail {
            RecordingMailer::consuming()
        } else {
            RecordingMailer::default()
        });
        let pdf = Arc::new(if options.failing_pdf {
            FakePdfRenderer::failing()
        } else {
            FakePdfRenderer::new()
        });
        let qr: Arc<dyn QrEncoder> = if options.failing_qr {
            Arc::new(FailingQrEncoder)
        } else {
            Arc::new(PngQrEncoder::default())
        };
        let orders: Arc<dyn OrderQuery> = match options.order_query {
            Some(query) => query,
            None => Arc::new(OrderRepository::new(store.clone(), Duration::from_secs(5))),
        };

        let artifact_dir = scratch_dir();
        let settings = PipelineSettings {
            sender: Sender {
                name: "Soldev Concert Organizer".to_string(),
                address: "noreply@example.com".to_string(),
            },
            artifact_dir: artifact_dir.clone(),
            retain_failed_artifacts: options.retain_failed_artifacts,
        };

        let pipeline = Arc::new(NotificationPipeline::new(
            orders,
            mailer.clone(),
            Arc::new(TemplateRenderer::new().unwrap()),
            pdf.clone(),
            qr,
            settings,
        ));

        Self {
            store,
            mailer,
            pdf,
            artifact_dir,
            pipeline,
        }
    }

    pub fn artifact_exists(&self, ticket_number: &str) -> bool {
        self.pipeline.artifact_path(ticket_number).exists()
    }
}

/// Records every call; fails calls while queued failures remain.
#[derive(Default)]
pub struct RecordingCommand {
    pub otps: Mutex<Vec<RegisterOtp>>,
    pub tickets: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<NotificationError>>,
}

impl RecordingCommand {
    pub fn failing_with(failures: Vec<NotificationError>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            ..Default::default()
        }
    }

    pub fn tickets(&self) -> Vec<String> {
        self.tickets.lock().unwrap().clone()
    }

    pub fn otps(&self) -> Vec<RegisterOtp> {
        self.otps.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> Result<(), NotificationError> {
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationCommand for RecordingCommand {
    async fn send_registration_otp(&self, event: &RegisterOtp) -> Result<(), NotificationError> {
        self.otps.lock().unwrap().push(event.clone());
        self.next_outcome()
    }

    async fn send_ticket_email(&self, order_id: &str) -> Result<(), NotificationError> {
        self.tickets.lock().unwrap().push(order_id.to_string());
        self.next_outcome()
    }
}

/// Bus with one unbounded channel per topic. Dropping a topic's sender
/// through [`InMemoryBus::close`] ends that topic's stream.
#[derive(Default)]
pub struct InMemoryBus {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<InboundMessage>>>,
    receivers: Mutex<HashMap<String, mpsc::UnboundedReceiver<InboundMessage>>>,
    next_tag: AtomicU64,
    acks: Mutex<Vec<u64>>,
    dead_letters: Mutex<Vec<DlqMessage>>,
    fail_dead_letters: bool,
    fail_subscribe: bool,
}

impl InMemoryBus {
    pub fn new(topics: &[&str]) -> Self {
        let bus = Self::default();

        for topic in topics {
            let (sender, receiver) = mpsc::unbounded_channel();
            bus.senders.lock().unwrap().insert(topic.to_string(), sender);
            bus.receivers
                .lock()
                .unwrap()
                .insert(topic.to_string(), receiver);
        }

        bus
    }

    pub fn with_failing_dead_letters(topics: &[&str]) -> Self {
        Self {
            fail_dead_letters: true,
            ..Self::new(topics)
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_subscribe: true,
            ..Default::default()
        }
    }

    /// Queues `payload` on `topic` and returns its delivery tag.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> u64 {
        let delivery_tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        let message = InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            delivery_tag,
        };

        if let Some(sender) = self.senders.lock().unwrap().get(topic) {
            sender.send(message).unwrap();
        }

        delivery_tag
    }

    pub fn close(&self, topic: &str) {
        self.senders.lock().unwrap().remove(topic);
    }

    pub fn acks(&self) -> Vec<u64> {
        self.acks.lock().unwrap().clone()
    }

    pub fn dead_letters(&self) -> Vec<DlqMessage> {
        self.dead_letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<BoxStream<'static, Result<InboundMessage, Error>>, Error> {
        if self.fail_subscribe {
            return Err(anyhow!("Failed to create consumer for {}", topic));
        }

        let receiver = self
            .receivers
            .lock()
            .unwrap()
            .remove(topic)
            .ok_or_else(|| anyhow!("Unknown topic {}", topic))?;

        let stream = stream::unfold(receiver, |mut receiver| async move {
            receiver
                .recv()
                .await
                .map(|message| (Ok::<_, Error>(message), receiver))
        });

        Ok(stream.boxed())
    }

    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), Error> {
        self.acks.lock().unwrap().push(message.delivery_tag);
        Ok(())
    }

    async fn publish_dead_letter(&self, message: &DlqMessage) -> Result<(), Error> {
        if self.fail_dead_letters {
            return Err(anyhow!("Failed to publish message to dlq"));
        }

        self.dead_letters.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        if self.fail_subscribe {
            return Err(anyhow!("RabbitMQ connection is not open"));
        }

        Ok(())
    }
}
