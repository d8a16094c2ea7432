use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::{StreamExt, stream::BoxStream};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
};
use tracing::{debug, info};

use crate::{
    config::Config,
    dispatcher::MessageBus,
    models::message::{DlqMessage, InboundMessage},
};

/// RabbitMQ transport; each topic is a durable queue of the same name.
pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    failed_queue_name: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        let client = Self {
            connection,
            channel,
            failed_queue_name: config.failed_queue_name.clone(),
        };

        client.declare_queue(&config.failed_queue_name).await?;

        info!(prefetch_count = config.prefetch_count, "RabbitMQ channel ready");

        Ok(client)
    }

    async fn declare_queue(&self, name: &str) -> Result<(), Error> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue {}: {}", name, e))?;

        debug!(queue = name, "Queue declared");

        Ok(())
    }
}

#[async_trait]
impl MessageBus for RabbitMqClient {
    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<BoxStream<'static, Result<InboundMessage, Error>>, Error> {
        self.declare_queue(topic).await?;

        let consumer = self
            .channel
            .basic_consume(
                topic,
                &format!("notification_{}", topic),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer for {}: {}", topic, e))?;

        info!(topic, "Consumer created for queue");

        let topic = topic.to_string();
        let stream = consumer.map(move |delivery| {
            delivery
                .map(|delivery| InboundMessage {
                    topic: topic.clone(),
                    payload: delivery.data,
                    delivery_tag: delivery.delivery_tag,
                })
                .map_err(|e| anyhow!("Failed to receive delivery: {}", e))
        });

        Ok(stream.boxed())
    }

    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), Error> {
        self.channel
            .basic_ack(message.delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

        Ok(())
    }

    async fn publish_dead_letter(&self, message: &DlqMessage) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;

        self.channel
            .basic_publish(
                "",
                &self.failed_queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message to dlq: {}", e))?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        if !self.connection.status().connected() {
            return Err(anyhow!("RabbitMQ connection is not open"));
        }

        Ok(())
    }
}
