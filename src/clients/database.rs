use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use mongodb::{
    Client, Collection,
    bson::{Document, doc},
};
use tracing::{debug, error, info, warn};

use crate::models::{
    error::NotificationError,
    order::Order,
    result::{PendingResult, QueryResult},
};

/// Point lookups against the order collection.
#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    /// Finds at most one order whose `orderId` equals `order_id`.
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, Error>;

    async fn health_check(&self) -> Result<(), Error>;
}

/// What the pipeline needs from the data layer.
pub trait OrderQuery: Send + Sync {
    fn find_order_by_id(&self, order_id: &str) -> PendingResult<Order>;
}

pub struct DatabaseClient {
    client: Client,
    database: String,
    orders: Collection<Document>,
}

impl DatabaseClient {
    pub async fn connect(url: &str, database: &str, collection: &str) -> Result<Self, Error> {
        info!("Connecting to MongoDB");

        let client = Client::with_uri_str(url)
            .await
            .map_err(|e| anyhow!("Failed to connect to MongoDB: {}", e))?;

        let orders = client.database(database).collection::<Document>(collection);

        info!(database, collection, "MongoDB connection established");

        Ok(Self {
            client,
            database: database.to_string(),
            orders,
        })
    }
}

#[async_trait]
impl OrderStore for DatabaseClient {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, Error> {
        let document = self
            .orders
            .find_one(doc! { "orderId": order_id })
            .await
            .map_err(|e| anyhow!("Error Mongodb Connection {}", e))?;

        let Some(document) = document else {
            debug!(order_id, "No order document matched");
            return Ok(None);
        };

        decode_order(document).map(Some)
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

fn decode_order(document: Document) -> Result<Order, Error> {
    bson::from_document::<Order>(document).map_err(|e| anyhow!("cannot unmarshal result: {}", e))
}

/// Runs each order lookup on its own task and hands back a one-shot handle.
pub struct OrderRepository<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: OrderStore> OrderRepository<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }
}

impl<S: OrderStore> OrderQuery for OrderRepository<S> {
    fn find_order_by_id(&self, order_id: &str) -> PendingResult<Order> {
        let store = Arc::clone(&self.store);
        let timeout = self.timeout;
        let order_id = order_id.to_string();

        PendingResult::spawn(async move {
            match tokio::time::timeout(timeout, store.find_order(&order_id)).await {
                Ok(Ok(Some(order))) => QueryResult::Data(order),
                Ok(Ok(None)) => QueryResult::Empty,
                Ok(Err(e)) => {
                    error!(order_id = %order_id, error = %e, "Order lookup failed");
                    QueryResult::Error(NotificationError::internal(e.to_string()))
                }
                Err(_) => {
                    warn!(
                        order_id = %order_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Order lookup timed out"
                    );
                    QueryResult::Error(NotificationError::internal("order lookup timed out"))
                }
            }
        })
    }
}
