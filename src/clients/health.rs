use std::{collections::HashMap, future::Future, sync::Arc, time::Instant};

use anyhow::{Error, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::{
    clients::{database::OrderStore, mail::MailSender},
    dispatcher::MessageBus,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

const CRITICAL_SERVICES: [&str; 2] = ["database", "message_broker"];

pub struct HealthChecker {
    database: Arc<dyn OrderStore>,
    bus: Arc<dyn MessageBus>,
    mailer: Arc<dyn MailSender>,
}

impl HealthChecker {
    pub fn new(
        database: Arc<dyn OrderStore>,
        bus: Arc<dyn MessageBus>,
        mailer: Arc<dyn MailSender>,
    ) -> Self {
        Self {
            database,
            bus,
            mailer,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        let db_health = Self::probe("database", self.database.health_check()).await;
        checks.insert("database".to_string(), db_health);

        let bus_health = Self::probe("message_broker", self.bus.health_check()).await;
        checks.insert("message_broker".to_string(), bus_health);

        let mail_health = match Self::probe("smtp", self.mailer.health_check()).await {
            health if health.status == HealthStatus::Unhealthy => {
                // Consumers keep running without SMTP; deliveries fail per message.
                ServiceHealth::degraded(health.error.unwrap_or_default())
            }
            health => health,
        };
        checks.insert("smtp".to_string(), mail_health);

        let overall_status = Self::determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            checks,
        }
    }

    async fn probe<F>(service: &str, check: F) -> ServiceHealth
    where
        F: Future<Output = Result<(), Error>>,
    {
        let start = Instant::now();

        match check.await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(service, response_time_ms = elapsed, "Health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(service, error = %e, "Health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
        }
    }

    fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let critical_unhealthy = checks
            .iter()
            .filter(|(name, _)| CRITICAL_SERVICES.contains(&name.as_str()))
            .any(|(_, health)| health.status == HealthStatus::Unhealthy);

        let has_degraded = checks
            .values()
            .any(|health| health.status != HealthStatus::Healthy);

        if critical_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
