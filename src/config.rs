use std::{path::PathBuf, time::Duration};

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{
    clients::mail::SmtpConfig,
    command::PipelineSettings,
    models::{
        mail::Sender,
        retry::{FailurePolicy, RetryConfig},
    },
};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    #[serde(default = "default_otp_topic")]
    pub otp_topic: String,
    #[serde(default = "default_ticket_topic")]
    pub ticket_topic: String,
    #[serde(default = "default_failed_queue_name")]
    pub failed_queue_name: String,
    #[serde(default = "default_failure_policy")]
    pub failure_policy: String,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    pub mongodb_url: String,
    pub mongodb_database: String,
    #[serde(default = "default_order_collection")]
    pub order_collection: String,
    #[serde(default = "default_order_query_timeout_ms")]
    pub order_query_timeout_ms: u64,

    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub mail_from_address: String,
    #[serde(default = "default_mail_from_name")]
    pub mail_from_name: String,

    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default)]
    pub retain_failed_artifacts: bool,
    #[serde(default = "default_chrome_path")]
    pub chrome_path: String,
    #[serde(default = "default_pdf_render_timeout_seconds")]
    pub pdf_render_timeout_seconds: u64,
    #[serde(default = "default_qr_code_size")]
    pub qr_code_size: u32,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_otp_topic() -> String {
    "concert-send-otp-user-registration".to_string()
}

fn default_ticket_topic() -> String {
    "concert-send-email-pdf".to_string()
}

fn default_failed_queue_name() -> String {
    "notification-failed".to_string()
}

fn default_failure_policy() -> String {
    "drop".to_string()
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_order_collection() -> String {
    "order".to_string()
}

fn default_order_query_timeout_ms() -> u64 {
    10_000
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from_name() -> String {
    "Soldev Concert Organizer".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_chrome_path() -> String {
    "chromium".to_string()
}

fn default_pdf_render_timeout_seconds() -> u64 {
    30
}

fn default_qr_code_size() -> u32 {
    170
}

fn default_server_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.failure_policy()?;
        config
            .sender()
            .mailbox()
            .map_err(|e| anyhow!("Invalid MAIL_FROM_ADDRESS: {}", e))?;

        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn failure_policy(&self) -> Result<FailurePolicy, Error> {
        match self.failure_policy.as_str() {
            "drop" => Ok(FailurePolicy::Drop),
            "retry" => Ok(FailurePolicy::Retry(self.retry_config())),
            "dead_letter" => Ok(FailurePolicy::DeadLetter),
            other => Err(anyhow!("Unknown failure policy '{}'", other)),
        }
    }

    pub fn sender(&self) -> Sender {
        Sender {
            name: self.mail_from_name.clone(),
            address: self.mail_from_address.clone(),
        }
    }

    pub fn smtp_config(&self) -> SmtpConfig {
        SmtpConfig {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            sender: self.sender(),
            artifact_dir: self.artifact_dir.clone(),
            retain_failed_artifacts: self.retain_failed_artifacts,
        }
    }

    pub fn order_query_timeout(&self) -> Duration {
        Duration::from_millis(self.order_query_timeout_ms)
    }

    pub fn pdf_render_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf_render_timeout_seconds)
    }
}
