//! Notification pipeline.
//!
//! The ticket path runs five ordered stages (resolve order, encode QR, render
//! views, write the PDF, deliver and clean up). The first failing stage is
//! logged and its error returned; later stages never run.
//!
//! The PDF written in stage four is a filesystem side effect that outlives a
//! failure in stage five unless `retain_failed_artifacts` is off, in which
//! case it is removed on a best-effort basis. A removal failure after a
//! successful delivery is reported as `DeliveredWithErrors`, which is never
//! retried.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    clients::{
        database::OrderQuery,
        mail::MailSender,
        pdf::PdfRenderer,
        qr::QrEncoder,
        template::{EMAIL_TEMPLATE, HtmlRenderer, TICKET_TEMPLATE},
    },
    models::{
        error::NotificationError,
        mail::{MailRequest, Sender},
        message::RegisterOtp,
        order::Order,
        result::QueryResult,
        view::{EmailRequest, TicketRequest},
    },
};

pub const OTP_SUBJECT: &str = "Register User";
pub const MSG_SEND_OTP_FAILED: &str = "Send email failed";
pub const MSG_QUERY_ORDER_FAILED: &str = "failed query order";
pub const MSG_ORDER_NOT_FOUND: &str = "order not found";
pub const MSG_MARSHAL_ORDER_FAILED: &str = "failed marshal order";
pub const MSG_ENCODE_QR_FAILED: &str = "failed encode qrcode";
pub const MSG_RENDER_HTML_FAILED: &str = "Error Execute html";
pub const MSG_RENDER_PDF_FAILED: &str = "Error GeneratePDF";
pub const MSG_WRITE_FILE_FAILED: &str = "Error WriteFile";
pub const MSG_SEND_TICKET_FAILED: &str = "Error Send Ticket Email";
pub const MSG_REMOVE_FILE_FAILED: &str = "Error Remove File";

/// Operations the dispatcher and the HTTP surface invoke.
#[async_trait]
pub trait NotificationCommand: Send + Sync {
    async fn send_registration_otp(&self, event: &RegisterOtp) -> Result<(), NotificationError>;

    async fn send_ticket_email(&self, order_id: &str) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub sender: Sender,
    pub artifact_dir: PathBuf,
    pub retain_failed_artifacts: bool,
}

pub struct NotificationPipeline {
    orders: Arc<dyn OrderQuery>,
    mailer: Arc<dyn MailSender>,
    html: Arc<dyn HtmlRenderer>,
    pdf: Arc<dyn PdfRenderer>,
    qr: Arc<dyn QrEncoder>,
    settings: PipelineSettings,
}

impl NotificationPipeline {
    pub fn new(
        orders: Arc<dyn OrderQuery>,
        mailer: Arc<dyn MailSender>,
        html: Arc<dyn HtmlRenderer>,
        pdf: Arc<dyn PdfRenderer>,
        qr: Arc<dyn QrEncoder>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            orders,
            mailer,
            html,
            pdf,
            qr,
            settings,
        }
    }

    fn from_mailbox(&self, failure: &'static str) -> Result<String, NotificationError> {
        self.settings
            .sender
            .mailbox()
            .map(|mailbox| mailbox.to_string())
            .map_err(|e| {
                error!(address = %self.settings.sender.address, error = %e, "Invalid sender address");
                NotificationError::internal(failure)
            })
    }

    /// Where the ticket PDF for `ticket_number` is written.
    pub fn artifact_path(&self, ticket_number: &str) -> PathBuf {
        ticket_artifact_path(&self.settings.artifact_dir, ticket_number)
    }

    async fn resolve_order(&self, order_id: &str) -> Result<Order, NotificationError> {
        match self.orders.find_order_by_id(order_id).await {
            QueryResult::Data(order) => Ok(order),
            QueryResult::Empty => {
                error!(order_id, "Order not found");
                Err(NotificationError::bad_request(MSG_ORDER_NOT_FOUND))
            }
            QueryResult::Error(e) => {
                error!(order_id, error = %e, "Order query failed");
                Err(NotificationError::internal(MSG_QUERY_ORDER_FAILED))
            }
            QueryResult::Count(count) => {
                error!(order_id, count, "Order query returned a count instead of an order");
                Err(NotificationError::internal(MSG_MARSHAL_ORDER_FAILED))
            }
        }
    }

    fn view_value<T: Serialize>(
        view: &T,
        order_id: &str,
        stage_message: &str,
    ) -> Result<Value, NotificationError> {
        serde_json::to_value(view).map_err(|e| {
            error!(order_id, error = %e, stage_message, "View model serialization failed");
            NotificationError::internal(stage_message)
        })
    }

    async fn discard_failed_artifact(&self, path: &Path, order_id: &str) {
        if self.settings.retain_failed_artifacts {
            warn!(order_id, path = %path.display(), "Keeping ticket file after failed delivery");
            return;
        }

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(
                order_id,
                path = %path.display(),
                error = %e,
                "Failed to remove ticket file after failed delivery"
            );
        }
    }
}

#[async_trait]
impl NotificationCommand for NotificationPipeline {
    async fn send_registration_otp(&self, event: &RegisterOtp) -> Result<(), NotificationError> {
        let mail = MailRequest::new(
            self.from_mailbox(MSG_SEND_OTP_FAILED)?,
            event.email.clone(),
            OTP_SUBJECT.to_string(),
            format!("Your otp register user is : {}", event.otp),
        );

        if let Err(e) = self.mailer.send(&mail).await {
            error!(
                user_id = %event.user_id,
                email = %event.email,
                error = %e,
                payload = ?event,
                "Registration OTP delivery failed"
            );
            return Err(NotificationError::internal(MSG_SEND_OTP_FAILED));
        }

        info!(user_id = %event.user_id, "Registration OTP sent");

        Ok(())
    }

    async fn send_ticket_email(&self, order_id: &str) -> Result<(), NotificationError> {
        let order = self.resolve_order(order_id).await?;

        let qr_code = self.qr.encode(&order.ticket_number).map_err(|e| {
            error!(order_id, error = %e, "QR code encoding failed");
            NotificationError::internal(MSG_ENCODE_QR_FAILED)
        })?;

        let email_view = Self::view_value(
            &EmailRequest::from(&order),
            order_id,
            MSG_RENDER_HTML_FAILED,
        )?;
        let body = self
            .html
            .render_html(EMAIL_TEMPLATE, &email_view)
            .map_err(|e| {
                error!(order_id, error = %e, "Email body rendering failed");
                NotificationError::internal(MSG_RENDER_HTML_FAILED)
            })?;

        let ticket_view = Self::view_value(
            &TicketRequest::new(&order, &qr_code),
            order_id,
            MSG_RENDER_PDF_FAILED,
        )?;
        let ticket_pdf = self
            .pdf
            .render_pdf(TICKET_TEMPLATE, &ticket_view)
            .await
            .map_err(|e| {
                error!(order_id, error = %e, "Ticket PDF rendering failed");
                NotificationError::internal(MSG_RENDER_PDF_FAILED)
            })?;

        let from = self.from_mailbox(MSG_SEND_TICKET_FAILED)?;

        let path = self.artifact_path(&order.ticket_number);
        write_artifact(&path, &ticket_pdf).await.map_err(|e| {
            error!(order_id, path = %path.display(), error = %e, "Ticket PDF write failed");
            NotificationError::internal(MSG_WRITE_FILE_FAILED)
        })?;

        let mail = MailRequest::new(
            from,
            order.email.clone(),
            format!("Evoucher for {}", order.event_name),
            body,
        )
        .with_attachment(path.clone());

        if let Err(e) = self.mailer.send(&mail).await {
            error!(order_id, to = %order.email, error = %e, "Ticket email delivery failed");
            self.discard_failed_artifact(&path, order_id).await;
            return Err(NotificationError::internal(MSG_SEND_TICKET_FAILED));
        }

        tokio::fs::remove_file(&path).await.map_err(|e| {
            error!(
                order_id,
                path = %path.display(),
                error = %e,
                "Ticket email delivered but ticket file removal failed"
            );
            NotificationError::delivered_with_errors(MSG_REMOVE_FILE_FAILED)
        })?;

        info!(order_id, ticket_number = %order.ticket_number, "Ticket email sent");

        Ok(())
    }
}

/// `<dir>/Ticket-<ticket number>.pdf`. Every byte of the ticket number
/// outside `[A-Za-z0-9-]` is written as `_XX` (uppercase hex), so distinct
/// ticket numbers never share a file and none can leave `dir`.
pub fn ticket_artifact_path(dir: &Path, ticket_number: &str) -> PathBuf {
    let mut slot = String::with_capacity(ticket_number.len());
    for byte in ticket_number.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            slot.push(char::from(byte));
        } else {
            slot.push_str(&format!("_{:02X}", byte));
        }
    }

    dir.join(format!("Ticket-{}.pdf", slot))
}

async fn write_artifact(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(path, content).await
}
