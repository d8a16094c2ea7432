use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::order::Order;

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

fn display_time(time: &DateTime<Utc>) -> String {
    time.format(DISPLAY_TIME_FORMAT).to_string()
}

fn event_time(order: &Order) -> String {
    order
        .event_time
        .clone()
        .unwrap_or_else(|| display_time(&order.date_time))
}

/// View model for the HTML email body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub full_name: String,
    pub event_name: String,
    pub ticket_number: String,
    pub order_time: String,
    pub payment_type: String,
    pub event_time: String,
    pub event_place: String,
}

impl From<&Order> for EmailRequest {
    fn from(order: &Order) -> Self {
        Self {
            full_name: order.full_name.clone(),
            event_name: order.event_name.clone(),
            ticket_number: order.ticket_number.clone(),
            order_time: display_time(&order.order_time),
            payment_type: order.bank.clone(),
            event_time: event_time(order),
            event_place: order.event_place.clone(),
        }
    }
}

/// View model for the PDF ticket; embeds the QR code as base64 PNG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRequest {
    pub full_name: String,
    pub ticket_type: String,
    pub ticket_number: String,
    pub ticket_price: String,
    pub seat_number: i32,
    pub event_name: String,
    pub event_time: String,
    pub event_place: String,
    pub qr_code: String,
}

impl TicketRequest {
    pub fn new(order: &Order, qr_code_png: &[u8]) -> Self {
        Self {
            full_name: order.full_name.clone(),
            ticket_type: order.ticket_type.clone(),
            ticket_number: order.ticket_number.clone(),
            ticket_price: format!("${}", order.amount),
            seat_number: order.seat_number,
            event_name: order.event_name.clone(),
            event_time: event_time(order),
            event_place: order.event_place.clone(),
            qr_code: STANDARD.encode(qr_code_png),
        }
    }
}
