use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Payload of the registration OTP topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOtp {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub otp: String,
}

/// The shape a topic's payload is expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// JSON object shaped like [`RegisterOtp`].
    RegisterOtp,
    /// Bare JSON string holding an order id.
    TicketEmail,
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Topic::RegisterOtp => write!(f, "register_otp"),
            Topic::TicketEmail => write!(f, "ticket_email"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    RegisterOtp(RegisterOtp),
    TicketRequested { order_id: String },
}

impl NotificationEvent {
    pub fn decode(topic: Topic, payload: &[u8]) -> Result<Self, serde_json::Error> {
        match topic {
            Topic::RegisterOtp => serde_json::from_slice::<RegisterOtp>(payload)
                .map(NotificationEvent::RegisterOtp),
            Topic::TicketEmail => serde_json::from_slice::<String>(payload)
                .map(|order_id| NotificationEvent::TicketRequested { order_id }),
        }
    }
}

/// A raw message as received from the bus.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub delivery_tag: u64,
}

impl InboundMessage {
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqMessage {
    pub topic: String,
    pub original_payload: String,
    pub failure_reason: String,
    pub failed_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_register_otp() {
        let payload = br#"{"userId":"u1","fullName":"Alif","email":"a@x.com","otp":"123456"}"#;
        let event = NotificationEvent::decode(Topic::RegisterOtp, payload).unwrap();

        assert_eq!(
            event,
            NotificationEvent::RegisterOtp(RegisterOtp {
                user_id: "u1".into(),
                full_name: "Alif".into(),
                email: "a@x.com".into(),
                otp: "123456".into(),
            })
        );
    }

    #[test]
    fn test_decode_bare_order_id() {
        let event = NotificationEvent::decode(Topic::TicketEmail, br#""O1""#).unwrap();
        assert_eq!(
            event,
            NotificationEvent::TicketRequested {
                order_id: "O1".into()
            }
        );
    }

    #[test]
    fn test_decode_rejects_unquoted_order_id() {
        assert!(NotificationEvent::decode(Topic::TicketEmail, b"O1").is_err());
    }

    #[test]
    fn test_decode_rejects_missing_otp() {
        let payload = br#"{"userId":"u1","fullName":"Alif","email":"a@x.com"}"#;
        assert!(NotificationEvent::decode(Topic::RegisterOtp, payload).is_err());
    }
}
